//! Compare a live volume against the archive it was checked out from.

use std::cmp::Ordering;
use std::fmt;

use tracing::debug;

use volumetric_core::{ArchiveVolume, VolumeName};
use volumetric_docker::ContainerRuntime;

use crate::archive::{ArchiveEntry, ArchiveFile};
use crate::directory::{list_tree, EntryKind, EntryStat, LiveEntry};
use crate::error::{volume_lookup_err, VolumeError};

/// Classification of one path present on at least one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    Unchanged(String),
    Modified(String),
    /// Only on disk.
    Added(String),
    /// Only in the archive.
    Deleted(String),
}

impl ChangeRecord {
    pub fn path(&self) -> &str {
        match self {
            ChangeRecord::Unchanged(p)
            | ChangeRecord::Modified(p)
            | ChangeRecord::Added(p)
            | ChangeRecord::Deleted(p) => p,
        }
    }

    /// Single-letter report marker; `None` for unchanged paths.
    pub fn marker(&self) -> Option<char> {
        match self {
            ChangeRecord::Unchanged(_) => None,
            ChangeRecord::Modified(_) => Some('M'),
            ChangeRecord::Added(_) => Some('A'),
            ChangeRecord::Deleted(_) => Some('D'),
        }
    }
}

/// Classify a path present on both sides.
///
/// Kinds must agree. Symlinks compare by target only; everything else by
/// permission bits and mtime seconds, and regular files also by size.
pub fn classify(path: &str, archived: &EntryStat, live: &EntryStat) -> ChangeRecord {
    let modified = if archived.kind != live.kind {
        true
    } else if archived.kind == EntryKind::Symlink {
        archived.link_target != live.link_target
    } else {
        (archived.kind == EntryKind::File && archived.size != live.size)
            || archived.mode != live.mode
            || archived.mtime != live.mtime
    };
    if modified {
        ChangeRecord::Modified(path.to_string())
    } else {
        ChangeRecord::Unchanged(path.to_string())
    }
}

/// Every change between the two sides, sorted by path. Unchanged paths are
/// omitted.
///
/// Inputs need not be sorted; both are ordered by path before the merge.
pub fn compare(archive: &[ArchiveEntry], live: &[LiveEntry]) -> Vec<ChangeRecord> {
    let mut archived: Vec<&ArchiveEntry> = archive.iter().collect();
    archived.sort_by(|a, b| a.path.cmp(&b.path));
    let mut present: Vec<&LiveEntry> = live.iter().collect();
    present.sort_by(|a, b| a.relative.cmp(&b.relative));

    let mut changes = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < archived.len() || j < present.len() {
        let order = match (archived.get(i), present.get(j)) {
            (Some(a), Some(l)) => a.path.cmp(&l.relative),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                changes.push(ChangeRecord::Deleted(archived[i].path.clone()));
                i += 1;
            }
            Ordering::Greater => {
                changes.push(ChangeRecord::Added(present[j].relative.clone()));
                j += 1;
            }
            Ordering::Equal => {
                let record = classify(&archived[i].path, &archived[i].stat, &present[j].stat);
                if record.marker().is_some() {
                    changes.push(record);
                }
                i += 1;
                j += 1;
            }
        }
    }
    changes
}

/// The changes found for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    pub volume: VolumeName,
    pub changes: Vec<ChangeRecord>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Display for DiffReport {
    /// One `<marker> <path>` line per change.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            if let Some(marker) = change.marker() {
                writeln!(f, "{marker} {}", change.path())?;
            }
        }
        Ok(())
    }
}

/// Diff the live content of `volume` against its source archive.
pub fn diff(
    volume: &ArchiveVolume,
    runtime: &mut dyn ContainerRuntime,
) -> Result<DiffReport, VolumeError> {
    let live = runtime
        .inspect_volume(volume.name.as_str())
        .map_err(|e| volume_lookup_err(volume.name.as_str(), e))?;

    let archived = ArchiveFile::map(&volume.source_path)?.entries()?;
    let present = list_tree(&live.mountpoint)?;
    let changes = compare(&archived, &present);
    debug!(
        volume = %volume.name,
        archived = archived.len(),
        present = present.len(),
        changes = changes.len(),
        "diff complete"
    );

    Ok(DiffReport {
        volume: volume.name.clone(),
        changes,
    })
}
