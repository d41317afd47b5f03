use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeDelta};
use derive_more::{Display, Error};
use walkdir::WalkDir;

use super::trash::{Trash, TrashError};

/// Removes files older than a number of days from a directory tree.
#[derive(Debug, Clone)]
pub struct RetentionSweep<'a> {
    trash: &'a Trash,
    dry_run: bool,
}

/// Files handled by a [RetentionSweep]. Empty when nothing was old enough.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub removed: Vec<PathBuf>,
    /// Old files that are still in place because disposing them failed.
    pub failed: Vec<SweepError>,
}

impl SweepOutcome {
    pub fn count(&self) -> usize {
        self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

impl fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.count(), self.failed.len()) {
            (0, 0) => write!(f, "nothing to remove"),
            (1, 0) => write!(f, "removed 1 file"),
            (n, 0) => write!(f, "removed {n} files"),
            (n, failed) => write!(f, "removed {n} of {} files, {failed} failed", n + failed),
        }
    }
}

#[derive(Debug, Display, Error)]
#[display("Unable to remove {}: {source}", path.display())]
pub struct SweepError {
    path: PathBuf,
    source: TrashError,
}

impl SweepError {
    /// The file left in place.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Instant before which a file counts as older than `days`.
pub fn cutoff(now: DateTime<Local>, days: NonZeroU32) -> DateTime<Local> {
    now - TimeDelta::days(i64::from(days.get()))
}

/// Returns if a file modified at `modified` is swept. The cutoff itself is inclusive.
fn qualifies(
    modified: DateTime<Local>,
    cutoff: DateTime<Local>,
    file_name: &OsStr,
    prefix: Option<&str>,
) -> bool {
    modified <= cutoff
        && prefix.is_none_or(|prefix| file_name.as_encoded_bytes().starts_with(prefix.as_bytes()))
}

impl<'a> RetentionSweep<'a> {
    pub fn new(trash: &'a Trash, dry_run: bool) -> Self {
        Self { trash, dry_run }
    }

    /// Moves every regular file below `directory` that is at least `max_age_days` old to the trash.
    ///
    /// With a `prefix` only files whose name starts with it are considered.
    /// Symlinks are never followed nor removed; unreadable entries are skipped. A file that can't
    /// be disposed of is listed in [`SweepOutcome::failed`] and the sweep goes on with the next.
    ///
    /// # Dry Run
    ///
    /// On a dry run qualifying files are reported but left in place.
    pub fn sweep(
        &self,
        directory: &Path,
        max_age_days: NonZeroU32,
        prefix: Option<&str>,
    ) -> SweepOutcome {
        let cutoff = cutoff(Local::now(), max_age_days);
        log::debug!(
            target: "retention",
            "Sweeping {} for files older than {cutoff}",
            directory.display()
        );

        let candidates: Vec<PathBuf> = WalkDir::new(directory)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!(target: "retention", "Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                match entry.metadata().map_err(io::Error::from).and_then(|m| m.modified()) {
                    Ok(modified) => qualifies(modified.into(), cutoff, entry.file_name(), prefix),
                    Err(e) => {
                        log::warn!(target: "retention", "Skipping {}: {e}", entry.path().display());
                        false
                    }
                }
            })
            .map(walkdir::DirEntry::into_path)
            .collect();

        let mut outcome = SweepOutcome::default();
        for path in candidates {
            log::info!(target: "retention", "Removing {}", path.display());
            if self.dry_run {
                outcome.removed.push(path);
                continue;
            }
            match self.trash.dispose(&path) {
                Ok(()) => outcome.removed.push(path),
                Err(source) => {
                    let e = SweepError { path, source };
                    log::error!(target: "retention", "{e}");
                    outcome.failed.push(e);
                }
            }
        }

        if outcome.is_empty() {
            log::info!(target: "retention", "No files older than {max_age_days} days found");
        }
        outcome
    }
}
