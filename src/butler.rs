//! Drives a backup run over every discovered application.
//!
//! Applications are processed one after another. For each of them the credentials are resolved
//! and the database is dumped; only then optional telescope pruning and the retention sweep
//! follow. A failure of one application is logged and the next one is attempted.
//!
//! # Dry Run
//!
//! With [`RunConfig::dry_run`] set the dump runs with its output discarded, no directories are
//! created, nothing is pruned and the sweep only reports what it would remove.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use derive_more::{Display, Error, From};

use crate::backends::{BackupArtifact, DumpExecutionError, MySqlDump};
use crate::config::{ConfigurationError, RunConfig};
use crate::discovery::discover;
use crate::laravel::{Application, Artisan, CredentialResolutionError};
use crate::util::retention::RetentionSweep;
use crate::util::trash::Trash;

/// Errors failing the backup of a single application.
#[derive(Debug, Display, Error, From)]
pub enum ApplicationError {
    #[display("{_0}")]
    Credentials(CredentialResolutionError),
    #[display("{_0}")]
    Dump(DumpExecutionError),
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Applications whose database was dumped.
    pub processed: usize,
    /// Storage directories of the applications that failed.
    pub failed: Vec<PathBuf>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backup generated for {} projects", self.processed)?;
        if !self.failed.is_empty() {
            write!(f, ", {} failed", self.failed.len())?;
        }
        write!(
            f,
            " (started {}, finished {})",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Backs up the databases of all applications below [`RunConfig::root`].
#[derive(Debug)]
pub struct Butler {
    config: RunConfig,
    mysqldump: MySqlDump,
    artisan: Artisan,
    trash: Trash,
}

impl Butler {
    pub fn new(config: RunConfig) -> Self {
        let trash = config
            .trash_dir
            .clone()
            .map(Trash::Directory)
            .unwrap_or_default();

        Self {
            config,
            mysqldump: MySqlDump::default(),
            artisan: Artisan::default(),
            trash,
        }
    }

    pub fn with_mysqldump(mut self, mysqldump: MySqlDump) -> Self {
        self.mysqldump = mysqldump;
        self
    }

    pub fn with_artisan(mut self, artisan: Artisan) -> Self {
        self.artisan = artisan;
        self
    }

    /// Runs the backup of all applications.
    ///
    /// Only a missing project root is fatal; every other failure is confined to its application
    /// and listed in [`RunSummary::failed`].
    pub fn run(&self) -> Result<RunSummary, ConfigurationError> {
        let started_at = Local::now();
        if self.config.dry_run {
            log::warn!(target: "butler", "Running in dry-run mode");
        }

        log::info!(
            target: "butler",
            "Searching for applications in {}",
            self.config.root.display()
        );
        let applications = discover(&self.config.root, self.config.depth)?;

        let mut processed = 0;
        let mut failed = Vec::new();
        for app in applications {
            log::info!(
                target: "butler",
                "------------------ [{}] ------------------",
                app.root().display()
            );
            match self.backup(&app) {
                Ok(artifact) => {
                    processed += 1;
                    log::info!(
                        target: "butler",
                        "Backup of {} written to {}",
                        artifact.database,
                        artifact.path.display()
                    );
                    self.maintain(&app, &artifact);
                }
                Err(e) => {
                    log::error!(
                        target: "butler",
                        "Backup of {} failed: {e}",
                        app.root().display()
                    );
                    failed.push(app.storage_dir().to_path_buf());
                }
            }
        }

        let summary = RunSummary {
            processed,
            failed,
            started_at,
            finished_at: Local::now(),
        };
        log::info!(target: "butler", "{summary}");
        for app in &summary.failed {
            log::warn!(target: "butler", "No backup for {}", app.display());
        }

        Ok(summary)
    }

    /// Resolves the credentials and dumps the database of `app`.
    fn backup(&self, app: &Application) -> Result<BackupArtifact, ApplicationError> {
        let credentials = app.credentials()?;
        let artifact = self.mysqldump.dump(
            &credentials,
            &app.backup_dir(),
            self.config.compress,
            self.config.dry_run,
        )?;
        Ok(artifact)
    }

    /// Best-effort steps after a successful dump: telescope pruning and the retention sweep.
    fn maintain(&self, app: &Application, artifact: &BackupArtifact) {
        if let Some(hours) = self.config.telescope_prune_hours {
            match self.artisan.telescope_prune(app, hours, self.config.dry_run) {
                Ok(outcome) => log::debug!(target: "butler", "Telescope pruning: {outcome:?}"),
                Err(e) => log::error!(target: "butler", "Pruning telescope data failed: {e}"),
            }
        }

        let Some(days) = self.config.retention_days else {
            return;
        };
        let backup_dir = app.backup_dir();
        if !backup_dir.is_dir() {
            return;
        }
        let sweep = RetentionSweep::new(&self.trash, self.config.dry_run);
        let outcome = sweep.sweep(&backup_dir, days, Some(artifact.database.as_str()));
        if outcome.failed.is_empty() {
            log::info!(target: "butler", "Retention: {outcome}");
        } else {
            log::error!(target: "butler", "Removing old backups failed: {outcome}");
        }
    }
}
