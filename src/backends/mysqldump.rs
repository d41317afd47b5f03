use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use chrono::{DateTime, Local};
use derive_more::{Display, Error};

use crate::laravel::Credentials;

pub const DEFAULT_DUMP_PROGRAM: &str = "mysqldump";
pub const DEFAULT_COMPRESS_PROGRAM: &str = "gzip";

/// Timestamp format used in artifact file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// The two processes of the dump pipeline.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum DumpStage {
    #[display("dump")]
    Dump,
    #[display("compress")]
    Compress,
}

/// Dumping the database of one application failed.
#[derive(Debug, Display, Error)]
pub enum DumpExecutionError {
    /// The backup directory can't be created.
    #[display("Unable to create backup directory {}: {source}", path.display())]
    BackupDirectory { path: PathBuf, source: io::Error },
    /// The artifact file can't be created.
    #[display("Unable to create backup file {}: {source}", path.display())]
    CreateFile { path: PathBuf, source: io::Error },
    /// A stage couldn't be started or waited for.
    #[display("Running the {stage} stage failed: {source}")]
    NotRun { stage: DumpStage, source: io::Error },
    /// A stage exited unsuccessfully.
    #[display(
        "The {stage} stage exited with {}",
        code.map_or("a signal".to_string(), |c| format!("code {c}"))
    )]
    Failed { stage: DumpStage, code: Option<i32> },
}

/// A database dump written by [MySqlDump].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub database: String,
    pub created_at: DateTime<Local>,
    pub compressed: bool,
}

impl BackupArtifact {
    /// Artifact for `database` inside `backup_dir`: `<database>_<timestamp>.{gz|sql}`.
    pub fn new(
        backup_dir: &Path,
        database: &str,
        created_at: DateTime<Local>,
        compressed: bool,
    ) -> Self {
        let timestamp = created_at.format(TIMESTAMP_FORMAT);
        let extension = if compressed { "gz" } else { "sql" };
        let path = backup_dir.join(format!("{database}_{timestamp}.{extension}"));

        Self {
            path,
            database: database.to_string(),
            created_at,
            compressed,
        }
    }
}

/// Dumps a database with `mysqldump`, optionally piped through `gzip`.
#[derive(Debug, Clone)]
pub struct MySqlDump {
    dump_program: OsString,
    compress_program: OsString,
}

impl Default for MySqlDump {
    fn default() -> Self {
        Self::with_programs(DEFAULT_DUMP_PROGRAM, DEFAULT_COMPRESS_PROGRAM)
    }
}

impl MySqlDump {
    pub fn with_programs(
        dump_program: impl Into<OsString>,
        compress_program: impl Into<OsString>,
    ) -> Self {
        Self {
            dump_program: dump_program.into(),
            compress_program: compress_program.into(),
        }
    }

    fn dump_command(&self, credentials: &Credentials) -> Command {
        let mut command = Command::new(&self.dump_program);
        command.arg(format!("-u{}", credentials.username));
        // an empty -p makes mysqldump prompt for the password
        if !credentials.password.is_empty() {
            command.arg(format!("-p{}", credentials.password));
        }
        command.arg(&credentials.database);

        log::trace!(
            target: "backend::mysqldump",
            "Running: {} -u{} -p*** {}",
            self.dump_program.to_string_lossy(),
            credentials.username,
            credentials.database
        );
        command
    }

    /// Dumps the database into a new file in `backup_dir`, which is created if missing.
    ///
    /// The dump is streamed from one process into the other; it's never held in memory.
    /// On failure the partially written file is removed.
    ///
    /// # Dry Run
    ///
    /// On a dry run the dump is executed with its output discarded. Neither the backup directory
    /// nor the file are created; the returned [BackupArtifact] describes what would have been
    /// written.
    pub fn dump(
        &self,
        credentials: &Credentials,
        backup_dir: &Path,
        compress: bool,
        dry_run: bool,
    ) -> Result<BackupArtifact, DumpExecutionError> {
        log::info!(
            target: "backend::mysqldump",
            "Running mysqldump on {}",
            credentials.database
        );

        let artifact =
            BackupArtifact::new(backup_dir, &credentials.database, Local::now(), compress);

        if dry_run {
            log::trace!(target: "backend::mysqldump", "Discarding output of mysqldump on dry-run");
            let mut dump = self
                .dump_command(credentials)
                .stdout(Stdio::null())
                .spawn()
                .map_err(|source| DumpExecutionError::NotRun {
                    stage: DumpStage::Dump,
                    source,
                })?;
            check_exit(DumpStage::Dump, wait(DumpStage::Dump, &mut dump)?)?;
            return Ok(artifact);
        }

        fs::create_dir_all(backup_dir).map_err(|source| DumpExecutionError::BackupDirectory {
            path: backup_dir.to_path_buf(),
            source,
        })?;
        log::debug!(
            target: "backend::mysqldump",
            "Save database dump at: {}",
            artifact.path.display()
        );
        let file =
            File::create_new(&artifact.path).map_err(|source| DumpExecutionError::CreateFile {
                path: artifact.path.clone(),
                source,
            })?;

        let result = if compress {
            self.run_compressed(credentials, file)
        } else {
            self.run_plain(credentials, file)
        };

        if let Err(e) = result {
            if let Err(remove_err) = fs::remove_file(&artifact.path) {
                log::warn!(
                    target: "backend::mysqldump",
                    "Unable to remove incomplete dump {}: {remove_err}",
                    artifact.path.display()
                );
            }
            return Err(e);
        }

        log::info!(
            target: "backend::mysqldump",
            "Finished database dump of {}",
            credentials.database
        );
        Ok(artifact)
    }

    fn run_plain(&self, credentials: &Credentials, file: File) -> Result<(), DumpExecutionError> {
        let mut dump = self
            .dump_command(credentials)
            .stdout(file)
            .spawn()
            .map_err(|source| DumpExecutionError::NotRun {
                stage: DumpStage::Dump,
                source,
            })?;

        check_exit(DumpStage::Dump, wait(DumpStage::Dump, &mut dump)?)
    }

    fn run_compressed(
        &self,
        credentials: &Credentials,
        file: File,
    ) -> Result<(), DumpExecutionError> {
        let mut dump = self
            .dump_command(credentials)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| DumpExecutionError::NotRun {
                stage: DumpStage::Dump,
                source,
            })?;
        log::trace!(target: "backend::mysqldump", "Started mysqldump process.");

        let dump_stdout = dump.stdout.take().expect("stdout of dump should be piped");
        let compress = Command::new(&self.compress_program)
            .stdin(dump_stdout)
            .stdout(file)
            .spawn();
        let mut compress = match compress {
            Ok(compress) => compress,
            Err(source) => {
                // nobody reads the dump anymore
                let _ = dump.kill();
                let _ = dump.wait();
                return Err(DumpExecutionError::NotRun {
                    stage: DumpStage::Compress,
                    source,
                });
            }
        };

        let compress_status = wait(DumpStage::Compress, &mut compress);
        let dump_status = wait(DumpStage::Dump, &mut dump);

        // a dead compressor breaks the pipe, so its failure is reported first
        check_exit(DumpStage::Compress, compress_status?)?;
        check_exit(DumpStage::Dump, dump_status?)
    }
}

fn wait(stage: DumpStage, child: &mut Child) -> Result<ExitStatus, DumpExecutionError> {
    child
        .wait()
        .map_err(|source| DumpExecutionError::NotRun { stage, source })
}

fn check_exit(stage: DumpStage, status: ExitStatus) -> Result<(), DumpExecutionError> {
    if status.success() {
        Ok(())
    } else {
        Err(DumpExecutionError::Failed {
            stage,
            code: status.code(),
        })
    }
}
