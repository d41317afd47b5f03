use std::ffi::OsString;
use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use crate::backends::mysqldump::{DEFAULT_COMPRESS_PROGRAM, DEFAULT_DUMP_PROGRAM};
use crate::backends::MySqlDump;
use crate::config::{ConfigurationError, RunConfig};
use crate::laravel::artisan::DEFAULT_PHP_PATH;
use crate::laravel::Artisan;

/// Level logged when neither `BACKUP_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Backup the databases of all Laravel applications below a project root.
///
/// Every option can be set through its environment variable, after loading `.env` from the
/// working directory. A cron job doesn't need to pass any flag.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long, env = "BACKUP_LOG")]
    pub verbose: Option<LevelFilter>,

    /// Directory the Laravel applications are located in.
    #[arg(long, env = "PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,

    /// Nesting depth of the applications below the project root (1 or 2).
    #[arg(long, env = "PROJECT_DEPTH")]
    pub project_depth: Option<u8>,

    /// Compress dumps (1) or write plain SQL (0).
    #[arg(long, env = "COMPRESS_OUTPUT", default_value = "1")]
    pub compress_output: u8,

    /// Days after which old backups are moved to trash. 0 keeps all backups.
    #[arg(long, env = "REMOVE_OLDER_FILES", default_value = "0")]
    pub remove_older_files: u32,

    /// Prune telescope entries older than this many hours. Negative disables pruning.
    #[arg(
        long,
        env = "PRUNE_TELESCOPE_DATA",
        default_value = "-1",
        allow_negative_numbers = true
    )]
    pub prune_telescope_data: i64,

    /// Simulative backup run.
    #[arg(long, env = "DRY_RUN", value_parser = FalseyValueParser::new())]
    pub dry_run: bool,

    /// Move old backups into this directory instead of the user's trash.
    #[arg(long, env = "TRASH_DIR")]
    pub trash_dir: Option<PathBuf>,

    /// Program dumping a database.
    #[arg(long, env = "MYSQLDUMP_BINARY", default_value = DEFAULT_DUMP_PROGRAM)]
    pub mysqldump: OsString,

    /// Program compressing the dump.
    #[arg(long, env = "COMPRESS_BINARY", default_value = DEFAULT_COMPRESS_PROGRAM)]
    pub compressor: OsString,

    /// The php interpreter running `artisan`.
    #[arg(long, env = "PHP_BINARY", default_value = DEFAULT_PHP_PATH)]
    pub php: PathBuf,
}

impl Cli {
    /// Validates the settings of this run.
    pub fn run_config(&self) -> Result<RunConfig, ConfigurationError> {
        let mut config = RunConfig::new(
            self.project_root.clone(),
            self.project_depth,
            self.compress_output,
            self.remove_older_files,
            self.prune_telescope_data,
        )?;
        config.dry_run = self.dry_run;
        config.trash_dir = self.trash_dir.clone();

        Ok(config)
    }

    /// Logger of this run.
    ///
    /// Without `--verbose`/`BACKUP_LOG` the level comes from `RUST_LOG`, falling back to
    /// [`DEFAULT_LOG_LEVEL`] so a cron run still reports its progress.
    pub fn logger(&self) -> env_logger::Builder {
        let mut logger =
            env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_LOG_LEVEL));
        if let Some(level) = self.verbose {
            logger.filter_level(level);
        }
        logger
    }

    pub fn mysqldump(&self) -> MySqlDump {
        MySqlDump::with_programs(&self.mysqldump, &self.compressor)
    }

    pub fn artisan(&self) -> Artisan {
        Artisan::with_php_path(self.php.clone())
    }
}
