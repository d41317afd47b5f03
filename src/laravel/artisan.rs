use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use derive_more::{Display, Error};
use serde::de::IgnoredAny;

use super::Application;

pub const DEFAULT_PHP_PATH: &str = "/usr/bin/php";
const TELESCOPE_PACKAGE: &str = "laravel/telescope";

/// Runs maintenance commands of an application through its `artisan` console.
#[derive(Debug, Clone)]
pub struct Artisan {
    /// The php interpreter.
    php: PathBuf,
}

impl Default for Artisan {
    fn default() -> Self {
        Self::with_php_path(PathBuf::from(DEFAULT_PHP_PATH))
    }
}

/// Result of a [telescope prune](Artisan::telescope_prune) that didn't fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    /// `telescope:prune` ran successfully.
    Pruned,
    /// The application doesn't require `laravel/telescope`.
    NotInstalled,
    /// The php interpreter or the `artisan` file is missing.
    NoConsole,
    /// Dry run, nothing was executed.
    DryRun,
}

/// Pruning telescope data failed. Never fatal for a backup.
#[derive(Debug, Display, Error)]
pub enum PruneExecutionError {
    /// `composer.json` exists but can't be read or parsed.
    #[display("Reading {} failed: {source}", path.display())]
    Manifest {
        path: PathBuf,
        source: io::Error,
    },
    /// The php process couldn't be started.
    #[display("Running php failed: {_0}")]
    NotRun(io::Error),
    /// `artisan telescope:prune` exited unsuccessfully.
    #[display(
        "telescope:prune exited with {}: {output}",
        code.map_or("signal".to_string(), |c| c.to_string())
    )]
    Failed { code: Option<i32>, output: String },
}

/// The parts of a `composer.json` needed to find required packages.
#[derive(Debug, Default, serde::Deserialize)]
struct ComposerManifest {
    #[serde(default)]
    require: HashMap<String, IgnoredAny>,
    #[serde(default, rename = "require-dev")]
    require_dev: HashMap<String, IgnoredAny>,
}

impl ComposerManifest {
    /// Reads the manifest; a missing file is an empty manifest.
    fn read(path: &Path) -> Result<Self, PruneExecutionError> {
        let manifest = match fs::read(path) {
            Ok(manifest) => manifest,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(PruneExecutionError::Manifest {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&manifest).map_err(|e| PruneExecutionError::Manifest {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn requires(&self, package: &str) -> bool {
        self.require.contains_key(package) || self.require_dev.contains_key(package)
    }
}

impl Artisan {
    pub fn with_php_path(php: PathBuf) -> Self {
        Self { php }
    }

    /// Runs `artisan <command> <args>` in the application root, relaying its output to the log.
    fn execute_command(
        &self,
        app: &Application,
        command: &str,
        args: &[&str],
    ) -> Result<(), PruneExecutionError> {
        log::trace!(
            target: "laravel::artisan",
            "Running: {} artisan {command} {}",
            self.php.display(),
            args.join(" ")
        );
        let artisan_output = Command::new(&self.php)
            .arg("artisan")
            .arg(command)
            .args(args)
            .current_dir(app.root())
            .output()
            .map_err(PruneExecutionError::NotRun)?;

        let stdout = String::from_utf8_lossy(&artisan_output.stdout);
        let stderr = String::from_utf8_lossy(&artisan_output.stderr);

        if !artisan_output.status.success() {
            return Err(PruneExecutionError::Failed {
                code: artisan_output.status.code(),
                output: format!("{}{}", stdout, stderr).trim_end().to_string(),
            });
        }

        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            log::info!(target: "laravel::artisan", "{command}: {line}");
        }
        // relay stderr
        if !stderr.is_empty() {
            log::warn!(target: "laravel::artisan", "{}", stderr.trim_end());
        }

        Ok(())
    }

    /// Prunes telescope entries older than `hours`, if the application uses telescope.
    pub fn telescope_prune(
        &self,
        app: &Application,
        hours: u32,
        dry_run: bool,
    ) -> Result<PruneOutcome, PruneExecutionError> {
        let manifest = ComposerManifest::read(&app.composer_manifest())?;
        if !manifest.requires(TELESCOPE_PACKAGE) {
            log::debug!(
                target: "laravel::artisan",
                "{TELESCOPE_PACKAGE} not required by {}",
                app.root().display()
            );
            return Ok(PruneOutcome::NotInstalled);
        }

        if !self.php.exists() || !app.artisan().is_file() {
            log::warn!(
                target: "laravel::artisan",
                "Can't prune telescope data, {} or {} not found",
                self.php.display(),
                app.artisan().display()
            );
            return Ok(PruneOutcome::NoConsole);
        }

        log::info!(target: "laravel::artisan", "Pruning telescope data older than {hours} hours");
        if dry_run {
            return Ok(PruneOutcome::DryRun);
        }

        self.execute_command(app, "telescope:prune", &[&format!("--hours={hours}")])?;
        Ok(PruneOutcome::Pruned)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::*;

    const SH: &str = "/bin/sh";

    /// An application whose `artisan` is a shell script recording its arguments.
    fn application(composer: Option<&str>, artisan_exit: i32) -> (tempfile::TempDir, Application) {
        let root = tempfile::tempdir().unwrap();
        let app_root = root.path().join("shop");
        fs::create_dir_all(app_root.join("storage/app")).unwrap();
        fs::write(
            app_root.join("artisan"),
            format!("echo \"$@\" > invoked\necho pruned 3 entries\nexit {artisan_exit}\n"),
        )
        .unwrap();
        if let Some(composer) = composer {
            fs::write(app_root.join("composer.json"), composer).unwrap();
        }
        (root, Application::new(app_root.join("storage/app")))
    }

    fn sh() -> Artisan {
        Artisan::with_php_path(PathBuf::from(SH))
    }

    #[test]
    fn skipped_without_telescope() {
        let (_root, app) = application(
            Some(concat!(
                r#"{"require": {"laravel/framework": "^11.0"},"#,
                r#" "require-dev": {"phpunit/phpunit": "^11"}}"#
            )),
            0,
        );

        assert_eq!(
            sh().telescope_prune(&app, 48, false).unwrap(),
            PruneOutcome::NotInstalled
        );
        assert!(!app.root().join("invoked").exists());
    }

    #[test]
    fn skipped_without_manifest() {
        let (_root, app) = application(None, 0);

        assert_eq!(
            sh().telescope_prune(&app, 48, false).unwrap(),
            PruneOutcome::NotInstalled
        );
        assert!(!app.root().join("invoked").exists());
    }

    #[test]
    fn prunes_when_telescope_is_required() {
        let (_root, app) = application(
            Some(r#"{"require-dev": {"laravel/telescope": "^5.0"}}"#),
            0,
        );

        assert_eq!(
            sh().telescope_prune(&app, 48, false).unwrap(),
            PruneOutcome::Pruned
        );
        let invoked = fs::read_to_string(app.root().join("invoked")).unwrap();
        assert_eq!(invoked.trim(), "telescope:prune --hours=48");
    }

    #[test]
    fn dry_run_does_not_execute() {
        let (_root, app) = application(Some(r#"{"require": {"laravel/telescope": "*"}}"#), 0);

        assert_eq!(
            sh().telescope_prune(&app, 1, true).unwrap(),
            PruneOutcome::DryRun
        );
        assert!(!app.root().join("invoked").exists());
    }

    #[test]
    fn missing_interpreter_skips() {
        let (root, app) = application(Some(r#"{"require": {"laravel/telescope": "*"}}"#), 0);
        let artisan = Artisan::with_php_path(root.path().join("no-php"));

        assert_eq!(
            artisan.telescope_prune(&app, 1, false).unwrap(),
            PruneOutcome::NoConsole
        );
    }

    #[test]
    fn failure_carries_output() {
        let (_root, app) = application(Some(r#"{"require": {"laravel/telescope": "*"}}"#), 3);

        let err = sh().telescope_prune(&app, 1, false).unwrap_err();
        assert!(matches!(
            err,
            PruneExecutionError::Failed { code: Some(3), ref output }
                if output.contains("pruned 3 entries")
        ));
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let (_root, app) = application(Some("{not json"), 0);

        assert!(matches!(
            sh().telescope_prune(&app, 1, false),
            Err(PruneExecutionError::Manifest { .. })
        ));
    }
}
