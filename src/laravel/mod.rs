//! A hosted Laravel application as found by [`crate::discovery`].

pub mod artisan;

use std::fmt;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

pub use artisan::{Artisan, PruneExecutionError, PruneOutcome};

const BACKUP_DIR: &str = "backup";

const DB_DATABASE: &str = "DB_DATABASE";
const DB_USERNAME: &str = "DB_USERNAME";
const DB_PASSWORD: &str = "DB_PASSWORD";

/// A Laravel application, identified by its `storage/app` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    storage_dir: PathBuf,
}

impl Application {
    pub fn new(storage_dir: PathBuf) -> Self {
        Self { storage_dir }
    }

    /// The public storage directory (`<root>/storage/app`).
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// The application root, two levels above the storage directory.
    pub fn root(&self) -> PathBuf {
        self.storage_dir
            .ancestors()
            .nth(2)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.storage_dir.join("../.."))
    }

    /// Directory the database dumps of this application are kept in.
    pub fn backup_dir(&self) -> PathBuf {
        self.storage_dir.join(BACKUP_DIR)
    }

    pub fn env_file(&self) -> PathBuf {
        self.root().join(".env")
    }

    pub fn composer_manifest(&self) -> PathBuf {
        self.root().join("composer.json")
    }

    pub fn artisan(&self) -> PathBuf {
        self.root().join("artisan")
    }

    /// Reads the database credentials from the application's `.env`.
    ///
    /// `DB_DATABASE` and `DB_USERNAME` must be non-empty; an empty `DB_PASSWORD` is accepted.
    /// The database name ends up in a file name below [`backup_dir`](Self::backup_dir), so it
    /// must not contain a path separator. Nothing is cached, every call reads the file again.
    pub fn credentials(&self) -> Result<Credentials, CredentialResolutionError> {
        let env_file = self.env_file();
        log::trace!(target: "laravel::credentials", "Reading {}", env_file.display());

        let entries = dotenvy::from_path_iter(&env_file).map_err(|source| {
            CredentialResolutionError::EnvFile {
                path: env_file.clone(),
                source,
            }
        })?;

        let mut database = None;
        let mut username = None;
        let mut password = None;
        for entry in entries {
            let (key, value) = entry.map_err(|source| CredentialResolutionError::EnvFile {
                path: env_file.clone(),
                source,
            })?;
            match key.as_str() {
                DB_DATABASE => database = Some(value),
                DB_USERNAME => username = Some(value),
                DB_PASSWORD => password = Some(value),
                _ => {}
            }
        }

        let missing = |key: &'static str| CredentialResolutionError::MissingKey {
            path: env_file.clone(),
            key,
        };
        let database = database
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing(DB_DATABASE))?;
        if database.contains(std::path::is_separator) {
            return Err(CredentialResolutionError::InvalidDatabase {
                path: env_file,
                database,
            });
        }

        Ok(Credentials {
            database,
            username: username
                .filter(|v| !v.is_empty())
                .ok_or_else(|| missing(DB_USERNAME))?,
            password: password.ok_or_else(|| missing(DB_PASSWORD))?,
        })
    }
}

/// Database credentials of one application.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub database: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The credentials of an application can't be determined.
#[derive(Debug, Display, Error)]
pub enum CredentialResolutionError {
    /// The `.env` file is missing or malformed.
    #[display("Reading {} failed: {source}", path.display())]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    /// A required key is missing or empty.
    #[display("{key} is not defined in {}", path.display())]
    MissingKey { path: PathBuf, key: &'static str },
    /// The database name can't be used in a backup file name.
    #[display("{DB_DATABASE} {database:?} in {} contains a path separator", path.display())]
    InvalidDatabase { path: PathBuf, database: String },
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn application(env: Option<&str>) -> (tempfile::TempDir, Application) {
        let root = tempfile::tempdir().unwrap();
        let storage_dir = root.path().join("shop/storage/app");
        fs::create_dir_all(&storage_dir).unwrap();
        if let Some(env) = env {
            fs::write(root.path().join("shop/.env"), env).unwrap();
        }
        (root, Application::new(storage_dir))
    }

    #[test]
    fn paths_are_derived_from_storage_dir() {
        let app = Application::new(PathBuf::from("/srv/www/shop/storage/app"));
        assert_eq!(app.root(), PathBuf::from("/srv/www/shop"));
        assert_eq!(app.backup_dir(), PathBuf::from("/srv/www/shop/storage/app/backup"));
        assert_eq!(app.env_file(), PathBuf::from("/srv/www/shop/.env"));
        assert_eq!(app.artisan(), PathBuf::from("/srv/www/shop/artisan"));
    }

    #[test]
    fn credentials_are_read_from_env_file() {
        let (_root, app) = application(Some(concat!(
            "APP_NAME=Shop\nDB_CONNECTION=mysql\n",
            "DB_DATABASE=shop\nDB_USERNAME=shop_user\nDB_PASSWORD=\"s3cr3t #1\"\n",
        )));

        let credentials = app.credentials().unwrap();
        assert_eq!(credentials.database, "shop");
        assert_eq!(credentials.username, "shop_user");
        assert_eq!(credentials.password, "s3cr3t #1");
    }

    #[test]
    fn empty_password_is_accepted() {
        let (_root, app) = application(Some("DB_DATABASE=shop\nDB_USERNAME=root\nDB_PASSWORD=\n"));
        assert_eq!(app.credentials().unwrap().password, "");
    }

    #[test]
    fn missing_key_is_reported() {
        let (_root, app) = application(Some("DB_DATABASE=shop\nDB_PASSWORD=secret\n"));
        assert!(matches!(
            app.credentials(),
            Err(CredentialResolutionError::MissingKey { key: DB_USERNAME, .. })
        ));

        let (_root, app) = application(Some("DB_DATABASE=\nDB_USERNAME=root\nDB_PASSWORD=x\n"));
        assert!(matches!(
            app.credentials(),
            Err(CredentialResolutionError::MissingKey { key: DB_DATABASE, .. })
        ));
    }

    #[test]
    fn database_name_cannot_leave_backup_dir() {
        let (root, app) = application(Some(
            "DB_DATABASE=../../../escaped\nDB_USERNAME=root\nDB_PASSWORD=secret\n",
        ));

        assert!(matches!(
            app.credentials(),
            Err(CredentialResolutionError::InvalidDatabase { ref database, .. })
                if database == "../../../escaped"
        ));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_env_file_is_reported() {
        let (_root, app) = application(None);
        assert!(matches!(
            app.credentials(),
            Err(CredentialResolutionError::EnvFile { .. })
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let credentials = Credentials {
            database: "shop".into(),
            username: "root".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("shop"));
        assert!(!debug.contains("hunter2"));
    }
}
