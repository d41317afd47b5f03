//! Backends producing the database backups.
//!
//! Currently the following backends are implemented:
//!
//! - [MySqlDump]: `mysqldump` of an application's database, optionally piped through `gzip`.

pub mod mysqldump;

pub use mysqldump::{BackupArtifact, DumpExecutionError, DumpStage, MySqlDump};
