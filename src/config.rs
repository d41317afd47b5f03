//! Settings of a single backup run.
//!
//! A [RunConfig] is built once at startup (see [`crate::cli`]) and handed to every component by
//! reference. Nothing below this module reads the process environment.

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;

use derive_more::{Display, Error};

/// Nesting level below the project root at which applications are searched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Depth {
    /// Applications are direct children of the root: `<root>/<app>`.
    One,
    /// Applications are grandchildren of the root: `<root>/<group>/<app>`.
    Two,
}

impl Depth {
    /// Glob pattern, relative to the root, matching the storage directories of this depth.
    pub const fn storage_pattern(self) -> &'static str {
        match self {
            Self::One => "*/storage/app",
            Self::Two => "*/*/storage/app",
        }
    }
}

impl TryFrom<u8> for Depth {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(ConfigurationError::InvalidDepth(other)),
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "1"),
            Self::Two => write!(f, "2"),
        }
    }
}

/// Fatal problems with the process-wide settings. Any of them aborts the run before I/O.
#[derive(Debug, Display, Error)]
pub enum ConfigurationError {
    /// `PROJECT_ROOT` is unset or empty.
    #[display("Project root is not defined, set PROJECT_ROOT")]
    MissingRoot,
    /// `PROJECT_DEPTH` is unset.
    #[display("Project depth is not defined, set PROJECT_DEPTH")]
    MissingDepth,
    /// The project root doesn't exist or isn't a directory.
    #[display("Project directory not found: {}", _0.display())]
    RootNotFound(#[error(ignore)] PathBuf),
    /// The project root can't be turned into a glob pattern.
    #[display("Project directory is not valid UTF-8: {}", _0.display())]
    RootNotUtf8(#[error(ignore)] PathBuf),
    /// Depth other than 1 or 2.
    #[display("Invalid value {_0} defined for depth, value must be 1 or 2")]
    InvalidDepth(#[error(ignore)] u8),
    /// Compression flag other than 0 or 1.
    #[display("Invalid value {_0} defined for compression, value must be 0 or 1")]
    InvalidCompression(#[error(ignore)] u8),
    /// The `.env` file of the working directory exists but can't be parsed.
    #[display("Reading the .env file failed: {_0}")]
    EnvFile(dotenvy::Error),
}

/// Immutable settings of one backup run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory below which applications are discovered. Always an existing directory.
    pub root: PathBuf,
    /// Nesting depth of the applications below [`root`](Self::root).
    pub depth: Depth,
    /// Pipe dumps through the compressor.
    pub compress: bool,
    /// Age in days after which backups are swept. [None] disables the sweep.
    pub retention_days: Option<NonZeroU32>,
    /// Hours passed to `telescope:prune`. [None] disables pruning.
    pub telescope_prune_hours: Option<u32>,
    /// Simulative run, see [`crate::butler`].
    pub dry_run: bool,
    /// Directory swept files are moved to instead of the system trash.
    pub trash_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Validates raw settings as they come from the environment.
    ///
    /// Negative `telescope_prune_hours` and zero `retention_days` are the "disabled" sentinels.
    pub fn new(
        root: Option<PathBuf>,
        depth: Option<u8>,
        compress: u8,
        retention_days: u32,
        telescope_prune_hours: i64,
    ) -> Result<Self, ConfigurationError> {
        let root = root
            .filter(|root| !root.as_os_str().is_empty())
            .ok_or(ConfigurationError::MissingRoot)?;
        let depth = Depth::try_from(depth.ok_or(ConfigurationError::MissingDepth)?)?;

        if !root.is_dir() {
            return Err(ConfigurationError::RootNotFound(root));
        }

        let compress = match compress {
            0 => false,
            1 => true,
            other => return Err(ConfigurationError::InvalidCompression(other)),
        };

        // clamp hours beyond u32
        let telescope_prune_hours = (telescope_prune_hours >= 0)
            .then(|| u32::try_from(telescope_prune_hours).unwrap_or(u32::MAX));

        Ok(Self {
            root,
            depth,
            compress,
            retention_days: NonZeroU32::new(retention_days),
            telescope_prune_hours,
            dry_run: false,
            trash_dir: None,
        })
    }
}
