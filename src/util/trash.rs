use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};

/// Where swept files go. Files are never unlinked directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Trash {
    /// The trash of the running user (freedesktop trash on Linux).
    #[default]
    System,
    /// A plain directory files are moved into.
    Directory(PathBuf),
}

#[derive(Debug, Display, Error, From)]
pub enum TrashError {
    /// Moving to the system trash failed.
    #[display("Moving to trash failed: {_0}")]
    #[from]
    System(trash::Error),
    /// Moving into the trash directory failed.
    #[display("Moving to {} failed: {source}", target.display())]
    Directory { target: PathBuf, source: io::Error },
}

impl Trash {
    pub fn dispose(&self, path: &Path) -> Result<(), TrashError> {
        match self {
            Self::System => Ok(trash::delete(path)?),
            Self::Directory(dir) => move_into(dir, path),
        }
    }
}

fn move_into(dir: &Path, path: &Path) -> Result<(), TrashError> {
    let failed = |target: &Path| {
        let target = target.to_path_buf();
        move |source| TrashError::Directory { target, source }
    };

    fs::create_dir_all(dir).map_err(failed(dir))?;
    let target = free_name(dir, path);
    if fs::rename(path, &target).is_err() {
        // rename can't cross filesystems
        fs::copy(path, &target).map_err(failed(&target))?;
        fs::remove_file(path).map_err(failed(&target))?;
    }
    log::trace!(target: "retention", "Moved {} to {}", path.display(), target.display());
    Ok(())
}

/// `dir/<file name>`, suffixed with `.1`, `.2`, ... if already taken.
fn free_name(dir: &Path, path: &Path) -> PathBuf {
    let name = path.file_name().map(OsString::from).unwrap_or_default();
    let mut target = dir.join(&name);
    let mut n = 0;
    while target.exists() {
        n += 1;
        let mut suffixed = name.clone();
        suffixed.push(format!(".{n}"));
        target = dir.join(suffixed);
    }
    target
}
