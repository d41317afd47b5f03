//! Finds the Laravel applications below the project root.
//!
//! Applications are recognised by their `storage/app` directory, see [`Depth::storage_pattern`].

use std::path::Path;

use crate::config::{ConfigurationError, Depth};
use crate::laravel::Application;

/// Lazily enumerates the applications `depth` levels below `root`.
///
/// Matches that are not directories are skipped, as are entries that can't be read.
/// The sequence is ordered the way [glob] lists the filesystem.
pub fn discover(
    root: &Path,
    depth: Depth,
) -> Result<impl Iterator<Item = Application>, ConfigurationError> {
    if !root.is_dir() {
        return Err(ConfigurationError::RootNotFound(root.to_path_buf()));
    }
    let escaped_root = root
        .to_str()
        .map(glob::Pattern::escape)
        .ok_or_else(|| ConfigurationError::RootNotUtf8(root.to_path_buf()))?;
    let pattern = format!(
        "{}/{}",
        escaped_root.trim_end_matches('/'),
        depth.storage_pattern()
    );
    log::debug!(target: "discovery", "Searching for applications matching {pattern}");

    let paths =
        glob::glob(&pattern).expect("escaped root and storage pattern should form a valid glob");

    Ok(paths.filter_map(|entry| match entry {
        Ok(path) if path.is_dir() => Some(Application::new(path)),
        Ok(path) => {
            log::trace!(target: "discovery", "Skipping {}, not a directory", path.display());
            None
        }
        Err(e) => {
            log::warn!(target: "discovery", "Skipping unreadable path: {e}");
            None
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;

    fn storage_dirs(root: &Path, depth: Depth) -> Vec<PathBuf> {
        let mut found: Vec<_> = discover(root, depth)
            .unwrap()
            .map(|app| app.storage_dir().to_path_buf())
            .collect();
        found.sort();
        found
    }

    #[test]
    fn depth_selects_nesting_level() {
        let root = tempfile::tempdir().unwrap();
        let shallow = root.path().join("shop/storage/app");
        let nested = root.path().join("clients/blog/storage/app");
        let too_deep = root.path().join("a/b/c/storage/app");
        for dir in [&shallow, &nested, &too_deep] {
            fs::create_dir_all(dir).unwrap();
        }

        assert_eq!(storage_dirs(root.path(), Depth::One), vec![shallow]);
        assert_eq!(storage_dirs(root.path(), Depth::Two), vec![nested]);
    }

    #[test]
    fn non_directories_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("broken/storage")).unwrap();
        fs::write(root.path().join("broken/storage/app"), b"").unwrap();
        fs::create_dir_all(root.path().join("shop/storage/app")).unwrap();

        assert_eq!(
            storage_dirs(root.path(), Depth::One),
            vec![root.path().join("shop/storage/app")]
        );
    }

    #[test]
    fn empty_root_yields_nothing() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(discover(root.path(), Depth::Two).unwrap().count(), 0);
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("missing");
        assert!(matches!(
            discover(&missing, Depth::One),
            Err(ConfigurationError::RootNotFound(path)) if path == missing
        ));
    }

    #[test]
    fn glob_characters_in_root_are_literal() {
        let root = tempfile::tempdir().unwrap();
        let hosting = root.path().join("www[1]");
        fs::create_dir_all(hosting.join("shop/storage/app")).unwrap();

        assert_eq!(
            storage_dirs(&hosting, Depth::One),
            vec![hosting.join("shop/storage/app")]
        );
    }
}
