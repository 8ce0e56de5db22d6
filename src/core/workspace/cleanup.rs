use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{ProvisionError, ProvisionResult};

/// Delete every entry directly inside `dir`, keeping `dir` itself.
///
/// Each entry is attempted even if an earlier one failed; failures are
/// reported together as `CleanupFailed`. Entries that vanish concurrently
/// are not failures. A missing `dir` is a no-op. Returns the number of
/// entries removed.
pub async fn clear_children(dir: &Path) -> ProvisionResult<usize> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || clear_children_with(&dir, remove_entry)).await?
}

pub(crate) fn clear_children_with(
    dir: &Path,
    remove: impl Fn(&Path) -> std::io::Result<()>,
) -> ProvisionResult<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ProvisionError::io(dir, e)),
    };

    let mut removed = 0;
    let mut failures: Vec<(PathBuf, std::io::Error)> = Vec::new();

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                failures.push((dir.to_path_buf(), e));
                continue;
            }
        };

        match remove(&path) {
            Ok(()) => {
                debug!("Removed {:?}", path);
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => failures.push((path, e)),
        }
    }

    if !failures.is_empty() {
        return Err(ProvisionError::CleanupFailed {
            dir: dir.to_path_buf(),
            failures,
        });
    }

    info!("Cleared {} entries from {:?}", removed, dir);
    Ok(removed)
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    let metadata = std::fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(dir: &Path) {
        std::fs::write(dir.join("server.properties"), b"motd=test").unwrap();
        std::fs::write(dir.join("eula.txt"), b"eula=true").unwrap();
        std::fs::create_dir_all(dir.join("world/region")).unwrap();
        std::fs::write(dir.join("world/region/r.0.0.mca"), b"chunk").unwrap();
        std::fs::create_dir_all(dir.join("plugins")).unwrap();
    }

    #[tokio::test]
    async fn clears_files_and_directories() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path());

        let removed = clear_children(temp.path()).await.unwrap();

        assert_eq!(removed, 4);
        assert!(temp.path().is_dir());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_directory_is_a_no_op() {
        let temp = tempfile::tempdir().unwrap();
        let removed = clear_children(&temp.path().join("absent")).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn one_unremovable_entry_is_reported_and_the_rest_removed() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path());
        let locked = temp.path().join("server.properties");

        let err = clear_children_with(temp.path(), |path| {
            if path == locked {
                Err(std::io::Error::from(ErrorKind::PermissionDenied))
            } else {
                remove_entry(path)
            }
        })
        .unwrap_err();

        match err {
            ProvisionError::CleanupFailed { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, locked);
            }
            other => panic!("unexpected error: {other}"),
        }

        let remaining: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(remaining, vec![locked]);
    }

    #[test]
    fn entries_that_vanish_are_not_failures() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path());

        let removed = clear_children_with(temp.path(), |path| {
            remove_entry(path)?;
            Err(std::io::Error::from(ErrorKind::NotFound))
        })
        .unwrap();

        assert_eq!(removed, 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_unlinked_not_followed() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("precious.txt"), b"keep").unwrap();

        let temp = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).unwrap();

        clear_children_with(temp.path(), remove_entry).unwrap();

        assert!(outside.path().join("precious.txt").exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
