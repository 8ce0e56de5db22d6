// ─── Snapshot Cache ───
// Keeps generated server data (worlds, configs) between runs so they are not regenerated.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::error::{ProvisionError, ProvisionResult};

/// Work-dir entries that `persist` saves. Plugin jars are never part of a
/// snapshot; they are staged fresh on every run.
pub const SNAPSHOT_ENTRIES: &[&str] = &[
    "world",
    "world_nether",
    "world_the_end",
    "server.properties",
    "bukkit.yml",
    "spigot.yml",
    "commands.yml",
    "help.yml",
    "permissions.yml",
    "ops.json",
    "whitelist.json",
    "banned-players.json",
    "banned-ips.json",
];

pub struct SnapshotCache;

impl SnapshotCache {
    /// Copy everything under `snapshot_dir` into `work_dir`, overwriting.
    ///
    /// Absent or empty snapshot directories restore nothing. Returns the
    /// number of files copied.
    #[instrument]
    pub async fn restore(snapshot_dir: &Path, work_dir: &Path) -> ProvisionResult<usize> {
        let from = snapshot_dir.to_path_buf();
        let to = work_dir.to_path_buf();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&from, &to, &copy_file)).await??;

        if copied == 0 {
            debug!("No snapshot to restore from {:?}", snapshot_dir);
        } else {
            info!("Restored {} snapshot files into {:?}", copied, work_dir);
        }
        Ok(copied)
    }

    /// Replace the snapshot with the current server data in `work_dir`.
    ///
    /// Only [`SNAPSHOT_ENTRIES`] that exist are saved. The new snapshot is
    /// assembled next to the old one and swapped in, so a failed copy leaves
    /// the previous snapshot intact. Returns the number of files written.
    #[instrument]
    pub async fn persist(work_dir: &Path, snapshot_dir: &Path) -> ProvisionResult<usize> {
        let from = work_dir.to_path_buf();
        let to = snapshot_dir.to_path_buf();
        let copied =
            tokio::task::spawn_blocking(move || persist_with(&from, &to, &copy_file)).await??;

        info!("Saved {} files to snapshot {:?}", copied, snapshot_dir);
        Ok(copied)
    }
}

type CopyFn<'a> = &'a dyn Fn(&Path, &Path) -> ProvisionResult<()>;

pub(crate) fn persist_with(
    work_dir: &Path,
    snapshot_dir: &Path,
    copy: CopyFn<'_>,
) -> ProvisionResult<usize> {
    let staging = sibling_dir(snapshot_dir, "staging");
    std::fs::create_dir_all(&staging).map_err(|e| ProvisionError::io(&staging, e))?;

    let copied = match copy_entries(work_dir, &staging, copy) {
        Ok(copied) => copied,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                warn!("Could not remove {:?}: {}", staging, cleanup);
            }
            return Err(e);
        }
    };

    swap_into_place(&staging, snapshot_dir)?;
    Ok(copied)
}

fn copy_entries(work_dir: &Path, target_dir: &Path, copy: CopyFn<'_>) -> ProvisionResult<usize> {
    let mut copied = 0;
    for name in SNAPSHOT_ENTRIES {
        let source = work_dir.join(name);
        let Ok(metadata) = std::fs::symlink_metadata(&source) else {
            continue;
        };
        let target = target_dir.join(name);
        if metadata.is_dir() {
            copied += copy_tree(&source, &target, copy)?;
        } else if metadata.is_file() {
            copy(&source, &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Move `staging` to `snapshot_dir`, retiring the previous snapshot only
/// once the new one is in place.
fn swap_into_place(staging: &Path, snapshot_dir: &Path) -> ProvisionResult<()> {
    let retired = sibling_dir(snapshot_dir, "old");
    let had_previous = match std::fs::rename(snapshot_dir, &retired) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(ProvisionError::io(snapshot_dir, e)),
    };

    if let Err(e) = std::fs::rename(staging, snapshot_dir) {
        if had_previous {
            if let Err(restore) = std::fs::rename(&retired, snapshot_dir) {
                warn!("Previous snapshot left at {:?}: {}", retired, restore);
            }
        }
        return Err(ProvisionError::io(snapshot_dir, e));
    }

    if had_previous {
        if let Err(e) = std::fs::remove_dir_all(&retired) {
            debug!("Could not remove {:?}: {}", retired, e);
        }
    }
    Ok(())
}

/// `.<name>.<tag>-<uuid>` next to `dir`.
fn sibling_dir(dir: &Path, tag: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string());
    dir.with_file_name(format!(".{}.{}-{}", name, tag, Uuid::new_v4()))
}

/// Recursively copy regular files from `from` into `to`, creating
/// directories as needed. Symlinks are skipped. A missing `from` copies
/// nothing.
fn copy_tree(from: &Path, to: &Path, copy: CopyFn<'_>) -> ProvisionResult<usize> {
    if !from.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;
    let mut stack: Vec<PathBuf> = vec![from.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| ProvisionError::io(&current, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ProvisionError::io(&current, e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| ProvisionError::io(&path, e))?;

            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let relative = path.strip_prefix(from).unwrap_or(&path);
                copy(&path, &to.join(relative))?;
                copied += 1;
            } else {
                debug!("Skipping non-regular entry {:?}", path);
            }
        }
    }

    Ok(copied)
}

fn copy_file(source: &Path, target: &Path) -> ProvisionResult<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
    }
    std::fs::copy(source, target).map_err(|e| ProvisionError::io(target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn listing(dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(&current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path.strip_prefix(dir).unwrap().to_path_buf());
                }
            }
        }
        files.sort();
        files
    }

    #[tokio::test]
    async fn restore_from_absent_snapshot_is_a_no_op() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        write(&work.join("eula.txt"), b"eula=true");

        let copied = SnapshotCache::restore(&temp.path().join("missing"), &work)
            .await
            .unwrap();

        assert_eq!(copied, 0);
        assert_eq!(listing(&work), vec![PathBuf::from("eula.txt")]);
    }

    #[tokio::test]
    async fn restore_from_empty_snapshot_is_a_no_op() {
        let temp = tempfile::tempdir().unwrap();
        let snapshot = temp.path().join("snapshot");
        std::fs::create_dir_all(&snapshot).unwrap();
        let work = temp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();

        assert_eq!(SnapshotCache::restore(&snapshot, &work).await.unwrap(), 0);
        assert!(listing(&work).is_empty());
    }

    #[tokio::test]
    async fn restore_overwrites_and_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let snapshot = temp.path().join("snapshot");
        let work = temp.path().join("work");
        write(&snapshot.join("world/level.dat"), b"fresh");
        write(&snapshot.join("server.properties"), b"motd=snap");
        write(&work.join("server.properties"), b"motd=stale");

        let copied = SnapshotCache::restore(&snapshot, &work).await.unwrap();

        assert_eq!(copied, 2);
        assert_eq!(std::fs::read(work.join("world/level.dat")).unwrap(), b"fresh");
        assert_eq!(
            std::fs::read(work.join("server.properties")).unwrap(),
            b"motd=snap"
        );
    }

    #[test]
    fn failed_persist_keeps_previous_snapshot() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        let snapshot = temp.path().join("snapshot");
        write(&snapshot.join("server.properties"), b"motd=good");
        write(&snapshot.join("world/level.dat"), b"good world");
        write(&work.join("server.properties"), b"motd=new");
        write(&work.join("ops.json"), b"[]");

        let locked = |source: &Path, target: &Path| -> ProvisionResult<()> {
            if source.ends_with("ops.json") {
                return Err(ProvisionError::io(
                    source,
                    std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                ));
            }
            copy_file(source, target)
        };
        let err = persist_with(&work, &snapshot, &locked).unwrap_err();

        assert!(matches!(err, ProvisionError::Io { .. }));
        assert_eq!(
            listing(&snapshot),
            vec![
                PathBuf::from("server.properties"),
                PathBuf::from("world/level.dat"),
            ]
        );
        assert_eq!(
            std::fs::read(snapshot.join("server.properties")).unwrap(),
            b"motd=good"
        );
        let mut siblings: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        siblings.sort();
        assert_eq!(siblings, vec!["snapshot", "work"]);
    }

    #[tokio::test]
    async fn persist_creates_missing_snapshot_dir() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        let snapshot = temp.path().join("snapshot");
        write(&work.join("bukkit.yml"), b"settings: {}");

        assert_eq!(SnapshotCache::persist(&work, &snapshot).await.unwrap(), 1);
        assert_eq!(listing(&snapshot), vec![PathBuf::from("bukkit.yml")]);
    }

    #[tokio::test]
    async fn persist_then_restore_reproduces_server_data() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        let snapshot = temp.path().join("snapshot");

        write(&work.join("world/region/r.0.0.mca"), &[0u8, 1, 2, 3, 255]);
        write(&work.join("world_nether/DIM-1/level.dat"), b"nether");
        write(&work.join("server.properties"), b"online-mode=false");
        write(&work.join("plugins/runSpigotServer-demo.jar"), b"plugin");
        write(&work.join("logs/latest.log"), b"log");
        write(&snapshot.join("stale.txt"), b"old");

        let saved = SnapshotCache::persist(&work, &snapshot).await.unwrap();
        assert_eq!(saved, 3);
        assert!(!snapshot.join("stale.txt").exists());
        assert!(!snapshot.join("plugins").exists());
        assert!(!snapshot.join("logs").exists());

        let fresh_work = temp.path().join("fresh");
        SnapshotCache::restore(&snapshot, &fresh_work).await.unwrap();

        assert_eq!(
            listing(&fresh_work),
            vec![
                PathBuf::from("server.properties"),
                PathBuf::from("world/region/r.0.0.mca"),
                PathBuf::from("world_nether/DIM-1/level.dat"),
            ]
        );
        for file in listing(&fresh_work) {
            assert_eq!(
                std::fs::read(fresh_work.join(&file)).unwrap(),
                std::fs::read(work.join(&file)).unwrap()
            );
        }
    }
}
