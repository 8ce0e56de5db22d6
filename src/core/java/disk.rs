use std::path::Path;

use tracing::warn;

/// Free space BuildTools needs for a full Spigot build.
pub const BUILD_MIN_FREE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Available bytes on the disk holding `path`, if it can be determined.
pub fn available_space(path: &Path) -> Option<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    available
}

/// Log a warning when less than `minimum_bytes` is free. Returns `false` in that case.
pub fn warn_if_low_disk_space(path: &Path, minimum_bytes: u64) -> bool {
    match available_space(path) {
        Some(bytes) if bytes < minimum_bytes => {
            warn!(
                "Low disk space at {:?}: {} MiB free, {} MiB recommended",
                path,
                bytes / (1024 * 1024),
                minimum_bytes / (1024 * 1024)
            );
            false
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_requirement_is_always_satisfied() {
        let temp = tempfile::tempdir().unwrap();
        assert!(warn_if_low_disk_space(temp.path(), 0));
    }
}
