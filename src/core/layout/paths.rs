use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};

const SERVER_DIR: &str = "spigotServer";

/// Fixed directory layout under a project root.
///
/// ```text
/// <root>/spigotServer/
///   work/          live server working directory
///   snapshot/      cached server data restored before launch
///   build-tools/   BuildTools.jar and its output
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    project_root: PathBuf,
    work_dir: PathBuf,
    snapshot_dir: PathBuf,
    build_tool_dir: PathBuf,
}

impl PathLayout {
    /// Resolve the layout; a relative root is made absolute against the
    /// current directory. Nothing is created on disk.
    pub fn new(project_root: &Path) -> ProvisionResult<Self> {
        let project_root = std::path::absolute(project_root)
            .map_err(|e| ProvisionError::io(project_root, e))?;
        let server_root = project_root.join(SERVER_DIR);

        Ok(Self {
            work_dir: server_root.join("work"),
            snapshot_dir: server_root.join("snapshot"),
            build_tool_dir: server_root.join("build-tools"),
            project_root,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn build_tool_dir(&self) -> &Path {
        &self.build_tool_dir
    }

    /// `work/plugins`, where staged jars land.
    pub fn plugins_dir(&self) -> PathBuf {
        self.work_dir.join("plugins")
    }

    /// Create all three directories. Existing directories are left alone.
    pub async fn ensure_dirs(&self) -> ProvisionResult<()> {
        for dir in [&self.work_dir, &self.snapshot_dir, &self.build_tool_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ProvisionError::io(dir, e))?;
        }
        debug!("Directory layout ready under {:?}", self.project_root);
        Ok(())
    }
}
