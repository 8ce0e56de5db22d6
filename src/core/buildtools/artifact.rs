// ─── Spigot Jar Artifact ───
// Maps a server version to the jar BuildTools produces for it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fetcher::is_complete_file;
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::version::ServerVersion;

/// Sidecar written next to a freshly built jar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub version: String,
    pub java_major: u32,
    pub built_at: DateTime<Utc>,
}

/// The server jar for one version inside the build-tools directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpigotJarArtifact {
    build_tool_dir: PathBuf,
    version: ServerVersion,
    java_major: u32,
}

impl SpigotJarArtifact {
    /// `java_major` defaults to what the version requires.
    pub fn new(build_tool_dir: &Path, version: &str, java_major: Option<u32>) -> ProvisionResult<Self> {
        let version = ServerVersion::parse(version)?;
        let java_major = java_major.unwrap_or_else(|| version.required_java_major());
        Ok(Self {
            build_tool_dir: build_tool_dir.to_path_buf(),
            version,
            java_major,
        })
    }

    /// Expected jar path for `version`. Touches nothing on disk.
    pub fn resolve(build_tool_dir: &Path, version: &str) -> ProvisionResult<PathBuf> {
        let version = ServerVersion::parse(version)?;
        Ok(build_tool_dir.join(Self::file_name(&version)))
    }

    pub fn file_name(version: &ServerVersion) -> String {
        format!("spigot-{}.jar", version)
    }

    pub fn build_tool_dir(&self) -> &Path {
        &self.build_tool_dir
    }

    pub fn version(&self) -> &ServerVersion {
        &self.version
    }

    pub fn java_major(&self) -> u32 {
        self.java_major
    }

    pub fn path(&self) -> PathBuf {
        self.build_tool_dir.join(Self::file_name(&self.version))
    }

    pub fn record_path(&self) -> PathBuf {
        self.build_tool_dir
            .join(format!("spigot-{}.json", self.version))
    }

    /// Whether the jar is a regular, non-empty file.
    pub async fn exists(&self) -> bool {
        is_complete_file(&self.path()).await
    }

    pub async fn write_record(&self) -> ProvisionResult<ArtifactRecord> {
        let record = ArtifactRecord {
            version: self.version.to_string(),
            java_major: self.java_major,
            built_at: Utc::now(),
        };
        let path = self.record_path();
        let json = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| ProvisionError::io(&path, e))?;
        Ok(record)
    }

    /// The sidecar, if present and readable.
    pub async fn read_record(&self) -> Option<ArtifactRecord> {
        let bytes = tokio::fs::read(self.record_path()).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
