// ─── Build Tool Fetcher ───
// Makes sure BuildTools.jar is present in the build-tools directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{ProvisionError, ProvisionResult};

pub const BUILD_TOOLS_JAR: &str = "BuildTools.jar";

pub const BUILD_TOOLS_URL: &str =
    "https://hub.spigotmc.org/jenkins/job/BuildTools/lastSuccessfulBuild/artifact/target/BuildTools.jar";

/// Where BuildTools.jar comes from.
///
/// Implementations must only make `dest` appear once it is complete.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn fetch(&self, dest: &Path) -> ProvisionResult<()>;

    /// Pinned SHA-1 of the tool, if any. An existing file that does not
    /// match it is fetched again.
    fn expected_sha1(&self) -> Option<&str> {
        None
    }
}

/// Downloads BuildTools over HTTP, optionally pinning its SHA-1.
pub struct HttpToolSource {
    downloader: Downloader,
    url: String,
    sha1: Option<String>,
}

impl HttpToolSource {
    pub fn new(downloader: Downloader, url: Option<String>, sha1: Option<String>) -> Self {
        Self {
            downloader,
            url: url.unwrap_or_else(|| BUILD_TOOLS_URL.to_string()),
            sha1,
        }
    }
}

#[async_trait]
impl ToolSource for HttpToolSource {
    async fn fetch(&self, dest: &Path) -> ProvisionResult<()> {
        self.downloader
            .download_file(&self.url, dest, self.sha1.as_deref())
            .await
            .map(|_| ())
    }

    fn expected_sha1(&self) -> Option<&str> {
        self.sha1.as_deref()
    }
}

pub struct BuildToolFetcher<S> {
    source: S,
}

impl<S> BuildToolFetcher<S> {
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: ToolSource> BuildToolFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn tool_path(target_dir: &Path) -> PathBuf {
        target_dir.join(BUILD_TOOLS_JAR)
    }

    /// Returns the path of BuildTools.jar, downloading it only if absent.
    #[instrument(skip(self))]
    pub async fn ensure_available(&self, target_dir: &Path) -> ProvisionResult<PathBuf> {
        let path = Self::tool_path(target_dir);
        if is_complete_file(&path).await {
            match self.source.expected_sha1() {
                Some(expected) if !Downloader::validate_sha1(&path, expected).await? => {
                    warn!("{:?} does not match the pinned SHA-1, fetching it again", path);
                    tokio::fs::remove_file(&path)
                        .await
                        .map_err(|e| ProvisionError::io(&path, e))?;
                }
                _ => {
                    debug!("BuildTools already present at {:?}", path);
                    return Ok(path);
                }
            }
        }

        info!("Downloading BuildTools into {:?}", target_dir);
        self.source.fetch(&path).await?;

        if !is_complete_file(&path).await {
            return Err(ProvisionError::DownloadFailed {
                url: path.display().to_string(),
                reason: "tool source reported success but no file was written".into(),
            });
        }
        Ok(path)
    }
}

/// A regular file with at least one byte.
pub(crate) async fn is_complete_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}
