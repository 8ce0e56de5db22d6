use std::path::{Path, PathBuf};

use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::http::build_http_client;

/// Outcome of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub dest: PathBuf,
    pub bytes: u64,
    pub sha1: String,
}

/// Single-file downloader that never exposes a partial file at `dest`.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> ProvisionResult<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    /// Download `url` to `dest`, optionally validating SHA-1.
    ///
    /// Bytes are streamed into `<dest>.<uuid>.part` next to the target and
    /// renamed into place only after size and hash checks pass. A rejected
    /// `.part` file is left behind for inspection.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> ProvisionResult<DownloadReport> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProvisionError::io(parent, e))?;
        }

        let failed = |reason: String| ProvisionError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }

        let expected_len = response.content_length();
        let part_path = part_path_for(dest);
        let mut hasher = Sha1::new();
        let mut written: u64 = 0;

        // Handle is dropped at the end of this block, before the rename.
        {
            let mut file = tokio::fs::File::create(&part_path)
                .await
                .map_err(|e| ProvisionError::io(&part_path, e))?;

            while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
                hasher.update(&chunk);
                written += chunk.len() as u64;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ProvisionError::io(&part_path, e))?;
            }

            file.flush()
                .await
                .map_err(|e| ProvisionError::io(&part_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| ProvisionError::io(&part_path, e))?;
        }

        if written == 0 {
            warn!("Empty download kept at {:?}", part_path);
            return Err(failed("empty response body".into()));
        }

        if let Err(reason) = check_length(expected_len, written) {
            warn!("Truncated download kept at {:?}", part_path);
            return Err(failed(reason));
        }

        let actual = hex::encode(hasher.finalize());
        if let Some(expected) = sha1_expected {
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                warn!("Download with bad checksum kept at {:?}", part_path);
                return Err(ProvisionError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&part_path, dest)
            .await
            .map_err(|e| ProvisionError::io(dest, e))?;

        info!("Downloaded {} ({} bytes) -> {:?}", url, written, dest);
        debug!("SHA-1 of {:?}: {}", dest, actual);

        Ok(DownloadReport {
            dest: dest.to_path_buf(),
            bytes: written,
            sha1: actual,
        })
    }

    /// Validate an existing file's SHA-1.
    pub async fn validate_sha1(path: &Path, expected: &str) -> ProvisionResult<bool> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProvisionError::io(path, e))?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let actual = hex::encode(hasher.finalize());
        Ok(actual.eq_ignore_ascii_case(expected.trim()))
    }
}

fn part_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!("{}.{}.part", name, Uuid::new_v4()))
}

fn check_length(expected: Option<u64>, written: u64) -> Result<(), String> {
    match expected {
        Some(expected) if expected != written => Err(format!(
            "size mismatch: expected {} bytes, got {}",
            expected, written
        )),
        _ => Ok(()),
    }
}
