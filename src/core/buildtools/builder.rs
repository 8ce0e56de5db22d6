// ─── Server Builder ───
// Produces spigot-<version>.jar with BuildTools unless it is already there.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::artifact::SpigotJarArtifact;
use super::fetcher::{BuildToolFetcher, ToolSource};
use super::process::{Invocation, ProcessRunner};
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::java::{warn_if_low_disk_space, JavaRuntime, BUILD_MIN_FREE_BYTES};

pub struct ServerBuilder<S, R> {
    fetcher: BuildToolFetcher<S>,
    runner: R,
}

impl<S: ToolSource, R: ProcessRunner> ServerBuilder<S, R> {
    pub fn new(fetcher: BuildToolFetcher<S>, runner: R) -> Self {
        Self { fetcher, runner }
    }

    pub fn fetcher(&self) -> &BuildToolFetcher<S> {
        &self.fetcher
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Return the server jar for `artifact`, building it on a cache miss.
    ///
    /// BuildTools writes into a fresh `output-<uuid>` directory; the jar is
    /// moved to its final path only after BuildTools exits cleanly, so a
    /// crashed build never leaves a file that `exists()` would accept. The
    /// output directory of a failed build is kept for inspection.
    #[instrument(skip(self, artifact, java), fields(version = %artifact.version()))]
    pub async fn build(
        &self,
        build_tool_dir: &Path,
        artifact: &SpigotJarArtifact,
        java: &JavaRuntime,
    ) -> ProvisionResult<PathBuf> {
        let target = artifact.path();
        if artifact.exists().await {
            match artifact.read_record().await {
                Some(record) => info!(
                    "Reusing {:?} (built {} with Java {})",
                    target, record.built_at, record.java_major
                ),
                None => info!("Reusing {:?}", target),
            }
            return Ok(target);
        }

        let tool = self.fetcher.ensure_available(build_tool_dir).await?;
        warn_if_low_disk_space(build_tool_dir, BUILD_MIN_FREE_BYTES);

        let output_dir = build_tool_dir.join(format!("output-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| ProvisionError::io(&output_dir, e))?;

        let invocation = Invocation {
            label: "build-tools".into(),
            program: java.binary.clone(),
            args: vec![
                "-jar".into(),
                tool.to_string_lossy().to_string(),
                "--rev".into(),
                artifact.version().to_string(),
                "--output-dir".into(),
                output_dir.to_string_lossy().to_string(),
            ],
            cwd: build_tool_dir.to_path_buf(),
        };

        info!(
            "Building Spigot {} with Java {} (this can take several minutes)",
            artifact.version(),
            java.major
        );

        let output = match self.runner.run(&invocation).await {
            Ok(output) => output,
            Err(ProvisionError::LaunchFailed { program, source }) => {
                return Err(ProvisionError::BuildFailed {
                    code: None,
                    reason: format!("could not start {}: {}", program.display(), source),
                    tail: String::new(),
                })
            }
            Err(other) => return Err(other),
        };

        if !output.success() {
            warn!("BuildTools output kept in {:?}", output_dir);
            return Err(ProvisionError::BuildFailed {
                code: output.code,
                reason: "BuildTools exited unsuccessfully".into(),
                tail: output.tail_text(),
            });
        }

        let Some(produced) = find_produced_jar(&output_dir, artifact).await? else {
            warn!("BuildTools output kept in {:?}", output_dir);
            return Err(ProvisionError::BuildFailed {
                code: output.code,
                reason: format!("no spigot jar was produced in {}", output_dir.display()),
                tail: output.tail_text(),
            });
        };

        tokio::fs::rename(&produced, &target)
            .await
            .map_err(|e| ProvisionError::io(&target, e))?;

        if let Err(e) = tokio::fs::remove_dir_all(&output_dir).await {
            debug!("Could not remove {:?}: {}", output_dir, e);
        }

        if !artifact.exists().await {
            return Err(ProvisionError::BuildFailed {
                code: output.code,
                reason: format!("{} is missing after the build", target.display()),
                tail: output.tail_text(),
            });
        }

        artifact.write_record().await?;
        info!("Built {:?}", target);
        Ok(target)
    }
}

/// `spigot-<version>.jar` if present, else the only non-empty `spigot-*.jar`.
async fn find_produced_jar(
    output_dir: &Path,
    artifact: &SpigotJarArtifact,
) -> ProvisionResult<Option<PathBuf>> {
    let expected = output_dir.join(SpigotJarArtifact::file_name(artifact.version()));
    if super::fetcher::is_complete_file(&expected).await {
        return Ok(Some(expected));
    }

    let mut candidates = Vec::new();
    let mut entries = tokio::fs::read_dir(output_dir)
        .await
        .map_err(|e| ProvisionError::io(output_dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ProvisionError::io(output_dir, e))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        if name.starts_with("spigot-")
            && name.ends_with(".jar")
            && super::fetcher::is_complete_file(&path).await
        {
            candidates.push(path);
        }
    }

    if candidates.len() == 1 {
        Ok(candidates.pop())
    } else {
        Ok(None)
    }
}
