use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the provisioning backend.
/// Every module returns `Result<T, ProvisionError>`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    // ── Configuration ───────────────────────────────────
    #[error("Invalid server version: {0:?}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Build tool ──────────────────────────────────────
    #[error("Build tools failed (code {code:?}): {reason}\n{tail}")]
    BuildFailed {
        code: Option<i32>,
        reason: String,
        tail: String,
    },

    // ── Workspace ───────────────────────────────────────
    #[error("Could not clear {dir:?}: {}", format_cleanup_failures(.failures))]
    CleanupFailed {
        dir: PathBuf,
        failures: Vec<(PathBuf, std::io::Error)>,
    },

    #[error("Plugin staging conflict: {0}")]
    StageConflict(String),

    // ── Process ─────────────────────────────────────────
    #[error("Failed to launch {program:?}: {source}")]
    LaunchFailed {
        program: PathBuf,
        source: std::io::Error,
    },

    // ── Serialization ───────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Cancelled by operator")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_cleanup_failures(failures: &[(PathBuf, std::io::Error)]) -> String {
    failures
        .iter()
        .map(|(path, err)| format!("{}: {}", path.display(), err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Cleanup,
    FetchBuildTool,
    BuildServer,
    StagePlugins,
    RestoreSnapshot,
    PrepareEnvironment,
    Launch,
    PersistSnapshot,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configure => "configure",
            Stage::Cleanup => "cleanup",
            Stage::FetchBuildTool => "fetch-build-tool",
            Stage::BuildServer => "build-server",
            Stage::StagePlugins => "stage-plugins",
            Stage::RestoreSnapshot => "restore-snapshot",
            Stage::PrepareEnvironment => "prepare-environment",
            Stage::Launch => "launch",
            Stage::PersistSnapshot => "persist-snapshot",
        };
        f.write_str(name)
    }
}

/// An error tagged with the pipeline step that produced it.
#[derive(Debug, Error)]
#[error("[{stage}] {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: ProvisionError,
}

/// Attaches a [`Stage`] to a `ProvisionResult`.
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T, StageFailure>;
}

impl<T> StageContext<T> for ProvisionResult<T> {
    fn stage(self, stage: Stage) -> Result<T, StageFailure> {
        self.map_err(|source| StageFailure { stage, source })
    }
}
