// ─── Provisioning Pipeline ───
// Runs the stages in dependency order and tags every failure with its stage:
//
//   cleanup? → fetch + build → stage plugins → restore snapshot
//            → eula + classpath → launch → persist snapshot?

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::core::buildtools::{
    BuildToolFetcher, HttpToolSource, ProcessRunner, ServerBuilder, SpigotJarArtifact,
    SystemProcessRunner, ToolSource,
};
use crate::core::config::ProvisioningConfig;
use crate::core::downloader::Downloader;
use crate::core::error::{ProvisionError, Stage, StageContext, StageFailure};
use crate::core::java::JavaRuntime;
use crate::core::launch::{
    build_server_args, write_eula_acceptance, ClasspathRegistry, LaunchSpec, LaunchState,
    ServerLauncher, DEFAULT_SHUTDOWN_GRACE,
};
use crate::core::layout::PathLayout;
use crate::core::workspace::{clear_children, PluginStager, SnapshotCache};

/// What a full run ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No server version configured; nothing was done.
    Disabled,
    Completed(LaunchReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub state: LaunchState,
    pub server_jar: PathBuf,
    pub staged: Vec<PathBuf>,
    pub snapshot_persisted: bool,
}

impl LaunchReport {
    /// Exit code for the hosting process: the server's own code, 130 after
    /// a cancel, 1 if the server was ended by a signal.
    pub fn exit_code(&self) -> i32 {
        match self.state {
            LaunchState::Exited(Some(code)) => code,
            LaunchState::Killed => 130,
            _ => 1,
        }
    }
}

/// The server version and the java that builds and runs it.
#[derive(Debug, Clone)]
struct Target {
    artifact: SpigotJarArtifact,
    java: JavaRuntime,
}

pub struct Pipeline<S, R> {
    config: ProvisioningConfig,
    layout: PathLayout,
    target: Option<Target>,
    builder: ServerBuilder<S, R>,
    cancel: CancellationToken,
    shutdown_grace: Duration,
}

impl Pipeline<HttpToolSource, SystemProcessRunner> {
    /// Resolve `config` against the real network and process environment.
    pub fn configure(config: ProvisioningConfig) -> Result<Self, StageFailure> {
        let downloader = Downloader::new().stage(Stage::Configure)?;
        let source = HttpToolSource::new(
            downloader,
            config.build_tools_url.clone(),
            config.build_tools_sha1.clone(),
        );
        Self::configure_with(config, source, SystemProcessRunner)
    }
}

impl<S: ToolSource, R: ProcessRunner> Pipeline<S, R> {
    /// Resolve `config` once. Fails on a malformed version; a missing
    /// version yields a disabled pipeline.
    pub fn configure_with(
        config: ProvisioningConfig,
        source: S,
        runner: R,
    ) -> Result<Self, StageFailure> {
        let root = if config.project_root.as_os_str().is_empty() {
            Path::new(".")
        } else {
            config.project_root.as_path()
        };
        let layout = PathLayout::new(root).stage(Stage::Configure)?;

        let target = match config.version.as_deref().filter(|_| config.is_enabled()) {
            Some(version) => {
                let artifact =
                    SpigotJarArtifact::new(layout.build_tool_dir(), version.trim(), config.java_version)
                        .stage(Stage::Configure)?;
                let java = JavaRuntime::resolve(artifact.java_major(), config.java_home.as_deref());
                info!(
                    "Configured Spigot {} with Java {} ({:?})",
                    artifact.version(),
                    java.major,
                    java.binary
                );
                Some(Target { artifact, java })
            }
            None => None,
        };

        Ok(Self {
            config,
            layout,
            target,
            builder: ServerBuilder::new(BuildToolFetcher::new(source), runner),
            cancel: CancellationToken::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Cancelling this token stops a running build or server.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use `java` instead of the runtime found in the environment.
    pub fn with_java(mut self, java: JavaRuntime) -> Self {
        if let Some(target) = self.target.as_mut() {
            target.java = java;
        }
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    pub fn builder(&self) -> &ServerBuilder<S, R> {
        &self.builder
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Every stage in order. Persisting only happens after a clean exit.
    #[instrument(skip(self), fields(root = ?self.layout.project_root()))]
    pub async fn run(&self) -> Result<RunOutcome, StageFailure> {
        let Some(target) = &self.target else {
            info!("No server version configured, skipping");
            return Ok(RunOutcome::Disabled);
        };

        self.layout.ensure_dirs().await.stage(Stage::Configure)?;
        if self.config.cleanup {
            self.checkpoint(Stage::Cleanup)?;
            self.clean_server().await?;
        }

        self.checkpoint(Stage::BuildServer)?;
        let server_jar = self.build_server(target).await?;
        self.checkpoint(Stage::StagePlugins)?;
        let staged = self.stage_plugins().await?;
        self.checkpoint(Stage::RestoreSnapshot)?;
        SnapshotCache::restore(self.layout.snapshot_dir(), self.layout.work_dir())
            .await
            .stage(Stage::RestoreSnapshot)?;
        self.checkpoint(Stage::PrepareEnvironment)?;
        let registry = self.prepare_environment().await?;
        self.checkpoint(Stage::Launch)?;
        let state = self.launch(target, &server_jar, &registry).await?;

        let snapshot_persisted = if !self.config.persist_snapshot {
            false
        } else if state == LaunchState::Exited(Some(0)) {
            self.persist_snapshot().await?;
            true
        } else {
            warn!("Server ended with {:?}, snapshot left unchanged", state);
            false
        };

        Ok(RunOutcome::Completed(LaunchReport {
            state,
            server_jar,
            staged,
            snapshot_persisted,
        }))
    }

    /// Fetch BuildTools and build the server jar, nothing else. `None` when
    /// the pipeline is disabled.
    pub async fn prepare(&self) -> Result<Option<PathBuf>, StageFailure> {
        let Some(target) = &self.target else {
            info!("No server version configured, skipping");
            return Ok(None);
        };
        self.layout.ensure_dirs().await.stage(Stage::Configure)?;
        self.build_server(target).await.map(Some)
    }

    pub async fn stage_plugins(&self) -> Result<Vec<PathBuf>, StageFailure> {
        PluginStager::stage(&self.config.projects, &self.layout.plugins_dir())
            .await
            .stage(Stage::StagePlugins)
    }

    pub async fn clean_server(&self) -> Result<usize, StageFailure> {
        clear_children(self.layout.work_dir())
            .await
            .stage(Stage::Cleanup)
    }

    pub async fn clean_build(&self) -> Result<usize, StageFailure> {
        clear_children(self.layout.build_tool_dir())
            .await
            .stage(Stage::Cleanup)
    }

    pub async fn persist_snapshot(&self) -> Result<usize, StageFailure> {
        SnapshotCache::persist(self.layout.work_dir(), self.layout.snapshot_dir())
            .await
            .stage(Stage::PersistSnapshot)
    }

    /// Stop before `next` once the operator has cancelled.
    fn checkpoint(&self, next: Stage) -> Result<(), StageFailure> {
        if self.cancel.is_cancelled() {
            info!("Cancelled before {}", next);
            return Err(StageFailure {
                stage: next,
                source: ProvisionError::Cancelled,
            });
        }
        Ok(())
    }

    async fn build_server(&self, target: &Target) -> Result<PathBuf, StageFailure> {
        let build = self
            .builder
            .build(self.layout.build_tool_dir(), &target.artifact, &target.java);

        let result = tokio::select! {
            result = build => result,
            _ = self.cancel.cancelled() => Err(ProvisionError::Cancelled),
        };

        result.map_err(|source| {
            let stage = match source {
                ProvisionError::DownloadFailed { .. }
                | ProvisionError::Sha1Mismatch { .. }
                | ProvisionError::Http(_) => Stage::FetchBuildTool,
                _ => Stage::BuildServer,
            };
            StageFailure { stage, source }
        })
    }

    async fn prepare_environment(&self) -> Result<ClasspathRegistry, StageFailure> {
        write_eula_acceptance(self.layout.work_dir())
            .await
            .stage(Stage::PrepareEnvironment)?;

        let mut registry = ClasspathRegistry::new();
        for project in &self.config.projects {
            registry
                .register(project)
                .stage(Stage::PrepareEnvironment)?;
        }
        Ok(registry)
    }

    async fn launch(
        &self,
        target: &Target,
        server_jar: &Path,
        registry: &ClasspathRegistry,
    ) -> Result<LaunchState, StageFailure> {
        let spec = LaunchSpec {
            java: target.java.binary.clone(),
            jvm_args: self.config.jvm_args.clone(),
            classpath_property: self.config.classpath_property.clone(),
            classpath: registry.to_property_string(),
            server_jar: server_jar.to_path_buf(),
            server_args: build_server_args(&self.config.args, target.artifact.version()),
            work_dir: self.layout.work_dir().to_path_buf(),
        };

        ServerLauncher::new()
            .with_shutdown_grace(self.shutdown_grace)
            .launch(&spec, &self.cancel)
            .await
            .stage(Stage::Launch)
    }
}
