use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::config::ProvisioningConfig;
use crate::core::error::{Stage, StageContext, StageFailure};
use crate::core::pipeline::{Pipeline, RunOutcome};
use crate::signals::cancel_on_shutdown_signal;

#[derive(Debug, Parser)]
#[command(
    name = "spigot-runner",
    about = "Build, provision and launch a local Spigot server for plugin testing",
    disable_version_flag = true
)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    /// Log filter, e.g. `debug` or `info,spigot_runner_lib=trace`; `RUST_LOG` wins
    #[arg(long, global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<CommandKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum CommandKind {
    /// Build, stage and launch the server (default)
    Run,
    /// Fetch BuildTools and build the server jar only
    Prepare,
    /// Copy the project jars into the server's plugins folder
    Stage,
    /// Delete everything in the server work directory
    CleanServer,
    /// Delete BuildTools and every built server jar
    CleanBuild,
    /// Save the current server data as the snapshot
    Snapshot,
}

/// Flags that take precedence over `spigot-runner.json`.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    #[arg(long, global = true, default_value = ".", value_name = "DIR")]
    pub project_root: PathBuf,

    /// Defaults to `<project-root>/spigot-runner.json`
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Server version to build, e.g. 1.20.4
    #[arg(long, global = true)]
    pub version: Option<String>,

    #[arg(long, global = true, value_name = "MAJOR")]
    pub java_version: Option<u32>,

    /// Clear the work directory before staging
    #[arg(long, global = true)]
    pub cleanup: bool,

    /// Save server data after a clean exit
    #[arg(long, global = true)]
    pub persist_snapshot: bool,

    /// Extra server argument, repeatable
    #[arg(long = "arg", global = true, allow_hyphen_values = true, value_name = "ARG")]
    pub args: Vec<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ProvisioningConfig) {
        if let Some(version) = &self.version {
            config.version = Some(version.clone());
        }
        if let Some(major) = self.java_version {
            config.java_version = Some(major);
        }
        config.cleanup |= self.cleanup;
        config.persist_snapshot |= self.persist_snapshot;
        config.args.extend(self.args.iter().cloned());
    }
}

/// Load `spigot-runner.json` and layer the CLI flags on top.
pub async fn load_config(overrides: &Overrides) -> Result<ProvisioningConfig, StageFailure> {
    let mut config = ProvisioningConfig::load(&overrides.project_root, overrides.config.as_deref())
        .await
        .stage(Stage::Configure)?;
    overrides.apply(&mut config);
    Ok(config)
}

/// Run one command; the returned code is what the process should exit with.
pub async fn execute(cli: Cli) -> Result<i32, StageFailure> {
    let config = load_config(&cli.overrides).await?;

    let cancel = CancellationToken::new();
    let pipeline = Pipeline::configure(config)?.with_cancellation(cancel.clone());
    cancel_on_shutdown_signal(cancel);

    match cli.command.unwrap_or(CommandKind::Run) {
        CommandKind::Run => match pipeline.run().await? {
            RunOutcome::Disabled => Ok(0),
            RunOutcome::Completed(report) => {
                info!("Server finished: {:?}", report.state);
                Ok(report.exit_code())
            }
        },
        CommandKind::Prepare => {
            if let Some(jar) = pipeline.prepare().await? {
                info!("Server jar ready at {:?}", jar);
            }
            Ok(0)
        }
        CommandKind::Stage => {
            let staged = pipeline.stage_plugins().await?;
            info!("Staged {} plugin jars", staged.len());
            Ok(0)
        }
        CommandKind::CleanServer => {
            let removed = pipeline.clean_server().await?;
            info!("Removed {} entries from {:?}", removed, pipeline.layout().work_dir());
            Ok(0)
        }
        CommandKind::CleanBuild => {
            let removed = pipeline.clean_build().await?;
            info!(
                "Removed {} entries from {:?}",
                removed,
                pipeline.layout().build_tool_dir()
            );
            Ok(0)
        }
        CommandKind::Snapshot => {
            let saved = pipeline.persist_snapshot().await?;
            info!("Saved {} files to {:?}", saved, pipeline.layout().snapshot_dir());
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["spigot-runner"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.overrides.project_root, PathBuf::from("."));
    }

    #[test]
    fn flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "spigot-runner",
            "run",
            "--version",
            "1.16.5",
            "--arg",
            "-Xmx1G",
            "--arg",
            "--port=25566",
            "--cleanup",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(CommandKind::Run));
        assert_eq!(cli.overrides.version.as_deref(), Some("1.16.5"));
        assert_eq!(cli.overrides.args, vec!["-Xmx1G", "--port=25566"]);
        assert!(cli.overrides.cleanup);
    }

    #[test]
    fn kebab_case_subcommands() {
        let cli = Cli::try_parse_from(["spigot-runner", "clean-server"]).unwrap();
        assert_eq!(cli.command, Some(CommandKind::CleanServer));
    }

    #[test]
    fn overrides_layer_on_top_of_file_values() {
        let mut config = ProvisioningConfig {
            version: Some("1.8.8".into()),
            args: vec!["--port=1".into()],
            persist_snapshot: true,
            ..ProvisioningConfig::default()
        };
        let overrides = Overrides {
            version: Some("1.20.4".into()),
            java_version: Some(21),
            args: vec!["-Xmx2G".into()],
            ..Overrides::default()
        };

        overrides.apply(&mut config);

        assert_eq!(config.version.as_deref(), Some("1.20.4"));
        assert_eq!(config.java_version, Some(21));
        assert_eq!(config.args, vec!["--port=1", "-Xmx2G"]);
        assert!(config.persist_snapshot);
        assert!(!config.cleanup);
    }

    #[tokio::test]
    async fn disabled_project_runs_as_a_no_op() {
        let temp = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            OsString::from("spigot-runner"),
            OsString::from("--project-root"),
            temp.path().as_os_str().to_owned(),
        ])
        .unwrap();

        assert_eq!(execute(cli).await.unwrap(), 0);
        assert!(!temp.path().join("spigotServer").exists());
    }
}
