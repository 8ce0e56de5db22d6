// ─── Server Launcher ───
// Spawns the Spigot server in the work directory and waits for it to stop.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classpath::safe_path_str;
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::version::ServerVersion;

/// Suppresses the server's Swing console. Understood from 1.15 on.
pub const NOGUI_FLAG: &str = "--nogui";

/// How long a cancelled server gets to stop on its own before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// User arguments, then `--nogui` when the version understands it.
pub fn build_server_args(user_args: &[String], version: &ServerVersion) -> Vec<String> {
    let mut args = user_args.to_vec();
    if version.is_at_least(1, 15) {
        args.push(NOGUI_FLAG.to_string());
    }
    args
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    NotStarted,
    Running,
    /// The server stopped by itself; `None` when it was ended by a signal.
    Exited(Option<i32>),
    /// Cancelled by the operator; the child was terminated.
    Killed,
}

impl LaunchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LaunchState::Exited(_) | LaunchState::Killed)
    }
}

/// Everything needed to start the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub java: PathBuf,
    pub jvm_args: Vec<String>,
    pub classpath_property: String,
    pub classpath: String,
    pub server_jar: PathBuf,
    /// Server arguments, `--nogui` included.
    pub server_args: Vec<String>,
    pub work_dir: PathBuf,
}

impl LaunchSpec {
    /// `<jvm args> -D<property>=<classpath> -jar <server jar> <server args>`
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.jvm_args.clone();
        args.push(format!("-D{}={}", self.classpath_property, self.classpath));
        args.push("-jar".to_string());
        args.push(safe_path_str(&self.server_jar));
        args.extend(self.server_args.iter().cloned());
        args
    }
}

#[derive(Debug)]
pub struct ServerLauncher {
    state: LaunchState,
    shutdown_grace: Duration,
}

impl Default for ServerLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLauncher {
    pub fn new() -> Self {
        Self {
            state: LaunchState::NotStarted,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    /// Start the server and wait until it exits or `cancel` fires.
    ///
    /// Stdio is inherited so the operator can type console commands. A
    /// non-zero exit is a normal terminal state, not an error.
    pub async fn launch(
        &mut self,
        spec: &LaunchSpec,
        cancel: &CancellationToken,
    ) -> ProvisionResult<LaunchState> {
        if self.state != LaunchState::NotStarted {
            return Err(ProvisionError::Config(format!(
                "server launcher already used (state {:?})",
                self.state
            )));
        }

        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }

        let args = spec.command_args();
        info!("Launching server with Java: {:?}", spec.java);
        debug!("Command (copy/paste): {}", format_command_for_logs(&spec.java, &args));

        let mut child = tokio::process::Command::new(&spec.java)
            .args(&args)
            .current_dir(&spec.work_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProvisionError::LaunchFailed {
                program: spec.java.clone(),
                source,
            })?;
        self.state = LaunchState::Running;
        debug!("Server running (pid {:?})", child.id());

        let wait_error = |source: std::io::Error| ProvisionError::LaunchFailed {
            program: spec.java.clone(),
            source,
        };

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(wait_error)?;
                info!("Server exited with {:?}", status.code());
                self.state = LaunchState::Exited(status.code());
            }
            _ = cancel.cancelled() => {
                // Ask the server to stop so it saves worlds, then kill it
                // if it is still running after the grace period.
                request_shutdown(&child);
                match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                    Ok(status) => {
                        let status = status.map_err(wait_error)?;
                        info!("Server stopped after cancel with {:?}", status.code());
                    }
                    Err(_) => {
                        warn!("Server did not stop within {:?}, killing it", self.shutdown_grace);
                        child.kill().await.map_err(wait_error)?;
                    }
                }
                self.state = LaunchState::Killed;
            }
        }

        Ok(self.state)
    }
}

/// Send SIGTERM to the server. Windows has no equivalent; the child is
/// killed once the grace period ends.
fn request_shutdown(child: &tokio::process::Child) {
    #[cfg(unix)]
    {
        let Some(pid) = child.id() else {
            return;
        };
        debug!("Sending SIGTERM to server (pid {})", pid);
        // SAFETY: `pid` belongs to a child we have not reaped yet, so it
        // cannot have been reused by another process.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            debug!(
                "SIGTERM to pid {} failed: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    let _ = child;
}

fn format_command_for_logs(program: &std::path::Path, args: &[String]) -> String {
    std::iter::once(shell_escape(&program.to_string_lossy()))
        .chain(args.iter().map(|arg| shell_escape(arg)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nogui_only_from_1_15() {
        let user = strings(&["-Xmx1G"]);
        let old = ServerVersion::parse("1.14").unwrap();
        let new = ServerVersion::parse("1.16").unwrap();
        let threshold = ServerVersion::parse("1.15").unwrap();

        assert_eq!(build_server_args(&user, &old), strings(&["-Xmx1G"]));
        assert_eq!(build_server_args(&user, &new), strings(&["-Xmx1G", "--nogui"]));
        assert_eq!(build_server_args(&[], &threshold), strings(&["--nogui"]));
    }

    #[test]
    fn command_puts_jvm_args_before_jar_and_server_args_after() {
        let spec = LaunchSpec {
            java: PathBuf::from("java"),
            jvm_args: strings(&["-Xms1G"]),
            classpath_property: "dev.classpath".into(),
            classpath: "/a.jar:/b.jar".into(),
            server_jar: PathBuf::from("/cache/spigot-1.16.5.jar"),
            server_args: strings(&["--port", "25566", "--nogui"]),
            work_dir: PathBuf::from("/work"),
        };
        assert_eq!(
            spec.command_args(),
            strings(&[
                "-Xms1G",
                "-Ddev.classpath=/a.jar:/b.jar",
                "-jar",
                "/cache/spigot-1.16.5.jar",
                "--port",
                "25566",
                "--nogui",
            ])
        );
    }

    #[test]
    fn log_command_quotes_spaces() {
        let text = format_command_for_logs(
            std::path::Path::new("/usr/bin/java"),
            &strings(&["-Dx=a b", "-jar"]),
        );
        assert_eq!(text, "/usr/bin/java \"-Dx=a b\" -jar");
    }

    #[cfg(unix)]
    fn script_spec(dir: &std::path::Path, body: &str) -> LaunchSpec {
        let script = dir.join("fake-java.sh");
        std::fs::write(&script, body).unwrap();
        // Run through `sh` so the script never has to be executable.
        LaunchSpec {
            java: PathBuf::from("/bin/sh"),
            jvm_args: vec![script.to_string_lossy().to_string()],
            classpath_property: "dev.classpath".into(),
            classpath: "/a.jar".into(),
            server_jar: dir.join("spigot.jar"),
            server_args: strings(&["--nogui"]),
            work_dir: dir.to_path_buf(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_surfaced_unmodified() {
        let temp = tempfile::tempdir().unwrap();
        let spec = script_spec(temp.path(), "printf '%s\\n' \"$@\" > args.txt\nexit 3\n");

        let mut launcher = ServerLauncher::new();
        assert_eq!(launcher.state(), LaunchState::NotStarted);
        let state = launcher
            .launch(&spec, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(state, LaunchState::Exited(Some(3)));
        assert!(launcher.state().is_terminal());
        let recorded = std::fs::read_to_string(temp.path().join("args.txt")).unwrap();
        let recorded: Vec<&str> = recorded.lines().collect();
        assert_eq!(
            recorded,
            vec![
                "-Ddev.classpath=/a.jar",
                "-jar",
                &*temp.path().join("spigot.jar").to_string_lossy(),
                "--nogui",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_kills_the_server() {
        let temp = tempfile::tempdir().unwrap();
        let spec = script_spec(temp.path(), "exec sleep 30\n");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let mut launcher = ServerLauncher::new().with_shutdown_grace(Duration::ZERO);
        let state = launcher.launch(&spec, &cancel).await.unwrap();

        assert_eq!(state, LaunchState::Killed);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_forwards_sigterm_before_killing() {
        let temp = tempfile::tempdir().unwrap();
        let spec = script_spec(
            temp.path(),
            "trap 'echo saved > term.txt; exit 0' TERM INT\n\
             while true; do sleep 1 & wait $!; done\n",
        );
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let mut launcher = ServerLauncher::new().with_shutdown_grace(Duration::from_secs(5));
        let state = launcher.launch(&spec, &cancel).await.unwrap();

        assert_eq!(state, LaunchState::Killed);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("term.txt")).unwrap(),
            "saved\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn already_cancelled_launch_does_not_start_the_server() {
        let temp = tempfile::tempdir().unwrap();
        let spec = script_spec(temp.path(), "echo up > started.txt\nexit 0\n");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut launcher = ServerLauncher::new();
        let err = launcher.launch(&spec, &cancel).await.unwrap_err();

        assert!(matches!(err, ProvisionError::Cancelled));
        assert_eq!(launcher.state(), LaunchState::NotStarted);
        assert!(!temp.path().join("started.txt").exists());
    }

    #[tokio::test]
    async fn missing_java_is_launch_failure() {
        let temp = tempfile::tempdir().unwrap();
        let spec = LaunchSpec {
            java: temp.path().join("no-such-java"),
            jvm_args: Vec::new(),
            classpath_property: "dev.classpath".into(),
            classpath: String::new(),
            server_jar: temp.path().join("spigot.jar"),
            server_args: Vec::new(),
            work_dir: temp.path().to_path_buf(),
        };
        let mut launcher = ServerLauncher::new();
        let err = launcher
            .launch(&spec, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::LaunchFailed { .. }));
        assert_eq!(launcher.state(), LaunchState::NotStarted);
    }
}
