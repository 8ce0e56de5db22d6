// ─── Process Runner ───
// Runs short-lived helper processes (BuildTools) and streams their output to the log.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

use crate::core::error::{ProvisionError, ProvisionResult};

/// Lines of output kept for error reports.
pub const OUTPUT_TAIL_LINES: usize = 40;

/// A fully specified subprocess call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Exit code (if any) and the last lines the process printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub tail: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn tail_text(&self) -> String {
        self.tail.join("\n")
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. Fails with `LaunchFailed` only when the process
    /// could not be spawned; a non-zero exit is reported in the output.
    async fn run(&self, invocation: &Invocation) -> ProvisionResult<ProcessOutput>;
}

/// Runs processes with `tokio::process`, logging every line.
#[derive(Debug, Default, Clone)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, invocation: &Invocation) -> ProvisionResult<ProcessOutput> {
        info!(
            "Running {}: {:?} {}",
            invocation.label,
            invocation.program,
            invocation.args.join(" ")
        );

        let mut child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProvisionError::LaunchFailed {
                program: invocation.program.clone(),
                source,
            })?;

        let mut tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        let mut push = |line: String| {
            if tail.len() == OUTPUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        };

        let mut stdout = child.stdout.take().map(OutputLines::new);
        let mut stderr = child.stderr.take().map(OutputLines::new);

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                line = next_line(&mut stdout), if stdout.is_some() => match line {
                    Some(line) => {
                        info!("[{}] {}", invocation.label, line);
                        push(line);
                    }
                    None => stdout = None,
                },
                line = next_line(&mut stderr), if stderr.is_some() => match line {
                    Some(line) => {
                        warn!("[{}] {}", invocation.label, line);
                        push(line);
                    }
                    None => stderr = None,
                },
            }
        }

        let status = child.wait().await.map_err(|source| ProvisionError::LaunchFailed {
            program: invocation.program.clone(),
            source,
        })?;
        debug!("{} exited with {:?}", invocation.label, status.code());

        Ok(ProcessOutput {
            code: status.code(),
            tail: tail.into_iter().collect(),
        })
    }
}

/// Line reader that tolerates output in any encoding. Invalid UTF-8 is
/// replaced instead of ending the stream.
struct OutputLines<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// `None` at end of stream or on a read error. Bytes of a partially
    /// read line survive cancellation in `pending`.
    async fn next_line(&mut self) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.pending).await {
            Ok(0) if self.pending.is_empty() => None,
            Ok(_) => {
                let mut line = std::mem::take(&mut self.pending);
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                Some(String::from_utf8_lossy(&line).into_owned())
            }
            Err(e) => {
                debug!("Stopped reading process output: {}", e);
                None
            }
        }
    }
}

async fn next_line<R>(reader: &mut Option<OutputLines<R>>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(lines) => lines.next_line().await,
        None => None,
    }
}
