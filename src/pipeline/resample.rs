//! Resample filter process
//!
//! Converts raw signed 16-bit mono PCM from the remote endpoint's rate to
//! the telephony leg's rate, writing into the call's streaming object.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

use crate::config::ResampleConfig;
use crate::telephony::CallId;
use crate::{Error, Result};

/// A running filter process
pub trait FilterProcess: Send {
    /// Queue audio for the process input without waiting
    ///
    /// # Errors
    ///
    /// Returns `Error::Pipeline` if the process input is gone
    fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Terminate the process forcefully
    ///
    /// # Errors
    ///
    /// Returns `Error::Pipeline` if the process was already terminated
    fn kill(&mut self) -> Result<()>;
}

/// Starts filter processes
pub trait FilterLauncher: Send + Sync {
    /// Start a filter writing to `output`
    ///
    /// # Errors
    ///
    /// Returns `Error::Pipeline` if the process cannot be started
    fn launch(&self, call: &CallId, output: &Path) -> Result<Box<dyn FilterProcess>>;
}

/// Launches `sox` with the configured rates
#[derive(Debug, Clone)]
pub struct SoxLauncher {
    config: ResampleConfig,
}

impl SoxLauncher {
    #[must_use]
    pub const fn new(config: ResampleConfig) -> Self {
        Self { config }
    }

    /// Program this launcher runs
    #[must_use]
    pub fn program(&self) -> &str {
        &self.config.program
    }

    /// Arguments reading stdin at the input rate and writing `output`
    #[must_use]
    pub fn args(&self, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(22);
        args.extend(raw_format(self.config.input_rate));
        args.push("-".into());
        args.extend(raw_format(self.config.output_rate));
        args.push(output.as_os_str().to_owned());
        args
    }
}

fn raw_format(rate: u32) -> [OsString; 10] {
    [
        "-t".into(),
        "raw".into(),
        "-r".into(),
        rate.to_string().into(),
        "-e".into(),
        "signed-integer".into(),
        "-b".into(),
        "16".into(),
        "-c".into(),
        "1".into(),
    ]
}

impl FilterLauncher for SoxLauncher {
    fn launch(&self, call: &CallId, output: &Path) -> Result<Box<dyn FilterProcess>> {
        let mut child = Command::new(&self.config.program)
            .args(self.args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Pipeline(format!("failed to start {}: {e}", self.config.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Pipeline("filter stdin unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let call = call.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        tracing::warn!(call_id = %call, "sox: {line}");
                    }
                }
            });
        }

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        tokio::spawn(stdin_writer(call.clone(), input_rx, stdin));

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(call.clone(), child, kill_rx));

        tracing::debug!(call_id = %call, output = %output.display(), "filter process started");

        Ok(Box::new(SoxProcess {
            input: input_tx,
            kill: Some(kill_tx),
        }))
    }
}

struct SoxProcess {
    input: mpsc::UnboundedSender<Bytes>,
    kill: Option<oneshot::Sender<()>>,
}

impl FilterProcess for SoxProcess {
    fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.input
            .send(chunk)
            .map_err(|_| Error::Pipeline("filter input closed".to_string()))
    }

    fn kill(&mut self) -> Result<()> {
        let kill = self
            .kill
            .take()
            .ok_or_else(|| Error::Pipeline("filter already terminated".to_string()))?;
        // The supervisor may already have reaped an exited process
        let _ = kill.send(());
        Ok(())
    }
}

/// Feed queued audio into the process input
async fn stdin_writer(call: CallId, mut rx: mpsc::UnboundedReceiver<Bytes>, mut stdin: ChildStdin) {
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = stdin.write_all(&chunk).await {
            tracing::debug!(call_id = %call, error = %e, "filter input closed");
            return;
        }
    }
}

/// Reap the process, killing it first if asked to
async fn supervise(call: CallId, mut child: Child, kill_rx: oneshot::Receiver<()>) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => tracing::debug!(call_id = %call, %status, "filter process exited"),
            Err(e) => tracing::warn!(call_id = %call, error = %e, "filter process wait failed"),
        },
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(call_id = %call, error = %e, "filter process already gone");
            }
            let _ = child.wait().await;
            tracing::debug!(call_id = %call, "filter process killed");
        }
    }
}
