// Process launcher implementation
// reason: tokio::process for async child management, nix for POSIX signals
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use ffgate_core::application::constants::DIAGNOSTIC_TAIL_CHARS;
use ffgate_core::domain::JobId;
use ffgate_core::port::{
    ExecutionError, ExitReport, Invocation, RunningTranscode, TerminationSignal,
    TranscodeLauncher,
};

use crate::stderr_tail::{drain_into, TailBuffer};

/// How long to keep reading stderr after the process has exited.
/// A grandchild that inherited the pipe can hold it open indefinitely.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Executor program plus the arguments placed before the job's own
///
/// `nice -n 10 ffmpeg` is program `nice` with leading args `-n 10 ffmpeg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorCommand {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl ExecutorCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Run `program` under a whitespace-separated wrapper command.
    /// An empty wrapper leaves `program` unwrapped.
    pub fn wrapped(wrapper: &str, program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let mut parts = wrapper.split_whitespace();
        match parts.next() {
            None => Self::new(program),
            Some(head) => {
                let mut leading: Vec<String> = parts.map(str::to_string).collect();
                leading.push(program.to_string_lossy().into_owned());
                Self::new(head).with_leading_args(leading)
            }
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn leading_args(&self) -> &[String] {
        &self.leading_args
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args);
        command
    }
}

/// Process launcher
/// Spawns the executor with stdin/stdout closed and stderr captured into a
/// bounded tail buffer.
pub struct ProcessLauncher {
    command: ExecutorCommand,
    diagnostic_tail_chars: usize,
}

impl ProcessLauncher {
    /// Create a new process launcher
    ///
    /// # Arguments
    /// * `command` - Executor program and leading arguments
    ///
    /// # Example
    /// ```ignore
    /// let launcher = ProcessLauncher::new(ExecutorCommand::wrapped("nice -n 10", "ffmpeg"));
    /// ```
    pub fn new(command: ExecutorCommand) -> Self {
        Self {
            command,
            diagnostic_tail_chars: DIAGNOSTIC_TAIL_CHARS,
        }
    }

    pub fn with_diagnostic_tail_chars(mut self, chars: usize) -> Self {
        self.diagnostic_tail_chars = chars;
        self
    }

    pub fn command(&self) -> &ExecutorCommand {
        &self.command
    }
}

impl TranscodeLauncher for ProcessLauncher {
    fn launch(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn RunningTranscode>, ExecutionError> {
        let mut command = self.command.command();
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            ExecutionError::SpawnFailed(format!("{}: {}", self.command.program.display(), e))
        })?;

        let tail = Arc::new(Mutex::new(TailBuffer::new(self.diagnostic_tail_chars)));
        let reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_into(stderr, Arc::clone(&tail))));

        debug!(
            job_id = %invocation.job_id,
            pid = ?child.id(),
            program = %self.command.program.display(),
            args = ?invocation.args,
            "Executor spawned"
        );

        Ok(Box::new(ChildTranscode {
            job_id: invocation.job_id.clone(),
            child,
            tail,
            reader,
            status: None,
        }))
    }
}

/// One spawned executor
struct ChildTranscode {
    job_id: JobId,
    child: Child,
    tail: Arc<Mutex<TailBuffer>>,
    reader: Option<JoinHandle<()>>,
    /// Cached once reaped so repeated `wait` calls are cheap
    status: Option<ExitStatus>,
}

impl ChildTranscode {
    fn report(&self, status: ExitStatus) -> ExitReport {
        let diagnostics = self
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render();
        ExitReport {
            exit_code: status.code(),
            diagnostics,
        }
    }
}

#[async_trait]
impl RunningTranscode for ChildTranscode {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait_exit(&mut self) -> Result<(), ExecutionError> {
        if self.status.is_none() {
            // Child::wait is cancel safe
            let status = self
                .child
                .wait()
                .await
                .map_err(|e| ExecutionError::Wait(e.to_string()))?;
            self.status = Some(status);
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<ExitReport, ExecutionError> {
        self.wait_exit().await?;
        let Some(status) = self.status else {
            return Err(ExecutionError::Wait("exit status missing after reap".to_string()));
        };

        if let Some(reader) = self.reader.as_mut() {
            if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut *reader)
                .await
                .is_err()
            {
                debug!(job_id = %self.job_id, "stderr still open after exit, abandoning capture");
                reader.abort();
            }
            self.reader = None;
        }

        Ok(self.report(status))
    }

    fn signal(&mut self, signal: TerminationSignal) -> Result<(), ExecutionError> {
        if self.status.is_some() {
            return Ok(());
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.status = Some(status);
            return Ok(());
        }
        let Some(pid) = self.child.id() else {
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let unix_signal = match signal {
                TerminationSignal::Graceful => Signal::SIGTERM,
                TerminationSignal::Forceful => Signal::SIGKILL,
            };
            info!(job_id = %self.job_id, pid = pid, signal = %unix_signal, "Signalling executor");

            match kill(Pid::from_raw(pid as i32), unix_signal) {
                // Exited between try_wait and kill
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(ExecutionError::Signal(format!("{} failed: {}", unix_signal, e))),
            }
        }

        #[cfg(not(unix))]
        {
            // No graceful stop without POSIX signals; both stages kill
            info!(job_id = %self.job_id, pid = pid, signal = ?signal, "Killing executor");
            self.child
                .start_kill()
                .map_err(|e| ExecutionError::Signal(e.to_string()))
        }
    }
}
