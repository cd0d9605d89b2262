//! Owned handle to a launched child process

use crate::config::{OutputMode, ServiceSpec};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Upper bound for draining piped output once a child has exited. A
/// grandchild holding the pipe open must not block the launcher.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Exit observed for one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    /// Service name
    pub name: String,
    /// Exit code, `None` when the child was ended by a signal
    pub code: Option<i32>,
    /// Whether the child reported success
    pub success: bool,
}

impl ExitRecord {
    fn new(name: &str, status: ExitStatus) -> Self {
        Self {
            name: name.to_string(),
            code: status.code(),
            success: status.success(),
        }
    }
}

/// A launched child process.
///
/// The handle owns the child exclusively. Dropping a handle whose child has
/// not been seen to exit sends it a termination request, so an early return
/// anywhere in the launcher never leaves a service running unattended.
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    pid: Option<u32>,
    started_at: Instant,
    exit: Option<ExitStatus>,
    terminate_requested: bool,
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Start `spec` with its working directory resolved against `root`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(
        spec: &ServiceSpec,
        root: &Path,
        output: OutputMode,
    ) -> Result<Self, LaunchError> {
        let dir = spec.resolve_dir(root);
        if !dir.is_dir() {
            log::error!("[{}] Working directory not found: {}", spec.name, dir.display());
            return Err(LaunchError::MissingWorkingDir {
                name: spec.name.clone(),
                path: dir.display().to_string(),
            });
        }

        log::info!(
            "[{}] Starting: {} (in {})",
            spec.name,
            spec.command_line(),
            dir.display()
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).current_dir(&dir).stdin(Stdio::inherit());

        match output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Prefixed => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            log::error!("[{}] Failed to spawn process: {}", spec.name, e);
            LaunchError::SpawnFailed {
                name: spec.name.clone(),
                program: spec.program.clone(),
                source: e,
            }
        })?;

        let started_at = Instant::now();
        let pid = child.id();
        log::info!("[{}] Process started with PID: {}", spec.name, pid.unwrap_or(0));

        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(spec.name.clone(), stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(spec.name.clone(), stderr, true));
        }

        Ok(Self {
            name: spec.name.clone(),
            pid,
            started_at,
            exit: None,
            terminate_requested: false,
            child,
            forwarders,
        })
    }

    /// Service name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id assigned at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Instant the process was spawned
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time since the process was spawned
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether a termination request has been sent
    pub fn terminate_requested(&self) -> bool {
        self.terminate_requested
    }

    /// Exit record, if the process has been seen to exit
    pub fn exit_record(&self) -> Option<ExitRecord> {
        self.exit.map(|status| ExitRecord::new(&self.name, status))
    }

    /// Block until the process exits. No timeout.
    pub async fn wait(&mut self) -> std::io::Result<ExitRecord> {
        if let Some(status) = self.exit {
            return Ok(ExitRecord::new(&self.name, status));
        }

        let status = self.child.wait().await?;
        let record = self.record_exit(status);
        self.drain_output().await;
        Ok(record)
    }

    /// Wait for forwarded output to be fully logged (prefixed mode only)
    pub async fn drain_output(&mut self) {
        for forwarder in self.forwarders.drain(..) {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, forwarder)
                .await
                .is_err()
            {
                log::debug!("[{}] Output still open after exit, not waiting", self.name);
            }
        }
    }

    /// Check for an exit without blocking
    pub fn try_exit(&mut self) -> std::io::Result<Option<ExitRecord>> {
        if let Some(status) = self.exit {
            return Ok(Some(ExitRecord::new(&self.name, status)));
        }

        Ok(self.child.try_wait()?.map(|status| self.record_exit(status)))
    }

    fn record_exit(&mut self, status: ExitStatus) -> ExitRecord {
        self.exit = Some(status);
        let record = ExitRecord::new(&self.name, status);
        log::info!(
            "[{}] Process exited with code: {:?} after {:.1}s",
            self.name,
            record.code,
            self.uptime().as_secs_f64()
        );
        record
    }

    /// Ask the process to terminate (SIGTERM on Unix).
    ///
    /// Best effort: no forced kill and no wait for the process to go away.
    /// Returns `true` if a request was sent.
    pub fn terminate(&mut self) -> bool {
        match self.try_exit() {
            Ok(Some(_)) => return false,
            Ok(None) => {}
            Err(e) => log::warn!("[{}] Error checking process status: {}", self.name, e),
        }

        log::info!("[{}] Requesting termination", self.name);
        self.terminate_requested = true;

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    log::warn!("[{}] Failed to send SIGTERM: {}", self.name, e);
                }
            }
        }

        #[cfg(not(unix))]
        {
            // No SIGTERM equivalent; TerminateProcess is the closest request
            if let Err(e) = self.child.start_kill() {
                log::warn!("[{}] Failed to terminate process: {}", self.name, e);
            }
        }

        true
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.exit.is_none() && !self.terminate_requested {
            log::debug!("[{}] Handle dropped while process may be running", self.name);
            self.terminate();
        }
    }
}

/// Re-emit each line of a child stream as a log record
fn forward_lines<R>(name: String, stream: R, is_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                log::warn!("[{}] {}", name, line);
            } else {
                log::info!("[{}] {}", name, line);
            }
        }
    })
}

/// Errors that can occur when launching a service
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Working directory for '{name}' does not exist: {path}")]
    MissingWorkingDir { name: String, path: String },

    #[error("Failed to spawn '{program}' for '{name}': {source}")]
    SpawnFailed {
        name: String,
        program: String,
        #[source]
        source: std::io::Error,
    },
}
