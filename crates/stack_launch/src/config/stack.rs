//! Stack definition: which services to start and how to supervise them

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default pause between two consecutive launches
pub const DEFAULT_LAUNCH_DELAY: Duration = Duration::from_secs(2);

/// Default upper bound for port readiness polling
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between two port readiness probes
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// A single service of the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Service name (for logging)
    pub name: String,
    /// Program to execute
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Working directory, relative to the stack root unless absolute
    pub working_dir: PathBuf,
}

impl ServiceSpec {
    /// Create a service running `program` inside `working_dir`
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Append command line arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The backend service: `npm run start` inside `backend/`
    pub fn backend() -> Self {
        Self::new("backend", npm_program(), "backend").with_args(["run", "start"])
    }

    /// The frontend dev server: `npm run dev` inside `frontend/`
    pub fn frontend() -> Self {
        Self::new("frontend", npm_program(), "frontend").with_args(["run", "dev"])
    }

    /// Resolve the working directory against the stack root
    pub fn resolve_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.working_dir)
    }

    /// Human readable command line
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// npm ships as a batch shim on Windows
fn npm_program() -> &'static str {
    if cfg!(windows) {
        "npm.cmd"
    } else {
        "npm"
    }
}

/// Gate applied between two consecutive launches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Sleep unconditionally
    Delay(Duration),
    /// Poll a TCP port until it accepts connections or the timeout elapses
    Port {
        addr: SocketAddr,
        timeout: Duration,
        interval: Duration,
    },
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::Delay(DEFAULT_LAUNCH_DELAY)
    }
}

impl Readiness {
    /// Poll `127.0.0.1:<port>` with the default timeout and probe interval
    pub fn local_port(port: u16) -> Self {
        Readiness::Port {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            timeout: DEFAULT_READINESS_TIMEOUT,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    /// Replace the port polling timeout; a fixed delay is left untouched
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        if let Readiness::Port { timeout, .. } = &mut self {
            *timeout = limit;
        }
        self
    }
}

/// How the launcher waits for its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Wait on each child in launch order. A child that never exits blocks
    /// reaping of every child launched after it.
    Sequential,
    /// Watch all children together and report exits as they happen
    #[default]
    Concurrent,
}

impl std::str::FromStr for WaitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(WaitMode::Sequential),
            "concurrent" => Ok(WaitMode::Concurrent),
            other => Err(format!(
                "Invalid wait mode '{}'. Expected 'sequential' or 'concurrent'",
                other
            )),
        }
    }
}

/// What to do when one child exits while others are still running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Log the early exit and keep waiting for the rest
    #[default]
    WaitAll,
    /// Request termination of the remaining children
    StopAll,
}

/// Where child output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Children write directly to the launcher's stdout/stderr
    #[default]
    Inherit,
    /// Output is piped and re-emitted line by line as `[name] line` log records
    Prefixed,
}

/// Launcher configuration
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Directory the service working directories are resolved against
    pub root: PathBuf,
    /// Services in launch order
    pub services: Vec<ServiceSpec>,
    /// Gate between consecutive launches
    pub readiness: Readiness,
    /// Wait strategy
    pub wait_mode: WaitMode,
    /// Reaction to an early child exit
    pub exit_policy: ExitPolicy,
    /// Child output handling
    pub output: OutputMode,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            services: vec![ServiceSpec::backend(), ServiceSpec::frontend()],
            readiness: Readiness::default(),
            wait_mode: WaitMode::default(),
            exit_policy: ExitPolicy::default(),
            output: OutputMode::default(),
        }
    }
}
