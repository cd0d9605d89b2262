//! Command-line interface for stack_launch

use crate::config::{ExitPolicy, LauncherConfig, OutputMode, Readiness, WaitMode};
use argh::FromArgs;
use std::path::PathBuf;
use std::time::Duration;

/// start the backend and frontend dev servers of a local stack
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// directory containing backend/ and frontend/ (default: current directory)
    #[argh(option)]
    pub root: Option<String>,

    /// delay in milliseconds between backend and frontend launch (default: 2000)
    #[argh(option)]
    pub delay_ms: Option<u64>,

    /// launch the frontend once this local port accepts connections instead of after a fixed delay
    #[argh(option)]
    pub wait_for_port: Option<u16>,

    /// give up waiting for --wait-for-port after this many milliseconds (default: 30000)
    #[argh(option)]
    pub readiness_timeout_ms: Option<u64>,

    /// how to wait for the services: sequential or concurrent (default: concurrent)
    #[argh(option, from_str_fn(parse_wait_mode))]
    pub wait: Option<WaitMode>,

    /// stop the remaining services as soon as one of them exits
    #[argh(switch)]
    pub stop_on_exit: bool,

    /// capture service output and log it line by line with a [name] prefix
    #[argh(switch)]
    pub prefix_output: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse wait mode name
fn parse_wait_mode(s: &str) -> Result<WaitMode, String> {
    s.parse()
}

impl LaunchArgs {
    /// Build the launcher configuration; unset flags keep the defaults
    pub fn to_config(&self) -> LauncherConfig {
        let mut config = LauncherConfig::default();

        if let Some(root) = &self.root {
            config.root = PathBuf::from(root);
        }

        if let Some(port) = self.wait_for_port {
            let mut readiness = Readiness::local_port(port);
            if let Some(ms) = self.readiness_timeout_ms {
                readiness = readiness.with_timeout(Duration::from_millis(ms));
            }
            config.readiness = readiness;
        } else if let Some(ms) = self.delay_ms {
            config.readiness = Readiness::Delay(Duration::from_millis(ms));
        }

        if let Some(mode) = self.wait {
            config.wait_mode = mode;
        }
        if self.stop_on_exit {
            config.exit_policy = ExitPolicy::StopAll;
        }
        if self.prefix_output {
            config.output = OutputMode::Prefixed;
        }

        config
    }

    /// Normalized log level, falling back to info
    pub fn log_level(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}
