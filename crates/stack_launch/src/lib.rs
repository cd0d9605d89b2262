//! Stack Launch
//!
//! Starts a local development stack: a backend service and a frontend dev
//! server, each from its own subdirectory.
//!
//! # Overview
//!
//! The launcher:
//! - starts the backend (`npm run start` in `backend/`)
//! - waits a fixed 2 seconds, or optionally until a port accepts connections
//! - starts the frontend (`npm run dev` in `frontend/`)
//! - waits for both to exit, or sends both a termination request on Ctrl+C
//!
//! Every child is owned by a [`ProcessHandle`]; dropping the handle of a
//! child still running sends it a termination request.
//!
//! # Example
//!
//! ```no_run
//! use stack_launch::{Launcher, LauncherConfig, RunOutcome};
//! use tokio::sync::watch;
//!
//! # async fn demo() -> Result<(), stack_launch::LauncherError> {
//! let (_shutdown_tx, shutdown_rx) = watch::channel(());
//! let mut launcher = Launcher::new(LauncherConfig::default());
//!
//! launcher.launch_all(shutdown_rx.clone()).await?;
//! if let RunOutcome::Completed(records) = launcher.run(shutdown_rx).await? {
//!     for record in records {
//!         println!("{} exited with {:?}", record.name, record.code);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{ExitPolicy, LauncherConfig, OutputMode, Readiness, ServiceSpec, WaitMode};
pub use runtime::{
    wait_ready, ExitRecord, LaunchError, Launcher, LauncherError, ProcessHandle, RunOutcome,
};
