//! Launcher - starts the stack in order, waits on it and shuts it down

use crate::config::{ExitPolicy, LauncherConfig, WaitMode};
use crate::runtime::process::{ExitRecord, LaunchError, ProcessHandle};
use crate::runtime::readiness::wait_ready;
use std::time::Duration;
use tokio::sync::watch;

/// Default interval between two exit checks in concurrent wait mode
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every child exited on its own; exit records in launch order
    Completed(Vec<ExitRecord>),
    /// Shutdown was requested and termination requests were sent
    Interrupted,
}

/// Owns every launched child for the lifetime of a run
#[derive(Debug)]
pub struct Launcher {
    config: LauncherConfig,
    handles: Vec<ProcessHandle>,
    poll_interval: Duration,
}

impl Launcher {
    /// Create a launcher; nothing is started yet
    pub fn new(config: LauncherConfig) -> Self {
        Self {
            config,
            handles: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the exit check interval used in concurrent wait mode
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Launcher configuration
    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Handles of the children started so far, in launch order
    pub fn handles(&self) -> &[ProcessHandle] {
        &self.handles
    }

    /// Launch every service in order, running the readiness gate between
    /// consecutive launches.
    ///
    /// A shutdown request before or during a gate aborts the remaining
    /// launches without error. If a launch fails, the services already
    /// started are asked to terminate before the error is returned.
    pub async fn launch_all(
        &mut self,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<(), LauncherError> {
        log::info!("Launching {} services...", self.config.services.len());

        for (i, spec) in self.config.services.iter().enumerate() {
            if shutdown_rx.has_changed().unwrap_or(false) {
                log::info!("Shutdown requested, aborting launch");
                return Ok(());
            }

            if i > 0 {
                tokio::select! {
                    _ = wait_ready(&self.config.readiness) => {}
                    Ok(()) = shutdown_rx.changed() => {
                        log::info!("Shutdown requested, aborting launch");
                        return Ok(());
                    }
                }
            }

            match ProcessHandle::launch(spec, &self.config.root, self.config.output) {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    if !self.handles.is_empty() {
                        log::warn!(
                            "Launch of '{}' failed, stopping {} already started service(s)",
                            spec.name,
                            self.handles.len()
                        );
                    }
                    for handle in self.handles.iter_mut() {
                        handle.terminate();
                    }
                    return Err(e.into());
                }
            }
        }

        log::info!("All services launched");
        Ok(())
    }

    /// Block until every launched child has exited.
    ///
    /// Returns the exit records in launch order. Exit codes are reported,
    /// never interpreted.
    pub async fn wait_all(&mut self) -> Result<Vec<ExitRecord>, LauncherError> {
        match self.config.wait_mode {
            WaitMode::Sequential => self.wait_sequential().await,
            WaitMode::Concurrent => self.wait_concurrent().await,
        }
    }

    async fn wait_sequential(&mut self) -> Result<Vec<ExitRecord>, LauncherError> {
        let mut records = Vec::with_capacity(self.handles.len());

        for i in 0..self.handles.len() {
            let handle = &mut self.handles[i];
            let name = handle.name().to_string();
            let record = handle
                .wait()
                .await
                .map_err(|e| LauncherError::Wait { name, source: e })?;

            if self.any_running_after(i) {
                self.on_early_exit(&record);
            }
            records.push(record);
        }

        Ok(records)
    }

    /// Whether a child launched after position `index` is still running
    fn any_running_after(&mut self, index: usize) -> bool {
        self.handles
            .iter_mut()
            .skip(index + 1)
            .any(|handle| matches!(handle.try_exit(), Ok(None)))
    }

    async fn wait_concurrent(&mut self) -> Result<Vec<ExitRecord>, LauncherError> {
        let mut records: Vec<Option<ExitRecord>> = vec![None; self.handles.len()];

        loop {
            let mut exited = Vec::new();
            for (handle, slot) in self.handles.iter_mut().zip(records.iter_mut()) {
                if slot.is_some() {
                    continue;
                }
                let exit = match handle.try_exit() {
                    Ok(exit) => exit,
                    Err(e) => {
                        return Err(LauncherError::Wait {
                            name: handle.name().to_string(),
                            source: e,
                        })
                    }
                };
                if let Some(record) = exit {
                    exited.push(record.clone());
                    *slot = Some(record);
                }
            }

            if records.iter().all(Option::is_some) {
                break;
            }
            for record in &exited {
                self.on_early_exit(record);
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        for handle in self.handles.iter_mut() {
            handle.drain_output().await;
        }

        Ok(records.into_iter().flatten().collect())
    }

    /// React to a child exiting while others may still be running
    fn on_early_exit(&mut self, record: &ExitRecord) {
        match self.config.exit_policy {
            ExitPolicy::WaitAll => {
                log::warn!(
                    "[{}] Exited (code {:?}) before the rest of the stack",
                    record.name,
                    record.code
                );
            }
            ExitPolicy::StopAll => {
                let sent = self
                    .handles
                    .iter_mut()
                    .filter(|handle| !handle.terminate_requested())
                    .map(|handle| handle.terminate())
                    .filter(|sent| *sent)
                    .count();
                if sent > 0 {
                    log::warn!(
                        "[{}] Exited (code {:?}), stopped {} remaining service(s)",
                        record.name,
                        record.code,
                        sent
                    );
                }
            }
        }
    }

    /// Send a termination request to every child not yet seen to exit.
    ///
    /// Does not wait for the children to go away. Returns the number of
    /// requests sent.
    pub fn terminate_all(&mut self) -> usize {
        self.handles
            .iter_mut()
            .map(|handle| handle.terminate())
            .filter(|sent| *sent)
            .count()
    }

    /// Wait for the stack to exit, or terminate it on a shutdown request
    pub async fn run(
        &mut self,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<RunOutcome, LauncherError> {
        // A pending shutdown request wins over children that already exited
        let waited = tokio::select! {
            biased;
            Ok(()) = shutdown_rx.changed() => None,
            result = self.wait_all() => Some(result),
        };

        match waited {
            Some(result) => {
                let records = result?;
                log::info!("All services have exited");
                Ok(RunOutcome::Completed(records))
            }
            None => {
                log::info!("Shutting down...");
                let sent = self.terminate_all();
                log::info!("Sent {} termination request(s)", sent);
                Ok(RunOutcome::Interrupted)
            }
        }
    }
}

/// Errors that can occur in the launcher
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Error waiting for '{name}': {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
