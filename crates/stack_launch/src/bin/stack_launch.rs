//! Stack Launch CLI
//!
//! Usage:
//!   stack_launch
//!   stack_launch --wait-for-port 5000
//!   stack_launch --root ../my-app --prefix-output

use stack_launch::{LaunchArgs, Launcher, LauncherError, RunOutcome};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_level());
    env_logger::init_from_env(env);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, initiating shutdown...");
        let _ = shutdown_tx.send(());
    }) {
        log::error!("Error setting Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    // The launcher is dropped before exiting so every handle gets to clean up
    if let Err(e) = run(&args, shutdown_rx).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: &LaunchArgs, shutdown_rx: watch::Receiver<()>) -> Result<(), LauncherError> {
    let mut launcher = Launcher::new(args.to_config());

    launcher.launch_all(shutdown_rx.clone()).await?;

    match launcher.run(shutdown_rx).await? {
        RunOutcome::Completed(records) => {
            for record in records {
                log::info!("[{}] Final exit code: {:?}", record.name, record.code);
            }
        }
        RunOutcome::Interrupted => log::info!("Stack launcher exiting"),
    }

    Ok(())
}
