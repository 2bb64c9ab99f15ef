use std::error::Error;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use afkbot::config::{ConfigError, Settings};
use afkbot::logging::init_logging;
use afkbot::status::{self, StatusLog};
use afkbot::supervisor::SessionSupervisor;
use afkbot::transport::line::LineConnector;

#[derive(Parser)]
#[command(version = env!("VERSION_STRING"), about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write an example config and exit
    #[arg(long)]
    init: bool,

    /// Also log to a file in the data directory
    #[arg(long)]
    log_file: bool,

    /// Enables debug mode (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
}

fn create_example_config(path: &Path) -> Result<(), Box<dyn Error>> {
    // Never overwrite an existing config file
    if path.exists() {
        return Err(format!(
            "Config file already exists at {}. Edit it or delete it to create a new one.",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Settings::example())?;

    info!("Created example config at {}", path.display());
    eprintln!("Config file created at: {}", path.display());
    eprintln!("Edit it with your server and account details, then run afkbot again.");
    Ok(())
}

/// Flip `shutdown_tx` once `signal` fires. If the signal handler cannot be
/// installed the sender is held forever and the shutdown flag never flips.
async fn forward_ctrl_c<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown_tx.send(true);
        }
        Err(e) => {
            error!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
            drop(shutdown_tx);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file, cli.debug)?;

    info!("Starting afkbot {}", env!("VERSION_STRING"));

    let config_path = match cli.config {
        Some(path) => path,
        None => Settings::config_path()?,
    };

    if cli.init {
        return create_example_config(&config_path);
    }

    let settings = match Settings::load_from(&config_path) {
        Ok(settings) => settings,
        Err(ConfigError::NotFound(_)) => {
            info!("No config found, creating example config");
            return create_example_config(&config_path);
        }
        Err(err) => return Err(format!("Failed to load config: {}", err).into()),
    };
    settings.validate()?;
    let settings = Arc::new(settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_ctrl_c(tokio::signal::ctrl_c(), shutdown_tx));

    let log = StatusLog::new(settings.status.max_lines);
    let connector = LineConnector::new(settings.transport.connect_timeout());
    let supervisor =
        SessionSupervisor::new(settings.clone(), Box::new(connector), Arc::new(log.clone()));

    let status_task = if settings.status.enabled {
        let addr = settings.status.bind_addr()?;
        let state = supervisor.subscribe_state();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = status::serve(addr, log, state, shutdown).await {
                error!(target: "status", "Status page stopped: {}", e);
            }
        }))
    } else {
        None
    };

    supervisor.run(shutdown_rx.clone()).await;

    // The supervisor can stop on its own; stay up (and keep serving the
    // status page) until asked to exit.
    let mut shutdown = shutdown_rx;
    let _ = shutdown.wait_for(|stop| *stop).await;

    if let Some(task) = status_task {
        let _ = task.await;
    }

    info!("afkbot stopped");
    Ok(())
}
