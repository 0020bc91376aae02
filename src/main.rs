//! Area Projector
//!
//! Runs the projection helper, or talks to a running one.

use std::path::PathBuf;

use anyhow::{Context, Result};
use area_projector::config::Config;
use area_projector::control::{parse_window_id, ControlClient};
use area_projector::display::DisplayError;
use area_projector::transfer::{BackendPreference, TransferKind};
use area_projector::x11::X11Display;
use area_projector::x11_async::X11Readiness;
use area_projector::Projector;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use x11rb::protocol::xproto::Window;

#[derive(Debug, Parser)]
#[command(name = "area-projector", version, about = "Project X11 windows onto each other")]
struct Cli {
    /// X display to use
    #[arg(long, global = true)]
    display: Option<String>,

    /// Transfer backend
    #[arg(long, value_enum)]
    backend: Option<BackendPreference>,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start projecting SOURCE onto TARGET
    Enable {
        #[arg(value_parser = parse_window_id)]
        source: Window,
        #[arg(value_parser = parse_window_id)]
        target: Window,
    },
    /// Stop projecting SOURCE onto TARGET
    Disable {
        #[arg(value_parser = parse_window_id)]
        source: Window,
        #[arg(value_parser = parse_window_id)]
        target: Window,
    },
    /// Set the brightness of a projection target (-255..=255, 0 for none)
    Brightness {
        #[arg(value_parser = parse_window_id)]
        target: Window,
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
}

/// The helper daemon: an engine plus the socket it waits on
struct ProjectorApp {
    projector: Projector<X11Display>,
    readiness: X11Readiness,
}

impl ProjectorApp {
    fn new(config: &Config) -> Result<Self> {
        let display = X11Display::connect(config.display.as_deref())?;

        let kind = TransferKind::select(config.backend, &display)
            .context("Failed to select transfer backend")?;
        let control_window = display.publish_control_window()?;
        let readiness = X11Readiness::new(display.connection())?;

        let atoms = display.atoms();
        let settings = config.transfer_settings();
        let projector = Projector::new(display, atoms, control_window, kind, settings);

        Ok(Self { projector, readiness })
    }

    /// Handle everything already received
    fn drain(&mut self) -> Result<(), DisplayError> {
        self.projector.dispatch_pending()?;
        self.projector.display().flush()
    }

    /// Dispatch until the connection closes or shutdown is requested
    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!("Waiting for projection requests");

        loop {
            if let Err(e) = self.drain() {
                info!("X11 connection lost ({}), exiting", e);
                return Ok(());
            }

            tokio::select! {
                () = self.readiness.readable() => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, cleaning up...");
                    break;
                }
            }
        }

        self.projector.shutdown();
        let control_window = self.projector.control_window();
        self.projector
            .into_display()
            .remove_control_window(control_window)
            .context("Failed to remove control window")?;

        Ok(())
    }
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_command(config: &Config, command: Command) -> Result<()> {
    let client = ControlClient::connect(config.display.as_deref())?;

    match command {
        Command::Enable { source, target } => client.enable(source, target),
        Command::Disable { source, target } => client.disable(source, target),
        Command::Brightness { target, value } => client.set_brightness(target, value),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, source) = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.display.is_some() {
        config.display = cli.display.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    init_logging(&config.log_filter);
    source.log(&config);

    if let Some(command) = cli.command {
        return run_command(&config, command);
    }

    info!("Starting Area projector");

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                }
            }
            if shutdown_tx.send(()).await.is_err() {
                warn!("Dispatcher already stopped");
            }
        });
    }

    let app = ProjectorApp::new(&config)?;
    if let Err(e) = app.run(shutdown_rx).await {
        error!("Application error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
