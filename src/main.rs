// src/main.rs - Command-line front end for a remote pen plotter
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use plotter_remote::config::{self, ClientConfig};
use plotter_remote::display::Summary;
use plotter_remote::ingest::FileDocument;
use plotter_remote::notify::{Notification, PresentationSink, Severity};
use plotter_remote::{DeviceSnapshot, OutgoingCommand, Session, SessionError};

/// Remote control for a pen plotter
#[derive(Parser, Debug)]
#[command(name = "plotter-remote", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults are used when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Page origin of the plotter UI, e.g. https://plotter.local
    #[arg(long)]
    origin: Option<String>,

    /// Log at debug level regardless of the config
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every state change until the device closes the channel
    Watch,
    /// Print the current device state and the permitted commands
    Status,
    /// Raise the pen (idle only)
    PenUp,
    /// Lower the pen (idle only)
    PenDown,
    /// Pause the running job
    Pause,
    /// Start or resume plotting
    Resume,
    /// Cancel the running or paused job
    Cancel,
    /// Send a document over the control channel
    Send { file: PathBuf },
    /// Upload a document over HTTP
    Upload { file: PathBuf },
}

/// Prints to the terminal in place of a browser page.
struct ConsoleSink {
    watching: bool,
}

impl PresentationSink for ConsoleSink {
    fn show_document(&mut self, document: &str) {
        if self.watching {
            println!("document loaded ({} bytes)", document.len());
        }
    }

    fn notify(&mut self, notification: Notification) {
        match notification.severity() {
            Severity::Blocking => eprintln!("error: {}", notification),
            Severity::Warning => eprintln!("device: {}", notification),
        }
    }

    fn snapshot_changed(&mut self, _previous: &DeviceSnapshot, current: &DeviceSnapshot) {
        if self.watching {
            println!("{}", Summary(current));
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match config::load_config(&path.to_string_lossy()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config from '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ClientConfig::default(),
    };
    if let Some(origin) = cli.origin {
        config.server.origin = origin;
    }
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        config.client.log_level.parse().unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Plotter UI origin: {}", config.server.origin);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), SessionError> {
    let sink = ConsoleSink {
        watching: matches!(command, Command::Watch),
    };
    let mut session = Session::connect(config, sink).await?;
    let first = session.wait_for_sync().await?.clone();

    let result = match command {
        Command::Watch => {
            println!("{}", Summary(&first));
            session.run().await
        }
        Command::Status => {
            println!("{}", Summary(&first));
            println!("permitted: {}", session.permitted());
            Ok(())
        }
        Command::PenUp => session.send(OutgoingCommand::ManualPenUp).await,
        Command::PenDown => session.send(OutgoingCommand::ManualPenDown).await,
        Command::Pause => session.send(OutgoingCommand::PausePlotting).await,
        Command::Resume => session.send(OutgoingCommand::ResumePlotting).await,
        Command::Cancel => session.send(OutgoingCommand::CancelPlotting).await,
        Command::Send { file } => session.ingest(&FileDocument::new(file)).await,
        Command::Upload { file } => {
            let client = reqwest::Client::new();
            session.upload(&client, &FileDocument::new(file)).await
        }
    };

    session.close().await;
    result
}
