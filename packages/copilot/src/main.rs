use std::fs::OpenOptions;
use std::io::{self, BufReader, IsTerminal};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::prelude::*;

use copilot::config::{CliOverrides, CopilotDirs, FileConfig, PanelConfig, load_config};
use copilot::connection::WsTransport;
use copilot::host_bridge::HostBridge;
use copilot::panel::Panel;
use copilot::plain::{PlainFrontend, spawn_line_reader};
use copilot::tui::TerminalFrontend;

#[derive(Parser)]
#[command(name = "copilot")]
#[command(about = "Chat panel for a local assistant server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.copilot)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Write host notifications to this file, or `-` for stderr
    #[arg(long, global = true)]
    notify: Option<String>,

    /// Line mode: stdin lines are sent, replies are printed as plain text
    #[arg(long)]
    plain: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration as TOML
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = CopilotDirs::new(cli.data_dir.clone())?;
    let overrides = CliOverrides {
        host: cli.host.clone(),
        port: cli.port,
        notify: cli.notify.clone(),
    };
    let file_config: FileConfig = load_config(&dirs.data_dir, &overrides)
        .extract()
        .context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", toml::to_string_pretty(&file_config)?);
            Ok(())
        }
        None => run_panel(&cli, &dirs, &file_config).await,
    }
}

/// The terminal belongs to the UI, so logs go to `<data_dir>/logs/copilot.log`.
fn init_logging(dirs: &CopilotDirs, debug: bool) -> Result<()> {
    let log_path = dirs.log_path();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {:?}", log_path))?;

    let default_directive = if debug {
        "copilot=debug,copilot_render=debug,info"
    } else {
        "copilot=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false),
        )
        .with(env_filter)
        .init();
    Ok(())
}

async fn run_panel(cli: &Cli, dirs: &CopilotDirs, file_config: &FileConfig) -> Result<()> {
    let config = PanelConfig::from_file(file_config).context("Invalid configuration")?;
    init_logging(dirs, cli.debug)?;
    info!(endpoint = %config.endpoint.url(), "Starting copilot");

    let host = HostBridge::open(&config.notify)
        .context("Failed to open host notification target")?;
    let panel = Panel::new(&config, host, WsTransport::new);
    let handle = panel.handle();

    let quit_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            quit_handle.quit();
        }
    });

    let plain = cli.plain || !io::stdin().is_terminal();
    if plain {
        eprintln!("[copilot: connecting to {}]", config.endpoint.url());
        let mut frontend = PlainFrontend::stdio();
        spawn_line_reader(BufReader::new(io::stdin()), handle);
        panel.run(&mut frontend).await.context("Panel failed")?;
    } else {
        let mut frontend = TerminalFrontend::start(handle).context("Failed to start terminal")?;
        panel.run(&mut frontend).await.context("Panel failed")?;
    }

    info!("copilot exited");
    Ok(())
}
