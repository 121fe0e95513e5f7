mod replay;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use telemetry_analytics::ReportGenerator;
use telemetry_core::config::{AppConfig, LoggingConfig};
use telemetry_service::TelemetryService;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "session-telemetry",
    about = "Presence and chat analytics for live collaboration sessions",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/session-telemetry/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session event log and record the session
    Replay {
        /// JSON event log
        file: PathBuf,
        /// Print the report as JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Show the aggregate server history
    History {
        /// Print raw JSON instead of markdown
        #[arg(long)]
        json: bool,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config.
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // Apply CLI overrides.
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }

    init_tracing(&config.logging, cli.verbose);

    tracing::debug!(
        data_dir = %config.storage.resolved_data_dir().display(),
        threshold_mins = config.analytics.insincere_threshold_mins,
        "configuration loaded"
    );

    match cli.command {
        Commands::Replay { file, json } => {
            let service = TelemetryService::from_config(config);
            replay::run(&service, &file, json).await?;
        }
        Commands::History { json } => {
            let service = TelemetryService::from_config(config);
            let history = service.history().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                print!("{}", ReportGenerator::history_report(&history));
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, &config)?;
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone()))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save()?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}
