//! cwmp-sim CLI — starts the simulated CPE process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use cwmp_sim::{config::SimConfig, core::Simulator, utils::setup_logging, Result};

#[derive(Parser)]
#[command(name = "cwmp-sim")]
#[command(about = "CWMP (TR-069) CPE simulator")]
#[command(version = cwmp_sim::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the simulated CPE
    Start,
    /// Validate configuration
    ValidateConfig,
    /// Generate default configuration
    GenerateConfig {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(&cli)?;
    config.logging.level = cli.log_level.clone();
    setup_logging(&config.logging)?;

    info!("Starting {} v{}", cwmp_sim::NAME, cwmp_sim::VERSION);
    info!("Description: {}", cwmp_sim::DESCRIPTION);

    match &cli.command {
        Some(Commands::Start) | None => run_simulator(config).await,
        Some(Commands::ValidateConfig) => validate_configuration(&config),
        Some(Commands::GenerateConfig { output }) => generate_default_config(output.clone()),
    }
}

fn load_configuration(cli: &Cli) -> Result<SimConfig> {
    let config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path.display());
        SimConfig::load_from_file(config_path)?
    } else {
        info!("No configuration file specified, trying environment variables");
        match SimConfig::load_from_env() {
            Ok(config) => config,
            Err(_) => {
                info!("No environment configuration found, using defaults");
                SimConfig::default_config()
            }
        }
    };

    config.validate()?;
    info!("Configuration loaded and validated successfully");
    Ok(config)
}

async fn run_simulator(config: SimConfig) -> Result<()> {
    info!("Initializing CWMP simulator");

    let simulator = Arc::new(Simulator::new(config).await?);
    let mut event_rx = simulator
        .take_event_receiver()
        .await
        .ok_or_else(|| cwmp_sim::Error::internal("Failed to get event receiver"))?;

    simulator.start().await?;

    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            handle_simulator_event(event).await;
        }
    });

    let shutdown_simulator = simulator.clone();
    let shutdown_task = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully");
                shutdown_simulator.stop().await;
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    tokio::select! {
        _ = event_task => {
            info!("Event handling completed");
        }
        _ = shutdown_task => {
            info!("Shutdown signal received");
        }
    }

    simulator.stop().await;
    info!("CWMP simulator shutdown complete");
    Ok(())
}

async fn handle_simulator_event(event: cwmp_sim::core::SimulatorEvent) {
    use cwmp_sim::core::SimulatorEvent;

    match event {
        SimulatorEvent::SessionStarted { event } => {
            info!(event, "session started");
        }
        SimulatorEvent::SessionEnded => {
            info!("session ended");
        }
        SimulatorEvent::DownloadRequested { command_key } => {
            info!(command_key, "download requested");
        }
        SimulatorEvent::RebootRequested => {
            info!("reboot requested");
        }
        SimulatorEvent::FactoryResetRequested => {
            info!("factory reset requested");
        }
        SimulatorEvent::Fault { code, message } => {
            error!(code, message, "simulator fault");
        }
    }
}

fn validate_configuration(config: &SimConfig) -> Result<()> {
    info!("Validating configuration...");

    config.validate()?;

    println!("✓ Configuration is valid");
    println!("  ACS URL: {}", config.acs.url);
    println!("  Serial Number: {}", config.device.serial_number);
    println!("  Periodic Inform Interval: {}s", config.acs.periodic_inform_interval);
    println!("  Download Timeout: {}ms", config.download.effective_timeout_ms());

    Ok(())
}

fn generate_default_config(output_path: Option<PathBuf>) -> Result<()> {
    let config = SimConfig::default_config();
    let toml_content = toml::to_string_pretty(&config)
        .map_err(|e| cwmp_sim::Error::internal(format!("Failed to serialize config: {}", e)))?;

    match output_path {
        Some(path) => {
            std::fs::write(&path, toml_content)?;
            println!("✓ Default configuration written to: {}", path.display());
        }
        None => {
            println!("{}", toml_content);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_generation() {
        let result = generate_default_config(None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = SimConfig::default_config();
        let result = validate_configuration(&config);
        assert!(result.is_ok());
    }
}
