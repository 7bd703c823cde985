use anyhow::{Context, Result};
use clap::Parser;
use stampede_config::{ConfigLoader, LogLevel, StampedeConfig};
use stampede_engine::{LoadRunner, ProfileRegistry};
use stampede_http::{HttpTransport, TransportOptions};
use stampede_logging::init_logging_from_config;
use stampede_resilience::ShutdownSignal;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

mod cli;
mod report;

use cli::{Cli, Commands, ConfigCommands, OutputFormat, RunArgs};

/// Load configuration from file or fall back to environment and defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<StampedeConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) if path.exists() => {
            info!("Loading configuration from: {:?}", path);
            loader
                .from_file(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))
        }
        Some(path) => {
            warn!("Configuration file not found: {:?}. Using defaults.", path);
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

fn build_registry(profiles_file: Option<&Path>) -> Result<ProfileRegistry> {
    let mut registry = ProfileRegistry::with_builtins().context("Built-in profiles are invalid")?;
    if let Some(path) = profiles_file {
        let count = registry
            .load_file(path)
            .with_context(|| format!("Failed to load profiles from {:?}", path))?;
        info!("Loaded {} profile(s) from {:?}", count, path);
    }
    Ok(registry)
}

async fn run_command(mut config: StampedeConfig, args: &RunArgs) -> Result<()> {
    args.apply(&mut config);

    let registry = build_registry(config.load.profiles_file.as_deref().map(Path::new))?;
    let transport = HttpTransport::new(
        &config.target.host,
        TransportOptions::from(&config.http).sized_for(config.load.users),
    )
        .context("Failed to build HTTP transport")?;

    let mut runner = LoadRunner::from_config(&config, &registry, Arc::new(transport))?;
    if let Some(token) = &args.token {
        runner = runner.with_shared_credential(token.clone());
    }

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping virtual users");
            stop.trigger(ShutdownSignal::Graceful);
        }
    });

    info!(
        "Starting {} virtual users against {} with profile '{}'",
        config.load.users, config.target.host, config.load.profile
    );
    let summary = runner.run().await.context("Load run failed")?;

    match args.format {
        OutputFormat::Text => print!("{}", report::render_summary(&summary)),
        OutputFormat::Json => println!(
            "{}",
            summary.to_json().context("Failed to serialize run summary")?
        ),
    }

    if summary.unexpected_failures() > 0 {
        warn!("{} unexpected failures recorded", summary.unexpected_failures());
    }
    Ok(())
}

fn handle_config_sample(output: Option<&PathBuf>, force: bool) -> Result<()> {
    let sample = StampedeConfig::generate_sample();

    let Some(output) = output else {
        print!("{}", sample);
        return Ok(());
    };

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(output, sample).with_context(|| format!("Failed to write {:?}", output))?;
    println!("Sample configuration written to {}", output.display());
    Ok(())
}

fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    if !config_file.exists() {
        return Err(anyhow::anyhow!("Configuration file not found: {:?}", config_file));
    }

    match load_config(Some(config_file)) {
        Ok(_) => {
            println!("Configuration file is valid");
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

fn handle_config_show(config: &StampedeConfig, format: &str) -> Result<()> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => {
            let yaml = serde_yaml::to_string(config).context("Failed to serialize to YAML")?;
            print!("{}", yaml);
        }
        "json" => {
            let json = serde_json::to_string_pretty(config).context("Failed to serialize to JSON")?;
            println!("{}", json);
        }
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown output format: {}. Valid formats: yaml, json",
                format
            ))
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!("Invalid --log-level: {}", e))?;
    }
    init_logging_from_config(&config.logging)?;

    match &cli.command {
        Commands::Run(args) => run_command(config, args).await,
        Commands::Profiles { profiles_file } => {
            let path = profiles_file
                .as_deref()
                .or(config.load.profiles_file.as_deref().map(Path::new));
            let registry = build_registry(path)?;
            print!("{}", report::render_profiles(&registry));
            Ok(())
        }
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Sample { output, force } => handle_config_sample(output.as_ref(), *force),
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Show { format } => handle_config_show(&config, format),
        },
    }
}
