//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use stampede_config::StampedeConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a load test against the target service
    Run(RunArgs),

    /// List the available scenario profiles
    Profiles {
        /// YAML file with additional profiles
        #[arg(long, value_name = "PATH")]
        profiles_file: Option<PathBuf>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Flags that override the loaded configuration for one run
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Base URL of the target service
    #[arg(long, value_name = "URL")]
    pub host: Option<String>,

    /// Number of concurrent virtual users
    #[arg(long, short = 'u', value_name = "N")]
    pub users: Option<usize>,

    /// Virtual users started per second
    #[arg(long, short = 'r', value_name = "RATE")]
    pub spawn_rate: Option<f64>,

    /// Run duration in seconds
    #[arg(long, short = 't', value_name = "SECS")]
    pub run_time: Option<u64>,

    /// Scenario profile name
    #[arg(long, short = 'p', value_name = "NAME")]
    pub profile: Option<String>,

    /// YAML file with additional profiles
    #[arg(long, value_name = "PATH")]
    pub profiles_file: Option<PathBuf>,

    /// Seed for reproducible action selection
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Pre-issued access token; virtual users skip the login request
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Apply the flags that were given on top of `config`
    pub fn apply(&self, config: &mut StampedeConfig) {
        if let Some(host) = &self.host {
            config.target.host = host.clone();
        }
        if let Some(users) = self.users {
            config.load.users = users;
        }
        if let Some(rate) = self.spawn_rate {
            config.load.spawn_rate = rate;
        }
        if let Some(secs) = self.run_time {
            config.load.run_time = Duration::from_secs(secs);
        }
        if let Some(profile) = &self.profile {
            config.load.profile = profile.clone();
        }
        if let Some(path) = &self.profiles_file {
            config.load.profiles_file = Some(path.display().to_string());
        }
        if let Some(seed) = self.seed {
            config.load.seed = Some(seed);
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a sample configuration file
    Sample {
        /// Write to this path instead of stdout
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Show the configuration in effect
    Show {
        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}
