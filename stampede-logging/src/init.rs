use anyhow::Result;
use stampede_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the filter for a configuration.
///
/// The configured level and directives win; `RUST_LOG` is only consulted when
/// they do not parse, and `info` is the last resort.
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let mut spec = config.level.to_string();
    for directive in &config.directives {
        spec.push(',');
        spec.push_str(directive);
    }

    EnvFilter::try_new(&spec)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // try_init so a second initialization (tests, embedding) is not fatal
    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    let level = log_level
        .parse()
        .map_err(|e: String| anyhow::anyhow!("Failed to parse log level: {}", e))?;

    let config = LoggingConfig {
        level,
        ..Default::default()
    };
    init_logging_from_config(&config)
}
