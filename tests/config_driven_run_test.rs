//! Runs assembled the way the binary assembles them: YAML config, profile
//! file and registry lookup

use anyhow::Result;
use book_api_stub::BookApi;
use stampede_config::ConfigLoader;
use stampede_engine::{EngineError, ExecutionMode, LoadRunner, ProfileRegistry};
use stampede_http::{HttpTransport, TransportOptions};
use std::sync::Arc;

const PROFILES: &str = r#"
profiles:
  - name: catalogue-browse
    description: Listing and search only
    wait_time: { type: between, min: 10ms, max: 30ms }
    actions:
      - { action: list-books, weight: 3 }
      - { action: search-books, weight: 1, search_terms: [dune] }
      - { action: view-book, weight: 2, name: "GET /books/:id" }
"#;

fn config_yaml(host: &str, profiles_file: &str, profile: &str) -> String {
    format!(
        r#"
target:
  host: "{host}"
  credentials:
    email: load@example.com
    password: secret
load:
  users: 3
  spawn_rate: 10.0
  run_time: 1
  profile: {profile}
  profiles_file: "{profiles_file}"
  stop_timeout: 5
  seed: 42
auth:
  start_jitter_ms: 0
  warmup_ms: 0
logging:
  level: warn
"#
    )
}

#[tokio::test]
async fn test_profile_from_file_drives_the_run() -> Result<()> {
    let api = BookApi::start().await?;
    let dir = tempfile::tempdir()?;
    let profiles_path = dir.path().join("profiles.yaml");
    std::fs::write(&profiles_path, PROFILES)?;
    let config_path = dir.path().join("stampede.yaml");
    std::fs::write(
        &config_path,
        config_yaml(&api.base_url(), &profiles_path.display().to_string(), "catalogue-browse"),
    )?;

    let config = ConfigLoader::new().from_file(&config_path)?;
    let mut registry = ProfileRegistry::with_builtins()?;
    let profiles_file = config.load.profiles_file.clone().unwrap();
    assert_eq!(registry.load_file(&profiles_file)?, 1);

    let transport = HttpTransport::new(&config.target.host, TransportOptions::from(&config.http))?;
    let runner = LoadRunner::from_config(&config, &registry, Arc::new(transport))?;
    assert_eq!(runner.settings().users, 3);
    assert_eq!(runner.settings().seed, Some(42));

    let summary = runner.run().await?;

    assert_eq!(summary.profile, "catalogue-browse");
    assert_eq!(summary.mode, ExecutionMode::WeightedPool);
    assert_eq!(summary.workers.authenticated, 3);
    assert!(summary.action("GET /books/:id").unwrap().success > 0);
    assert!(summary.action("search-books").is_some());
    assert_eq!(summary.unexpected_failures(), 0);
    assert!(api.requests() as u64 >= summary.requests);
    Ok(())
}

#[tokio::test]
async fn test_builtin_profile_by_name() -> Result<()> {
    let api = BookApi::start().await?;
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("stampede.yaml");
    let yaml = config_yaml(&api.base_url(), "unused.yaml", "health-monitor");
    std::fs::write(&config_path, yaml)?;

    let config = ConfigLoader::new().from_file(&config_path)?;
    let registry = ProfileRegistry::with_builtins()?;
    let transport = HttpTransport::new(&config.target.host, TransportOptions::from(&config.http))?;
    let summary = LoadRunner::from_config(&config, &registry, Arc::new(transport))?
        .run()
        .await?;

    assert_eq!(summary.profile, "health-monitor");
    assert!(summary.requests > 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_profile_is_rejected_before_traffic() -> Result<()> {
    let api = BookApi::start().await?;
    let config = ConfigLoader::new().from_yaml_str(&config_yaml(&api.base_url(), "unused.yaml", "nope"))?;
    let registry = ProfileRegistry::with_builtins()?;
    let transport = HttpTransport::new(&config.target.host, TransportOptions::from(&config.http))?;

    let result = LoadRunner::from_config(&config, &registry, Arc::new(transport));

    assert!(matches!(result, Err(EngineError::UnknownProfile(_))));
    assert_eq!(api.requests(), 0);
    Ok(())
}
