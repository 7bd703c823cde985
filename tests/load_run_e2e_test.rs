//! End-to-end load runs over real HTTP against the in-process book API

use anyhow::Result;
use book_api_stub::{closed_address, BookApi};
use stampede_config::{AuthConfig, Credentials};
use stampede_engine::{
    ActionId, ActionPlan, ActionSpec, Authenticator, EngineError, JourneyStep, LoadRunner, RunSettings,
    ScenarioProfile, WaitTime,
};
use stampede_http::{HttpTransport, Transport, TransportOptions};
use stampede_resilience::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;

fn settings(users: usize, run_time: Duration) -> RunSettings {
    RunSettings {
        users,
        spawn_rate: 20.0,
        run_time,
        stop_timeout: Duration::from_secs(5),
        seed: Some(7),
        start_jitter: Duration::ZERO,
        warmup: Duration::ZERO,
    }
}

fn transport(host: &str) -> Result<Arc<dyn Transport>> {
    let options = TransportOptions {
        timeout: Duration::from_secs(5),
        ..TransportOptions::default()
    };
    Ok(Arc::new(HttpTransport::new(host, options)?))
}

fn authenticator() -> Authenticator {
    Authenticator::new(
        &AuthConfig::default(),
        Credentials {
            email: "load@example.com".to_string(),
            password: "secret".to_string(),
        },
    )
}

fn library_mix() -> ScenarioProfile {
    let pool = vec![
        ActionSpec::new(ActionId::ListBooks, 4),
        ActionSpec::new(ActionId::ViewBook, 3),
        ActionSpec::new(ActionId::SearchBooks, 1).with_search_terms(&["dune", "rust"]),
        ActionSpec::new(ActionId::ListMyBooks, 1),
        ActionSpec::new(ActionId::CreateBook, 2),
        ActionSpec::new(ActionId::UpdateBook, 1),
        ActionSpec::new(ActionId::CreateBorrow, 3),
        ActionSpec::new(ActionId::ApproveBorrow, 2),
        ActionSpec::new(ActionId::ReturnBorrow, 2),
        ActionSpec::new(ActionId::ListBorrows, 1),
        ActionSpec::new(ActionId::ViewMyBorrows, 1),
        ActionSpec::new(ActionId::ViewNotifications, 2),
        ActionSpec::new(ActionId::MarkNotificationRead, 1),
        ActionSpec::new(ActionId::HealthCheck, 1),
    ];
    ScenarioProfile::new(
        "library-mix",
        "Every weighted action against the stub",
        WaitTime::constant(Duration::from_millis(10)),
        ActionPlan::weighted(pool).unwrap(),
    )
}

#[tokio::test]
async fn test_weighted_run_exercises_the_whole_api() -> Result<()> {
    let api = BookApi::start().await?;
    let runner = LoadRunner::new(
        transport(&api.base_url())?,
        Arc::new(library_mix()),
        authenticator(),
        settings(4, Duration::from_secs(2)),
    );

    let summary = runner.run().await?;

    assert_eq!(summary.workers.spawned, 4);
    assert_eq!(summary.workers.authenticated, 4);
    assert_eq!(summary.workers.auth_failed, 0);
    assert_eq!(api.logins(), 4);
    assert!(summary.requests > 50, "only {} requests", summary.requests);

    // Every status the stub returns is either 2xx or listed as expected
    assert_eq!(summary.unexpected_failures(), 0, "{}", summary.to_json()?);

    let listing = summary.action("list-books").unwrap();
    assert!(listing.success > 0);
    assert!(listing.latency.is_some());
    assert!(summary.cache.hits + summary.cache.misses > 0);

    assert!(summary.created_resources["book"] > 0);
    assert!(api.book_count() >= 5 + summary.created_resources["book"]);
    assert!(api.borrow_count() >= summary.created_resources["borrow"]);
    Ok(())
}

#[tokio::test]
async fn test_journey_run_walks_steps_in_order() -> Result<()> {
    let api = BookApi::start().await?;
    let steps = vec![
        JourneyStep::new(ActionId::JourneyBrowse),
        JourneyStep::new(ActionId::JourneyViewDetails).halting(),
        JourneyStep::new(ActionId::JourneyBorrow).with_probability(0.5),
        JourneyStep::new(ActionId::JourneyCheckNotifications),
        JourneyStep::new(ActionId::JourneyMyBorrows),
    ];
    let profile = ScenarioProfile::new(
        "short-journey",
        "",
        WaitTime::constant(Duration::from_millis(10)),
        ActionPlan::sequential(steps).unwrap(),
    );
    let runner = LoadRunner::new(
        transport(&api.base_url())?,
        Arc::new(profile),
        authenticator(),
        settings(2, Duration::from_secs(2)),
    );

    let summary = runner.run().await?;

    assert_eq!(summary.workers.authenticated, 2);
    let browse = summary.action("journey-browse").unwrap();
    let my_borrows = summary.action("journey-my-borrows").unwrap();
    assert!(browse.success > 0);
    // Later steps never run more often than the first one
    assert!(my_borrows.requests() <= browse.requests());
    assert!(summary.action("journey-borrow").unwrap().requests() <= browse.requests());
    assert_eq!(summary.unexpected_failures(), 0, "{}", summary.to_json()?);
    Ok(())
}

#[tokio::test]
async fn test_rate_limited_login_is_retried() -> Result<()> {
    let api = BookApi::start_with_rate_limited_logins(2).await?;
    let profile = ScenarioProfile::new(
        "health",
        "",
        WaitTime::constant(Duration::from_millis(50)),
        ActionPlan::weighted(vec![ActionSpec::new(ActionId::HealthCheck, 1)]).unwrap(),
    );
    let runner = LoadRunner::new(
        transport(&api.base_url())?,
        Arc::new(profile),
        authenticator(),
        settings(1, Duration::from_secs(1)),
    );

    let summary = runner.run().await?;

    assert_eq!(summary.workers.authenticated, 1);
    assert_eq!(api.logins(), 3);
    assert!(summary.action("health-check").unwrap().success > 0);
    Ok(())
}

#[tokio::test]
async fn test_shared_token_skips_login() -> Result<()> {
    let api = BookApi::start().await?;
    let profile = ScenarioProfile::new(
        "browse",
        "",
        WaitTime::constant(Duration::from_millis(20)),
        ActionPlan::weighted(vec![ActionSpec::new(ActionId::ListBooks, 1)]).unwrap(),
    );
    let runner = LoadRunner::new(
        transport(&api.base_url())?,
        Arc::new(profile),
        authenticator(),
        settings(3, Duration::from_secs(1)),
    )
    .with_shared_credential("stub-token-shared");

    let summary = runner.run().await?;

    assert_eq!(api.logins(), 0);
    assert_eq!(summary.workers.authenticated, 3);
    assert!(summary.action("list-books").unwrap().success > 0);
    assert_eq!(summary.unexpected_failures(), 0);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_target_fails_the_run() -> Result<()> {
    let host = closed_address().await?;
    let profile = ScenarioProfile::new(
        "health",
        "",
        WaitTime::constant(Duration::from_millis(50)),
        ActionPlan::weighted(vec![ActionSpec::new(ActionId::HealthCheck, 1)]).unwrap(),
    );
    let runner = LoadRunner::new(
        transport(&host)?,
        Arc::new(profile),
        authenticator(),
        settings(2, Duration::from_secs(1)),
    );

    let result = runner.run().await;

    assert!(matches!(result, Err(EngineError::TargetUnreachable(_))), "{:?}", result.err());
    Ok(())
}

#[tokio::test]
async fn test_external_stop_ends_the_run_early() -> Result<()> {
    let api = BookApi::start().await?;
    let runner = LoadRunner::new(
        transport(&api.base_url())?,
        Arc::new(library_mix()),
        authenticator(),
        settings(2, Duration::from_secs(60)),
    );
    let stop = runner.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        stop.trigger(ShutdownSignal::Graceful);
    });

    let summary = tokio::time::timeout(Duration::from_secs(10), runner.run()).await??;
    assert!(summary.duration_secs < 10.0);

    let seen = api.requests();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.requests(), seen, "requests continued after the run returned");
    Ok(())
}
