//! Console rendering of run summaries and profile listings

use colored::Colorize;
use stampede_engine::{ProfileRegistry, RunSummary, DEFAULT_PROFILE};
use std::fmt::Write;

fn ms(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
}

pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} {} ({}, {})",
        "Load run".bold(),
        summary.run_id,
        summary.profile.cyan(),
        summary.mode
    );
    let _ = writeln!(
        out,
        "Duration: {:.1}s  Requests: {}",
        summary.duration_secs, summary.requests
    );
    let workers = &summary.workers;
    let auth_failed = if workers.auth_failed > 0 {
        workers.auth_failed.to_string().yellow()
    } else {
        workers.auth_failed.to_string().normal()
    };
    let _ = writeln!(
        out,
        "Workers: {} spawned, {} authenticated, {} auth failed, {} aborted",
        workers.spawned, workers.authenticated, auth_failed, workers.aborted
    );

    let _ = writeln!(out, "\n{}", "Cache".bold());
    let _ = writeln!(
        out,
        "  hits {}  misses {}  hit rate {:.1}%",
        summary.cache.hits, summary.cache.misses, summary.cache.hit_rate
    );

    let _ = writeln!(out, "\n{}", "Created resources".bold());
    for (kind, count) in &summary.created_resources {
        let _ = writeln!(out, "  {:<14} {}", kind, count);
    }

    let _ = writeln!(
        out,
        "\n{:<30} {:>8} {:>9} {:>11} {:>8} {:>8} {:>8} {:>8}",
        "Action".bold(),
        "OK",
        "Expected",
        "Unexpected",
        "Skipped",
        "p50 ms",
        "p95 ms",
        "p99 ms"
    );
    for (name, action) in &summary.actions {
        let latency = action.latency.as_ref();
        let unexpected = if action.unexpected_failure > 0 {
            action.unexpected_failure.to_string().red()
        } else {
            action.unexpected_failure.to_string().normal()
        };
        let _ = writeln!(
            out,
            "{:<30} {:>8} {:>9} {:>11} {:>8} {:>8} {:>8} {:>8}",
            name,
            action.success.to_string().green(),
            action.expected_failure,
            unexpected,
            action.skipped,
            ms(latency.map(|l| l.p50_ms)),
            ms(latency.map(|l| l.p95_ms)),
            ms(latency.map(|l| l.p99_ms)),
        );
    }

    out
}

pub fn render_profiles(registry: &ProfileRegistry) -> String {
    let mut out = String::new();
    for profile in registry.iter() {
        let marker = if profile.name == DEFAULT_PROFILE { " (default)" } else { "" };
        let _ = writeln!(out, "{}{}", profile.name.bold(), marker);
        let _ = writeln!(out, "  mode: {}  wait: {}", profile.execution_mode(), profile.wait_time);
        if !profile.description.is_empty() {
            let _ = writeln!(out, "  {}", profile.description);
        }
        let actions: Vec<String> = profile
            .plan
            .specs()
            .iter()
            .map(|spec| match profile.execution_mode() {
                stampede_engine::ExecutionMode::WeightedPool => format!("{}:{}", spec.name, spec.weight),
                stampede_engine::ExecutionMode::Sequential => spec.name.clone(),
            })
            .collect();
        let _ = writeln!(out, "  actions: {}", actions.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_listing_marks_default() {
        colored::control::set_override(false);
        let registry = ProfileRegistry::with_builtins().unwrap();
        let listing = render_profiles(&registry);

        assert!(listing.contains("cache-focus (default)"));
        assert!(listing.contains("list-books:10"));
        assert!(listing.contains("mode: sequential"));
        assert!(listing.contains("constant_pacing(10s)"));
    }

    #[test]
    fn test_summary_lists_every_action() {
        use stampede_engine::{MetricsAggregator, ResourceTracker, WorkerTally};

        colored::control::set_override(false);
        let registry = ProfileRegistry::with_builtins().unwrap();
        let profile = registry.get("lifecycle").unwrap();
        let summary = RunSummary::build(
            &profile,
            chrono::Utc::now(),
            std::time::Duration::from_secs(12),
            WorkerTally::default(),
            &MetricsAggregator::new(),
            &ResourceTracker::new(),
        );

        let text = render_summary(&summary);
        assert!(text.contains("hit rate 0.0%"));
        assert!(text.contains("mark-notification-read"));
        assert!(text.contains("notification"));
        assert!(text.contains("Duration: 12.0s"));
    }
}
