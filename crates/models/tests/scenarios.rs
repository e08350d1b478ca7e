//! End-to-end scenario runs.
//!
//! Each test drives a full seeded simulation through the public `run`
//! functions and checks properties of the report rather than exact values.

use queuesim_models::collapse::{self, CollapseConfig, LoadShape};
use queuesim_models::nudge::{self, Discipline, NudgeConfig};
use queuesim_models::open_closed::{self, LoadLoop, OpenClosedConfig};
use queuesim_models::retries::{self, ClientKind, RetriesConfig};
use queuesim_models::{cache, ski, CsvRecord, ModelError};
use queuesim_retry::{BackoffPolicy, RetryStrategyConfig};
use queuesim_test_helpers::TEST_SEED;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_ski_runs_are_reproducible() {
    let config = ski::SkiConfig::default().with_max_t(5_000.0);
    let a = ski::run(&config, TEST_SEED).unwrap();
    let b = ski::run(&config, TEST_SEED).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.skiers, 25);
    assert!(a.skiers_skiing <= 25.0);
    assert_eq!(a.name, "chair_4_pack");
}

#[test]
fn test_ski_queue_grows_with_skiers() {
    let small = ski::run(&ski::SkiConfig::default().with_skiers(10).with_max_t(20_000.0), 7).unwrap();
    let large = ski::run(&ski::SkiConfig::default().with_skiers(1_000).with_max_t(20_000.0), 7).unwrap();
    assert!(large.avg_queue_len > small.avg_queue_len);
}

#[test]
fn test_retries_without_failures_never_retry() {
    let config = RetriesConfig::default().with_max_t(2.0);
    let stats = retries::run(&config, "no_failures", TEST_SEED).unwrap();
    assert_eq!(stats.total_calls, stats.unique_calls);
    assert_eq!(stats.successes, stats.unique_calls);
    assert!(stats.unique_calls > 0);
}

#[test]
fn test_retry_amplification_bounded_by_strategy() {
    let config = RetriesConfig::default()
        .with_max_t(2.0)
        .with_failure_rate(0.5)
        .with_strategy(RetryStrategyConfig::n_retries(3));
    let stats = retries::run(&config, "n_retries_3", TEST_SEED).unwrap();
    assert!(stats.amplification() > 1.0);
    assert!(stats.amplification() <= 4.0);
    assert!(stats.successes <= stats.unique_calls);
}

#[test]
fn test_adaptive_bucket_limits_retries_under_total_failure() {
    let unlimited = RetriesConfig::default()
        .with_max_t(2.0)
        .with_failure_rate(1.0)
        .with_strategy(RetryStrategyConfig::n_retries(3));
    let adaptive = unlimited
        .clone()
        .with_strategy(RetryStrategyConfig::adaptive(0.1, 5.0));

    let unlimited = retries::run(&unlimited, "n", TEST_SEED).unwrap();
    let adaptive = retries::run(&adaptive, "a", TEST_SEED).unwrap();
    assert_eq!(unlimited.successes, 0);
    assert!(adaptive.amplification() < unlimited.amplification());
}

#[test]
fn test_serial_client_with_backoff_drains() {
    let config = RetriesConfig::default()
        .with_clients(10)
        .with_max_t(2.0)
        .with_failure_rate(0.3)
        .with_client_kind(ClientKind::SerialWithBackoff)
        .with_call_backoff(BackoffPolicy::ExponentialJitter { initial: 0.01 });
    let stats = retries::run(&config, "serial", TEST_SEED).unwrap();
    assert!(stats.total_calls >= stats.unique_calls);
}

#[test]
fn test_nudge_disciplines_complete_the_same_jobs() {
    let base = NudgeConfig::default().with_max_t(20_000.0);
    let fcfs = nudge::run(&base, TEST_SEED).unwrap();
    let nudged = nudge::run(&base.clone().with_discipline(Discipline::Nudge), TEST_SEED).unwrap();
    assert!(!fcfs.is_empty());
    assert!(fcfs.iter().all(|c| c.service_time >= c.q_time && c.q_time >= 0.0));
    assert!(nudged.iter().all(|c| c.name.starts_with("Nudge")));
}

#[test]
fn test_closed_loop_caps_outstanding_jobs() {
    let config = OpenClosedConfig::default()
        .with_load(LoadLoop::Closed { mpl: 5 })
        .with_max_t(500.0);
    let rows = open_closed::run(&config, &config.name(), TEST_SEED).unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.qlen <= 5));
}

#[test]
fn test_open_loop_latency_rises_with_load() {
    let mean_latency = |rho: f64| {
        let config = OpenClosedConfig::default().with_rho(rho).with_max_t(2_000.0);
        let rows = open_closed::run(&config, "open", TEST_SEED).unwrap();
        rows.iter().map(|r| r.service_time).sum::<f64>() / rows.len() as f64
    };
    assert!(mean_latency(0.9) > mean_latency(0.3));
}

#[test]
fn test_spike_collapses_without_backoff() {
    let config = CollapseConfig::default().with_load(LoadShape::spike());
    let rows = collapse::run_averaged(&config, &config.name(), TEST_SEED, 3).unwrap();
    assert_eq!(rows.len(), 79);

    let before: f64 = rows[5..15].iter().map(|r| r.successes).sum::<f64>() / 10.0;
    let after: f64 = rows[60..70].iter().map(|r| r.successes).sum::<f64>() / 10.0;
    let after_timeouts: f64 = rows[60..70].iter().map(|r| r.timeouts).sum();
    assert!(before > 30.0, "healthy throughput {before}");
    assert!(after < before, "post-spike throughput {after}");
    assert!(after_timeouts > 0.0);
}

#[test]
fn test_cache_rows_render() {
    let config = cache::CacheConfig::default().with_max_t(3.0);
    let rows = cache::run(&config, &config.name(), TEST_SEED).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.to_row().unwrap().ends_with(",backend_1%")));
    assert_eq!(cache::CacheStats::header(), "time,hits,misses,rate,name");
}

#[test]
fn test_invalid_configs_are_rejected() {
    let err = ski::run(&ski::SkiConfig::default().with_chair_width(0), 1).unwrap_err();
    assert!(matches!(err, ModelError::InvalidParameter { .. }));

    let err = retries::run(&RetriesConfig::default().with_failure_rate(2.0), "x", 1).unwrap_err();
    assert!(matches!(err, ModelError::InvalidParameter { .. }));
}
