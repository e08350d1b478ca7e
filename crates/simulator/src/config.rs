//! Run descriptions loaded from TOML.
//!
//! ```toml
//! seed = 7
//! name = "storm"
//!
//! [scenario]
//! type = "retries"
//! failure_rate = 0.3
//!
//! [scenario.strategy]
//! kind = "adaptive"
//! fill_rate = 0.1
//! size = 5.0
//! ```

use crate::error::{ConfigError, SimulatorError};
use crate::report::{CsvSink, LatencySummary};
use queuesim_models::cache::{self, CacheConfig, CacheStats};
use queuesim_models::collapse::{self, CollapseConfig, CollapseRow};
use queuesim_models::nudge::{self, Completion, NudgeConfig};
use queuesim_models::open_closed::{self, LoopCompletion, OpenClosedConfig};
use queuesim_models::retries::{self, RetriesConfig, RetryStats};
use queuesim_models::ski::{self, SkiConfig, SkiSummary};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// One scenario with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scenario {
    Ski(SkiConfig),
    Retries(RetriesConfig),
    Nudge(NudgeConfig),
    OpenClosed(OpenClosedConfig),
    Collapse(CollapseConfig),
    Cache(CacheConfig),
}

impl Scenario {
    /// Label used when the run config does not name the run.
    pub fn default_name(&self) -> String {
        match self {
            Scenario::Ski(config) => config.name(),
            Scenario::Retries(_) => "retries".to_string(),
            Scenario::Nudge(config) => config.name(),
            Scenario::OpenClosed(config) => config.name(),
            Scenario::Collapse(config) => config.name(),
            Scenario::Cache(config) => config.name(),
        }
    }

    /// Run once, or `runs` times averaged for the collapse scenario.
    pub fn run(&self, name: &str, seed: u64, runs: u64) -> Result<Report, SimulatorError> {
        let report = match self {
            Scenario::Ski(config) => {
                let mut summary = ski::run(config, seed)?;
                summary.name = name.to_string();
                Report::Ski(vec![summary])
            }
            Scenario::Retries(config) => Report::Retries(vec![retries::run(config, name, seed)?]),
            Scenario::Nudge(config) => {
                let mut completions = nudge::run(config, seed)?;
                for completion in &mut completions {
                    completion.name = name.to_string();
                }
                Report::Nudge(completions)
            }
            Scenario::OpenClosed(config) => {
                Report::OpenClosed(open_closed::run(config, name, seed)?)
            }
            Scenario::Collapse(config) => {
                Report::Collapse(collapse::run_averaged(config, name, seed, runs)?)
            }
            Scenario::Cache(config) => Report::Cache(cache::run(config, name, seed)?),
        };
        Ok(report)
    }
}

fn default_runs() -> u64 {
    1
}

/// Everything `queuesim run` needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Overridden by `--seed`.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    /// Runs averaged together. Only the collapse scenario averages.
    #[serde(default = "default_runs")]
    pub runs: u64,
    pub scenario: Scenario,
}

impl RunConfig {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            seed: None,
            name: None,
            runs: default_runs(),
            scenario,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        if config.runs == 0 {
            return Err(ConfigError::NoRuns);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), name = %config.name(), "Loaded run config");
        Ok(config)
    }

    /// Configured name, or the scenario's default label.
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.scenario.default_name())
    }

    /// Run with `seed`, which takes precedence over the configured one.
    pub fn execute(&self, seed: u64) -> Result<Report, SimulatorError> {
        self.scenario.run(&self.name(), seed, self.runs)
    }
}

/// Rows produced by a run or sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Ski(Vec<SkiSummary>),
    Retries(Vec<RetryStats>),
    Nudge(Vec<Completion>),
    OpenClosed(Vec<LoopCompletion>),
    Collapse(Vec<CollapseRow>),
    Cache(Vec<CacheStats>),
}

impl Report {
    pub fn len(&self) -> usize {
        match self {
            Report::Ski(rows) => rows.len(),
            Report::Retries(rows) => rows.len(),
            Report::Nudge(rows) => rows.len(),
            Report::OpenClosed(rows) => rows.len(),
            Report::Collapse(rows) => rows.len(),
            Report::Cache(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latency summaries per run name, for scenarios that record completions.
    pub fn latency_summaries(&self) -> Result<Option<Vec<LatencySummary>>, SimulatorError> {
        let summaries = match self {
            Report::Nudge(rows) => LatencySummary::by_name(
                rows.iter().map(|r| (r.name.as_str(), r.service_time)),
            )?,
            Report::OpenClosed(rows) => LatencySummary::by_name(
                rows.iter().map(|r| (r.name.as_str(), r.service_time)),
            )?,
            _ => return Ok(None),
        };
        Ok(Some(summaries))
    }

    /// Write the rows, or latency summaries when `summary` is set and the
    /// scenario has latencies.
    pub fn write<W: Write>(&self, sink: &mut CsvSink<W>, summary: bool) -> Result<(), SimulatorError> {
        if summary {
            if let Some(summaries) = self.latency_summaries()? {
                sink.write_all(&summaries)?;
                return Ok(());
            }
        }
        self.write_rows(sink)?;
        Ok(())
    }

    fn write_rows<W: Write>(&self, sink: &mut CsvSink<W>) -> io::Result<()> {
        match self {
            Report::Ski(rows) => sink.write_all(rows),
            Report::Retries(rows) => sink.write_all(rows),
            Report::Nudge(rows) => sink.write_all(rows),
            Report::OpenClosed(rows) => sink.write_all(rows),
            Report::Collapse(rows) => sink.write_all(rows),
            Report::Cache(rows) => sink.write_all(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuesim_models::open_closed::LoadLoop;
    use queuesim_retry::RetryStrategyConfig;

    #[test]
    fn test_parse_retries_with_strategy() {
        let text = r#"
            seed = 7
            name = "storm"

            [scenario]
            type = "retries"
            failure_rate = 0.3

            [scenario.strategy]
            kind = "adaptive"
            fill_rate = 0.1
            size = 5.0
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.name(), "storm");
        assert_eq!(config.runs, 1);
        let Scenario::Retries(retries) = &config.scenario else {
            panic!("expected retries, got {:?}", config.scenario);
        };
        assert_eq!(retries.failure_rate, 0.3);
        assert_eq!(retries.clients, 100);
        assert_eq!(retries.strategy, RetryStrategyConfig::adaptive(0.1, 5.0));
    }

    #[test]
    fn test_parse_nested_tagged_enums() {
        let text = r#"
            [scenario]
            type = "open_closed"
            rho = 0.5

            [scenario.load]
            kind = "closed"
            mpl = 10

            [scenario.job_size]
            kind = "weibull"
            mean = 0.1
            shape = 2.0
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        let Scenario::OpenClosed(oc) = &config.scenario else {
            panic!("expected open_closed");
        };
        assert_eq!(oc.load, LoadLoop::Closed { mpl: 10 });
        assert_eq!(config.name(), "weibull_closed_10");
    }

    #[test]
    fn test_zero_runs_rejected() {
        let text = "runs = 0\n[scenario]\ntype = \"cache\"\n";
        assert!(matches!(
            RunConfig::from_toml_str(text),
            Err(ConfigError::NoRuns)
        ));
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        let text = "[scenario]\ntype = \"lottery\"\n";
        assert!(matches!(
            RunConfig::from_toml_str(text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_load_logs_name() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/retry_storm.toml");
        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.name(), "adaptive_storm");
        assert!(logs_contain("Loaded run config"));
    }

    #[test]
    fn test_missing_file() {
        let err = RunConfig::load(Path::new("/nonexistent/queuesim.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/queuesim.toml"));
    }

    #[test]
    fn test_execute_cache_run() {
        let config = RunConfig::new(Scenario::Cache(CacheConfig::default().with_max_t(3.0)))
            .with_name("cold");
        let report = config.execute(1).unwrap();
        let Report::Cache(rows) = &report else {
            panic!("expected cache rows");
        };
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.name == "cold"));
        assert_eq!(report.latency_summaries().unwrap(), None);
    }

    #[test]
    fn test_summary_output() {
        let config = RunConfig::new(Scenario::OpenClosed(
            OpenClosedConfig::default().with_max_t(100.0),
        ));
        let report = config.execute(3).unwrap();
        let mut sink = CsvSink::new(Vec::new());
        report.write(&mut sink, true).unwrap();
        let out = String::from_utf8(sink.finish().unwrap()).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("name,count,mean,p50,p90,p99,p999,max"));
        assert!(lines.next().unwrap().starts_with("exp_open,"));
        assert_eq!(lines.next(), None);
    }
}
