//! Errors surfaced by the simulator and CLI.

use queuesim_models::ModelError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors loading a run description.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid run config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("runs must be at least 1")]
    NoRuns,
}

/// Anything that can stop a simulator invocation.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),

    #[error("latency histogram: {0}")]
    Histogram(String),
}
