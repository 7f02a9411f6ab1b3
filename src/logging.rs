//! Initializes the process-wide `tracing` subscriber, combined with a
//! `tracing-indicatif` layer so progress bars and log lines interleave
//! cleanly during concurrent downloads.

use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const ENV_VAR: &str = "AQTR_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn default_directive(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Verbose => "debug",
        }
    }
}

/// Sets up the global subscriber. Call once, at process start.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_env(ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directive()));

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}
