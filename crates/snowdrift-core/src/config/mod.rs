//! Configuration fragments shared by snowdrift binaries.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use serde::{Deserialize, Serialize};

/// Metrics configuration for the Prometheus endpoint.
///
/// The endpoint is only served when an address is configured; a one-shot
/// run exits before anything could scrape it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP server (e.g. "0.0.0.0:9090").
    #[serde(default)]
    pub address: Option<String>,
}
