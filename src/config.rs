//! Plugin configuration model
//!
//! The configuration is consumed once. Only a JSON parse failure is fatal;
//! semantically malformed entries are skipped with a warning while the rest
//! of the configuration is applied.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_FIELD_SEPARATOR: &str = ";.;";
pub const DEFAULT_VALUE_SEPARATOR: &str = "=.=";

/// Default period for mid-stream TCP reporting.
pub const DEFAULT_TCP_REPORT_INTERVAL: Duration = Duration::from_millis(15_000);

/// Where local workload identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataMode {
    /// Static local node metadata, resolved once at configure time.
    #[default]
    Local,
    /// Waypoint mode: re-derive local identity per request from the
    /// metadata of the upstream host selected for the request.
    Host,
    /// Waypoint mode: re-derive local identity per request from upstream
    /// cluster metadata.
    Cluster,
}

/// A user-supplied custom metric definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricDefinition {
    pub name: String,
    /// Integer-valued expression producing the metric value per request.
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl MetricDefinition {
    pub fn metric_kind(&self) -> crate::sink::MetricKind {
        match self.kind.as_str() {
            "GAUGE" => crate::sink::MetricKind::Gauge,
            "HISTOGRAM" => crate::sink::MetricKind::Histogram,
            _ => crate::sink::MetricKind::Counter,
        }
    }
}

/// An override applied to one metric, or to all when `name` is empty.
///
/// `dimensions` is a BTreeMap so tag overrides are applied in sorted order
/// and custom label slot assignment is deterministic across reloads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricOverride {
    pub name: String,
    pub drop: bool,
    pub tags_to_remove: Vec<String>,
    pub dimensions: BTreeMap<String, String>,
}

/// Top-level stats plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub definitions: Vec<MetricDefinition>,
    pub metrics: Vec<MetricOverride>,
    pub field_separator: Option<String>,
    pub value_separator: Option<String>,
    pub disable_host_header_fallback: bool,
    pub metadata_mode: String,
    /// Duration string, e.g. "15s" or "500ms".
    pub tcp_reporting_duration: Option<String>,
}

impl StatsConfig {
    /// Parse the configuration JSON. This is the only fatal failure point.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(Error::Json)
    }

    pub fn field_separator(&self) -> &str {
        self.field_separator
            .as_deref()
            .unwrap_or(DEFAULT_FIELD_SEPARATOR)
    }

    pub fn value_separator(&self) -> &str {
        self.value_separator
            .as_deref()
            .unwrap_or(DEFAULT_VALUE_SEPARATOR)
    }

    /// Parsed metadata mode; unrecognized values fall back to local.
    pub fn metadata_mode(&self) -> MetadataMode {
        match self.metadata_mode.as_str() {
            "" | "local" => MetadataMode::Local,
            "host" => MetadataMode::Host,
            "cluster" => MetadataMode::Cluster,
            other => {
                warn!(mode = other, "unrecognized 'metadata_mode', using local");
                MetadataMode::Local
            }
        }
    }

    /// Parsed TCP reporting period; a bad duration string keeps the default.
    pub fn tcp_report_interval(&self) -> Duration {
        match &self.tcp_reporting_duration {
            None => DEFAULT_TCP_REPORT_INTERVAL,
            Some(text) => match humantime::parse_duration(text) {
                Ok(duration) => duration,
                Err(e) => {
                    warn!(
                        duration = text.as_str(),
                        error = %e,
                        "failed to parse 'tcp_reporting_duration'"
                    );
                    DEFAULT_TCP_REPORT_INTERVAL
                }
            },
        }
    }
}
