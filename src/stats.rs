//! Stat generation and resolved metric handles
//!
//! A `StatGen` binds one metric definition to its tag projection. Resolving
//! it against a dimension vector serializes the projected values into the
//! backend identity string and creates-or-fetches the handle; the returned
//! `ResolvedStat` is what the cache stores and what gets recorded on every
//! subsequent hit.

use crate::catalog::{MetricSpec, ValueExtractor};
use crate::dimensions::DimensionVector;
use crate::expr::ExpressionEval;
use crate::request::{Protocol, RequestInfo};
use crate::sink::{MetricId, MetricKind, MetricSink};
use tracing::trace;

/// A metric definition bound to a tag projection, ready to resolve against
/// dimension values.
pub struct StatGen {
    name: String,
    kind: MetricKind,
    recurrent: bool,
    protocols: crate::request::ProtocolSet,
    /// Kept tags: exported tag name and the vector slot it projects.
    /// Tags removed or overridden with a broken expression are absent here
    /// while their slots stay reserved in the schema.
    labels: Vec<(String, usize)>,
    value: ValueExtractor,
    field_separator: String,
    value_separator: String,
}

impl StatGen {
    pub fn new(
        prefix: &str,
        spec: &MetricSpec,
        labels: Vec<(String, usize)>,
        field_separator: &str,
        value_separator: &str,
    ) -> Self {
        Self {
            name: format!("{}{}", prefix, spec.name),
            kind: spec.kind,
            recurrent: spec.recurrent,
            protocols: spec.protocols,
            labels,
            value: spec.value,
            field_separator: field_separator.to_string(),
            value_separator: value_separator.to_string(),
        }
    }

    /// Prefixed metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recurrent(&self) -> bool {
        self.recurrent
    }

    /// Whether this metric applies to the given protocol. Independent of
    /// cache state.
    pub fn matches_protocol(&self, protocol: Protocol) -> bool {
        self.protocols.intersects(protocol.as_set())
    }

    /// Project the tag list through the vector into an identity string and
    /// create-or-fetch the backend handle for it.
    pub fn resolve(&self, vector: &DimensionVector, sink: &dyn MetricSink) -> ResolvedStat {
        let mut size = self.name.len();
        for (tag, index) in &self.labels {
            size += tag.len() + self.value_separator.len();
            size += vector.get(*index).len() + self.field_separator.len();
        }

        let mut full_name = String::with_capacity(size);
        for (tag, index) in &self.labels {
            full_name.push_str(tag);
            full_name.push_str(&self.value_separator);
            full_name.push_str(vector.get(*index));
            full_name.push_str(&self.field_separator);
        }
        full_name.push_str(&self.name);

        let metric_id = sink.resolve_full_name(self.kind, &full_name);
        ResolvedStat {
            metric_id,
            kind: self.kind,
            recurrent: self.recurrent,
            value: self.value,
        }
    }
}

/// A pre-resolved metric: backend handle plus the value capability.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedStat {
    metric_id: MetricId,
    kind: MetricKind,
    recurrent: bool,
    value: ValueExtractor,
}

impl ResolvedStat {
    pub fn metric_id(&self) -> MetricId {
        self.metric_id
    }

    pub fn recurrent(&self) -> bool {
        self.recurrent
    }

    /// Extract the value for this flush and record it.
    ///
    /// Zero-valued counter records are suppressed; a failed value-expression
    /// evaluation records nothing for counters and zero otherwise.
    pub fn record(
        &self,
        request: &mut RequestInfo,
        evaluator: &mut dyn ExpressionEval,
        sink: &dyn MetricSink,
    ) {
        let value = match self.value {
            ValueExtractor::Func(f) => f(request),
            ValueExtractor::Expression(token) => match evaluator.eval_int(token, request) {
                Ok(v) => v.max(0) as u64,
                Err(e) => {
                    trace!(error = %e, "failed to evaluate value expression");
                    0
                }
            },
        };
        match self.kind {
            MetricKind::Counter => {
                if value == 0 {
                    return;
                }
                sink.increment(self.metric_id, value);
            }
            MetricKind::Gauge | MetricKind::Histogram => sink.record(self.metric_id, value),
        }
    }
}
