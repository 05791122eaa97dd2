//! Configuration-time schema merging
//!
//! Seeds the built-in catalog, applies user `definitions` and `metrics`
//! overrides, and freezes the result into stat generators plus the custom
//! label slots reserved past the standard schema. Runs once per
//! configuration; nothing here is on the request path.

use crate::catalog::{self, MetricSpec, ValueExtractor};
use crate::config::StatsConfig;
use crate::dimensions::{StandardLabel, COUNT_STANDARD_LABELS};
use crate::expr::{ExpressionEval, ExpressionRegistry};
use crate::request::ProtocolSet;
use crate::sink::MetricKind;
use crate::stats::StatGen;
use std::collections::BTreeMap;
use tracing::warn;

/// Output of the merge: frozen generators and the expression bookkeeping
/// that determines the final vector length.
pub(crate) struct ResolvedSchema {
    pub stats: Vec<StatGen>,
    pub registry: ExpressionRegistry,
    pub vector_len: usize,
}

/// Merge the built-in catalog with user configuration.
///
/// Malformed entries are skipped with a warning; the rest of the
/// configuration is still applied.
pub(crate) fn resolve_schema(
    config: &StatsConfig,
    evaluator: &mut dyn ExpressionEval,
) -> ResolvedSchema {
    let mut registry = ExpressionRegistry::new();

    // Metric name -> definition, ordered tag list, and tag -> slot index.
    // An index of None means the tag stays in the schema but is omitted from
    // the projection.
    let mut factories: BTreeMap<String, MetricSpec> = BTreeMap::new();
    let mut metric_tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut metric_indexes: BTreeMap<String, BTreeMap<String, Option<usize>>> = BTreeMap::new();

    // Seed from the built-in catalog.
    for spec in catalog::default_metrics() {
        let tags: Vec<String> = StandardLabel::ALL[..spec.count_labels]
            .iter()
            .map(|label| label.name().to_string())
            .collect();
        let mut indexes = BTreeMap::new();
        for (i, tag) in tags.iter().enumerate() {
            indexes.insert(tag.clone(), Some(i));
        }
        factories.insert(spec.name.clone(), spec.clone());
        metric_tags.insert(spec.name.clone(), tags);
        metric_indexes.insert(spec.name.clone(), indexes);
    }

    // Apply custom metric definitions, replacing same-named built-ins.
    for definition in &config.definitions {
        if definition.name.is_empty() || definition.value.is_empty() {
            warn!("empty name or value in 'definitions'");
            continue;
        }
        let Some(token) = registry.add_int(evaluator, &definition.value) else {
            // Compile failure is already logged; this metric is absent from
            // the resolved set, everything else still applies.
            continue;
        };
        let entry = factories
            .entry(definition.name.clone())
            .or_insert_with(|| MetricSpec {
                name: definition.name.clone(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Expression(token),
                protocols: ProtocolSet::HTTP | ProtocolSet::GRPC,
                count_labels: 0,
                recurrent: false,
            });
        entry.kind = definition.metric_kind();
        entry.value = ValueExtractor::Expression(token);
        entry.protocols = ProtocolSet::HTTP | ProtocolSet::GRPC;
        entry.recurrent = false;
        metric_tags.entry(definition.name.clone()).or_default();
        metric_indexes.entry(definition.name.clone()).or_default();
    }

    // Apply per-metric overrides in array order. An empty name matches every
    // definition.
    for override_entry in &config.metrics {
        let names: Vec<String> = factories.keys().cloned().collect();
        for name in names {
            if !override_entry.name.is_empty() && override_entry.name != name {
                continue;
            }

            if override_entry.drop {
                factories.remove(&name);
                continue;
            }

            let indexes = metric_indexes.entry(name.clone()).or_default();

            for tag in &override_entry.tags_to_remove {
                if let Some(slot) = indexes.get_mut(tag) {
                    *slot = None;
                }
            }

            // Sorted iteration keeps custom slot assignment deterministic.
            for (tag, expression) in &override_entry.dimensions {
                let value = registry
                    .add_string(evaluator, expression)
                    .map(|position| COUNT_STANDARD_LABELS + position);
                if let Some(slot) = indexes.get_mut(tag) {
                    *slot = value;
                } else {
                    metric_tags.entry(name.clone()).or_default().push(tag.clone());
                    indexes.insert(tag.clone(), value);
                }
            }
        }
    }

    // Freeze: project each surviving definition's kept tags into a
    // generator.
    let vector_len = COUNT_STANDARD_LABELS + registry.string_count();
    let mut stats = Vec::with_capacity(factories.len());
    for (name, spec) in &factories {
        let mut labels = Vec::new();
        if let (Some(tags), Some(indexes)) = (metric_tags.get(name), metric_indexes.get(name)) {
            for tag in tags {
                if let Some(Some(index)) = indexes.get(tag) {
                    labels.push((tag.clone(), *index));
                }
            }
        }
        stats.push(StatGen::new(
            catalog::STAT_PREFIX,
            spec,
            labels,
            config.field_separator(),
            config.value_separator(),
        ));
    }

    ResolvedSchema {
        stats,
        registry,
        vector_len,
    }
}
