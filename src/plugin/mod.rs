//! The stats engine root
//!
//! One `StatsPlugin` instance serves one worker thread: it owns the scratch
//! dimension vector, the resolved-stat cache, and the pending-stream
//! registry, and is driven entirely by host callbacks (`configure`,
//! `report`, `on_tick`, `on_done`). Nothing here is thread-safe by design;
//! parallel workers each get their own instance and never share state.

mod merge;

use crate::config::{MetadataMode, StatsConfig, DEFAULT_FIELD_SEPARATOR, DEFAULT_VALUE_SEPARATOR};
use crate::catalog::STAT_PREFIX;
use crate::dimensions::{
    self, DimensionVector, StandardLabel, COUNT_STANDARD_LABELS, DESTINATION, SOURCE, UNKNOWN,
};
use crate::expr::{ExpressionEval, ExpressionRegistry};
use crate::request::{MetadataSource, PeerInfo, Protocol, RequestInfo};
use crate::sink::{joined_name, MetricId, MetricKind, MetricSink};
use crate::stats::{ResolvedStat, StatGen};
use crate::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Cache hits are flushed to the backend in batches to keep the hot path
/// cheap.
const CACHE_HITS_FLUSH_BATCH: u64 = 100;

/// Traffic direction this instance reports for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// The dimension-resolution and metric-caching engine.
///
/// Holds no locks: the host guarantees `report`, `on_tick`, and stream
/// callbacks never interleave within one instance.
pub struct StatsPlugin {
    direction: Direction,
    metadata: Arc<dyn MetadataSource>,
    evaluator: Box<dyn ExpressionEval>,
    sink: Arc<dyn MetricSink>,

    use_host_header_fallback: bool,
    metadata_mode: MetadataMode,
    tick_period: Duration,

    /// The single mutable scratch buffer, rewritten on every report.
    scratch: DimensionVector,
    registry: ExpressionRegistry,
    stats: Vec<StatGen>,

    /// Resolved dimensions to their recordable metric set. Keys are owned
    /// copies of the scratch buffer; entries are never evicted or mutated.
    cache: HashMap<DimensionVector, Vec<ResolvedStat>>,

    /// Open streams still subject to periodic reporting.
    pending: HashMap<u64, Rc<RefCell<RequestInfo>>>,

    cache_hits: MetricId,
    cache_misses: MetricId,
    cache_hits_accumulator: u64,

    initialized: bool,
}

impl StatsPlugin {
    pub fn new(
        direction: Direction,
        metadata: Arc<dyn MetadataSource>,
        evaluator: Box<dyn ExpressionEval>,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        let hits = joined_name(
            "metric_cache_count",
            &[("filter", "stats"), ("cache", "hit")],
            DEFAULT_FIELD_SEPARATOR,
            DEFAULT_VALUE_SEPARATOR,
        );
        let misses = joined_name(
            "metric_cache_count",
            &[("filter", "stats"), ("cache", "miss")],
            DEFAULT_FIELD_SEPARATOR,
            DEFAULT_VALUE_SEPARATOR,
        );
        let cache_hits = sink.resolve_full_name(MetricKind::Counter, &hits);
        let cache_misses = sink.resolve_full_name(MetricKind::Counter, &misses);

        Self {
            direction,
            metadata,
            evaluator,
            sink,
            use_host_header_fallback: true,
            metadata_mode: MetadataMode::Local,
            tick_period: crate::config::DEFAULT_TCP_REPORT_INTERVAL,
            scratch: DimensionVector::default(),
            registry: ExpressionRegistry::new(),
            stats: Vec::new(),
            cache: HashMap::new(),
            pending: HashMap::new(),
            cache_hits,
            cache_misses,
            cache_hits_accumulator: 0,
            initialized: false,
        }
    }

    /// Apply a configuration. Fails only on unparseable JSON, leaving the
    /// plugin uninitialized so every later `report` is a no-op.
    pub fn configure(&mut self, configuration: &str) -> Result<()> {
        self.initialized = false;
        let config = StatsConfig::from_json(configuration).map_err(|e| {
            warn!(error = %e, "cannot parse plugin configuration JSON string");
            e
        })?;

        // Drop state from any previous configuration.
        self.registry.release_all(self.evaluator.as_mut());
        self.cache.clear();
        self.cache_hits_accumulator = 0;

        self.use_host_header_fallback = !config.disable_host_header_fallback;
        self.metadata_mode = config.metadata_mode();
        self.tick_period = config.tcp_report_interval();

        let schema = merge::resolve_schema(&config, self.evaluator.as_mut());
        self.stats = schema.stats;
        self.registry = schema.registry;
        self.scratch = DimensionVector::new(schema.vector_len);

        // Local identity does not change, so populate it on config load.
        let outbound = self.direction == Direction::Outbound;
        self.scratch.set(
            StandardLabel::Reporter as usize,
            if outbound { SOURCE } else { DESTINATION },
        );
        let local = self.metadata.local_node();
        dimensions::map_node(&mut self.scratch, outbound, &local);

        // One-shot build info gauge with static component/version labels.
        let version = if local.mesh_version.is_empty() {
            UNKNOWN
        } else {
            local.mesh_version.as_str()
        };
        let build_name = joined_name(
            &format!("{}build", STAT_PREFIX),
            &[("component", "proxy"), ("tag", version)],
            config.field_separator(),
            config.value_separator(),
        );
        let build = self.sink.resolve_full_name(MetricKind::Gauge, &build_name);
        self.sink.record(build, 1);

        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Tick period the host scheduler should use, fixed at configure time.
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn use_host_header_fallback(&self) -> bool {
        self.use_host_header_fallback
    }

    /// Number of distinct label combinations resolved so far.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn pending_streams(&self) -> usize {
        self.pending.len()
    }

    /// Resolve dimensions for the request and record all applicable
    /// metrics. `end_stream` selects between a final flush (everything
    /// records) and a mid-stream flush (recurrent metrics only).
    pub fn report(&mut self, request: &mut RequestInfo, end_stream: bool) {
        if !self.initialized {
            trace!("stats plugin not initialized properly (bad json config?)");
            return;
        }

        let peer = self.metadata.peer(request);
        if request.request_protocol == Protocol::Tcp {
            // Wait for metadata exchange before reporting anything for this
            // stream, unless the stream is already over.
            if peer == PeerInfo::Pending && !end_stream {
                return;
            }
        }

        // Waypoint modes serve many workloads: the local half of the
        // identity must be re-derived per request instead of using the
        // static configure-time value.
        if self.direction == Direction::Inbound {
            match self.metadata_mode {
                MetadataMode::Local => {}
                MetadataMode::Host => {
                    let node = self.metadata.upstream_host_node().unwrap_or_default();
                    dimensions::map_node(&mut self.scratch, false, &node);
                }
                MetadataMode::Cluster => {
                    let node = self.metadata.upstream_cluster_node().unwrap_or_default();
                    dimensions::map_node(&mut self.scratch, false, &node);
                }
            }
        }

        let outbound = self.direction == Direction::Outbound;
        let peer_node = peer.node();
        dimensions::map(&mut self.scratch, outbound, &peer_node, request);

        // Custom label slots come from registered expressions; a failed
        // evaluation degrades that one slot to the unknown sentinel.
        for (i, expression) in self.registry.strings().iter().enumerate() {
            let slot = COUNT_STANDARD_LABELS + i;
            match self.evaluator.eval_string(expression.token, request) {
                Ok(value) => self.scratch.set(slot, &value),
                Err(e) => {
                    trace!(
                        expression = expression.source.as_str(),
                        error = %e,
                        "failed to evaluate expression"
                    );
                    self.scratch.set(slot, UNKNOWN);
                }
            }
        }

        if let Some(stats) = self.cache.get(&self.scratch) {
            for stat in stats {
                if end_stream || stat.recurrent() {
                    stat.record(request, self.evaluator.as_mut(), self.sink.as_ref());
                }
                debug!(metric_id = stat.metric_id().0, "metric key cache hit");
            }
            self.cache_hits_accumulator += 1;
            if self.cache_hits_accumulator == CACHE_HITS_FLUSH_BATCH {
                self.sink
                    .increment(self.cache_hits, self.cache_hits_accumulator);
                self.cache_hits_accumulator = 0;
            }
            return;
        }

        let mut resolved = Vec::new();
        for gen in &self.stats {
            if !gen.matches_protocol(request.request_protocol) {
                continue;
            }
            let stat = gen.resolve(&self.scratch, self.sink.as_ref());
            debug!(
                metric = gen.name(),
                metric_id = stat.metric_id().0,
                recurrent = stat.recurrent(),
                "metric key cache miss"
            );
            if end_stream || stat.recurrent() {
                stat.record(request, self.evaluator.as_mut(), self.sink.as_ref());
            }
            resolved.push(stat);
        }
        self.sink.increment(self.cache_misses, 1);
        // The scratch buffer keeps mutating on later requests; the stored
        // key must be an owned copy.
        self.cache.insert(self.scratch.clone(), resolved);
    }

    /// Register an open stream for periodic reporting.
    pub fn register_stream(&mut self, id: u64, request: Rc<RefCell<RequestInfo>>) {
        self.pending.insert(id, request);
    }

    pub fn unregister_stream(&mut self, id: u64) -> Option<Rc<RefCell<RequestInfo>>> {
        self.pending.remove(&id)
    }

    /// New TCP connection: mark it, count it, and enqueue it for ticks.
    pub fn open_tcp_stream(&mut self, id: u64, request: Rc<RefCell<RequestInfo>>) {
        {
            let mut info = request.borrow_mut();
            info.request_protocol = Protocol::Tcp;
            info.connection_id = id;
            info.tcp_connections_opened += 1;
        }
        self.register_stream(id, request);
    }

    /// Final data callback for both HTTP and TCP streams.
    pub fn close_stream(&mut self, id: u64, request: &mut RequestInfo) {
        self.unregister_stream(id);
        if request.request_protocol == Protocol::Tcp {
            request.tcp_connections_closed += 1;
        }
        self.report(request, true);
    }

    /// Periodic flush of still-open streams; recurrent metrics only.
    pub fn on_tick(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let entries: Vec<Rc<RefCell<RequestInfo>>> = self.pending.values().cloned().collect();
        for entry in entries {
            self.report(&mut entry.borrow_mut(), false);
        }
    }

    /// Teardown: release expressions and abandon any leaked streams.
    pub fn on_done(&mut self) {
        self.registry.release_all(self.evaluator.as_mut());
        if !self.pending.is_empty() {
            error!(
                streams = self.pending.len(),
                "request queue is not empty at shutdown, dropping requests"
            );
            self.pending.clear();
        }
    }
}
