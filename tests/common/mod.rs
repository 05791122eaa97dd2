//! Shared fakes and builders for integration tests
#![allow(dead_code)]

use meshstats::expr::{ExprToken, ExpressionEval};
use meshstats::request::{
    AuthPolicy, MetadataSource, NodeInfo, PeerInfo, Protocol, RequestInfo,
};
use meshstats::sink::{MemorySink, MetricSink};
use meshstats::{Direction, Error, Result, StatsPlugin};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

/// Expression evaluator stub. Compiles any source not containing `((`;
/// string expressions evaluate to configured values (default: the source
/// text), int expressions to configured values (default: the source parsed
/// as an integer, else zero).
#[derive(Default)]
pub struct FakeEvalState {
    pub sources: Vec<String>,
    pub string_results: HashMap<String, String>,
    pub failing_strings: HashSet<String>,
    pub int_results: HashMap<String, i64>,
    pub released: Vec<ExprToken>,
}

#[derive(Default, Clone)]
pub struct FakeEval {
    state: Rc<RefCell<FakeEvalState>>,
}

impl FakeEval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&self, source: &str, value: &str) {
        self.state
            .borrow_mut()
            .string_results
            .insert(source.to_string(), value.to_string());
    }

    pub fn fail_string(&self, source: &str) {
        self.state
            .borrow_mut()
            .failing_strings
            .insert(source.to_string());
    }

    pub fn set_int(&self, source: &str, value: i64) {
        self.state
            .borrow_mut()
            .int_results
            .insert(source.to_string(), value);
    }

    pub fn released_count(&self) -> usize {
        self.state.borrow().released.len()
    }

    fn source_of(&self, token: ExprToken) -> Option<String> {
        self.state.borrow().sources.get(token.0 as usize).cloned()
    }
}

impl ExpressionEval for FakeEval {
    fn compile(&mut self, source: &str) -> Result<ExprToken> {
        if source.contains("((") {
            return Err(Error::Expression(format!("cannot compile: {}", source)));
        }
        let mut state = self.state.borrow_mut();
        state.sources.push(source.to_string());
        Ok(ExprToken(state.sources.len() as u32 - 1))
    }

    fn eval_string(&mut self, token: ExprToken, _request: &RequestInfo) -> Result<String> {
        let source = self
            .source_of(token)
            .ok_or_else(|| Error::Expression("unknown token".to_string()))?;
        let state = self.state.borrow();
        if state.failing_strings.contains(&source) {
            return Err(Error::Expression(format!("evaluation failed: {}", source)));
        }
        Ok(state.string_results.get(&source).cloned().unwrap_or(source))
    }

    fn eval_int(&mut self, token: ExprToken, _request: &RequestInfo) -> Result<i64> {
        let source = self
            .source_of(token)
            .ok_or_else(|| Error::Expression("unknown token".to_string()))?;
        let state = self.state.borrow();
        if let Some(value) = state.int_results.get(&source) {
            return Ok(*value);
        }
        Ok(source.parse().unwrap_or(0))
    }

    fn release(&mut self, token: ExprToken) {
        self.state.borrow_mut().released.push(token);
    }
}

/// Metadata source with a fixed local node and per-connection peers.
#[derive(Default)]
pub struct FakeMetadata {
    pub local: NodeInfo,
    pub peers: HashMap<u64, PeerInfo>,
    pub default_peer: Option<PeerInfo>,
    pub upstream_host: Option<NodeInfo>,
    pub upstream_cluster: Option<NodeInfo>,
}

impl MetadataSource for FakeMetadata {
    fn local_node(&self) -> NodeInfo {
        self.local.clone()
    }

    fn peer(&self, info: &RequestInfo) -> PeerInfo {
        self.peers
            .get(&info.connection_id)
            .cloned()
            .or_else(|| self.default_peer.clone())
            .unwrap_or(PeerInfo::NotFound)
    }

    fn upstream_host_node(&self) -> Option<NodeInfo> {
        self.upstream_host.clone()
    }

    fn upstream_cluster_node(&self) -> Option<NodeInfo> {
        self.upstream_cluster.clone()
    }
}

/// Mutable-peer variant: lets a test flip a stream's peer from pending to
/// resolved mid-test, the way TCP metadata exchange completes.
#[derive(Default, Clone)]
pub struct SharedMetadata {
    inner: Rc<RefCell<FakeMetadata>>,
}

impl SharedMetadata {
    pub fn new(metadata: FakeMetadata) -> Self {
        Self {
            inner: Rc::new(RefCell::new(metadata)),
        }
    }

    pub fn set_peer(&self, connection_id: u64, peer: PeerInfo) {
        self.inner.borrow_mut().peers.insert(connection_id, peer);
    }
}

impl MetadataSource for SharedMetadata {
    fn local_node(&self) -> NodeInfo {
        self.inner.borrow().local_node()
    }

    fn peer(&self, info: &RequestInfo) -> PeerInfo {
        self.inner.borrow().peer(info)
    }

    fn upstream_host_node(&self) -> Option<NodeInfo> {
        self.inner.borrow().upstream_host_node()
    }

    fn upstream_cluster_node(&self) -> Option<NodeInfo> {
        self.inner.borrow().upstream_cluster_node()
    }
}

pub fn node(workload: &str, namespace: &str, labels: &[(&str, &str)]) -> NodeInfo {
    NodeInfo {
        workload_name: workload.to_string(),
        namespace: namespace.to_string(),
        cluster_id: "cluster-1".to_string(),
        mesh_version: "1.20.0".to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

/// Outbound plugin with a resolved default peer.
pub fn outbound_plugin() -> (StatsPlugin, Arc<MemorySink>, FakeEval) {
    let metadata = FakeMetadata {
        local: node("frontend", "shop", &[("app", "frontend"), ("version", "v1")]),
        default_peer: Some(PeerInfo::Node(node(
            "backend",
            "shop",
            &[("app", "backend"), ("version", "v2")],
        ))),
        ..Default::default()
    };
    plugin_with(Direction::Outbound, metadata)
}

pub fn plugin_with(
    direction: Direction,
    metadata: FakeMetadata,
) -> (StatsPlugin, Arc<MemorySink>, FakeEval) {
    let sink = Arc::new(MemorySink::new());
    let eval = FakeEval::new();
    let plugin = StatsPlugin::new(
        direction,
        Arc::new(metadata),
        Box::new(eval.clone()),
        sink.clone() as Arc<dyn MetricSink>,
    );
    (plugin, sink, eval)
}

pub fn http_request() -> RequestInfo {
    RequestInfo {
        request_protocol: Protocol::Http,
        response_code: 200,
        duration_ns: 5_000_000,
        request_size: 128,
        response_size: 512,
        destination_service_host: "backend.shop.svc.cluster.local".to_string(),
        destination_service_name: "backend".to_string(),
        service_auth_policy: AuthPolicy::MutualTls,
        ..Default::default()
    }
}

pub fn grpc_request() -> RequestInfo {
    RequestInfo {
        request_protocol: Protocol::Grpc,
        grpc_status: 0,
        ..http_request()
    }
}

/// The single full name matching the fragment; fails if none or many.
pub fn only_name(sink: &MemorySink, fragment: &str) -> String {
    let names = sink.find_names(fragment);
    assert_eq!(
        names.len(),
        1,
        "expected exactly one metric matching {:?}, got {:?}",
        fragment,
        names
    );
    names.into_iter().next().unwrap()
}
