//! Shared fakes for unit tests
//!
//! `FakeEval` compiles anything that does not contain `((` and evaluates
//! expressions from configured lookup tables, defaulting to echoing the
//! source text (strings) or parsing it as an integer (values).

use crate::expr::{ExprToken, ExpressionEval};
use crate::request::{MetadataSource, NodeInfo, PeerInfo, RequestInfo};
use crate::{Error, Result};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Default)]
pub(crate) struct FakeEvalState {
    pub sources: Vec<String>,
    pub string_results: HashMap<String, String>,
    pub failing_strings: HashSet<String>,
    pub int_results: HashMap<String, i64>,
    pub released: Vec<ExprToken>,
}

#[derive(Default, Clone)]
pub(crate) struct FakeEval {
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
        Ok(state
            .string_results
            .get(&source)
            .cloned()
            .unwrap_or(source))
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

/// Metadata source with fixed local identity and per-connection peers.
#[derive(Default)]
pub(crate) struct FakeMetadata {
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

pub(crate) fn node(workload: &str, namespace: &str, labels: &[(&str, &str)]) -> NodeInfo {
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
