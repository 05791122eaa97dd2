//! Label schema and the per-request dimension vector
//!
//! The engine keeps one mutable `DimensionVector` per instance and rewrites
//! it on every report. The order of the standard labels is load-bearing:
//! metric definitions reference slots by index, and the per-metric label
//! cut-offs (`COUNT_PEER_LABELS`, `COUNT_TCP_LABELS`) are prefixes of this
//! order.

use crate::request::{NodeInfo, Protocol, RequestInfo};
use crate::request::{CANONICAL_REVISION_LABEL, CANONICAL_SERVICE_LABEL};
use std::ops::{Index, IndexMut};

/// Sentinel for a standard label that ended up empty.
pub const UNKNOWN: &str = "unknown";
/// Sentinel canonical revision when the workload does not declare one.
pub const LATEST: &str = "latest";
/// Reporter value for outbound instances.
pub const SOURCE: &str = "source";
/// Reporter value for inbound instances.
pub const DESTINATION: &str = "destination";

/// Built-in labels, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum StandardLabel {
    Reporter,
    SourceWorkload,
    SourceWorkloadNamespace,
    SourcePrincipal,
    SourceApp,
    SourceVersion,
    SourceCanonicalService,
    SourceCanonicalRevision,
    SourceCluster,
    DestinationWorkload,
    DestinationWorkloadNamespace,
    DestinationPrincipal,
    DestinationApp,
    DestinationVersion,
    DestinationService,
    DestinationServiceName,
    DestinationServiceNamespace,
    DestinationCanonicalService,
    DestinationCanonicalRevision,
    DestinationCluster,
    RequestProtocol,
    ResponseFlags,
    ConnectionSecurityPolicy,
    ResponseCode,
    GrpcResponseStatus,
}

/// Number of standard labels; custom labels are appended after these.
pub const COUNT_STANDARD_LABELS: usize = StandardLabel::GrpcResponseStatus as usize + 1;

/// Peer-identity prefix used by the gRPC streaming metrics.
pub const COUNT_PEER_LABELS: usize = StandardLabel::DestinationCluster as usize + 1;

/// Prefix used by the TCP metrics (peer identity plus connection labels).
pub const COUNT_TCP_LABELS: usize = StandardLabel::ConnectionSecurityPolicy as usize + 1;

impl StandardLabel {
    pub const ALL: [StandardLabel; COUNT_STANDARD_LABELS] = [
        StandardLabel::Reporter,
        StandardLabel::SourceWorkload,
        StandardLabel::SourceWorkloadNamespace,
        StandardLabel::SourcePrincipal,
        StandardLabel::SourceApp,
        StandardLabel::SourceVersion,
        StandardLabel::SourceCanonicalService,
        StandardLabel::SourceCanonicalRevision,
        StandardLabel::SourceCluster,
        StandardLabel::DestinationWorkload,
        StandardLabel::DestinationWorkloadNamespace,
        StandardLabel::DestinationPrincipal,
        StandardLabel::DestinationApp,
        StandardLabel::DestinationVersion,
        StandardLabel::DestinationService,
        StandardLabel::DestinationServiceName,
        StandardLabel::DestinationServiceNamespace,
        StandardLabel::DestinationCanonicalService,
        StandardLabel::DestinationCanonicalRevision,
        StandardLabel::DestinationCluster,
        StandardLabel::RequestProtocol,
        StandardLabel::ResponseFlags,
        StandardLabel::ConnectionSecurityPolicy,
        StandardLabel::ResponseCode,
        StandardLabel::GrpcResponseStatus,
    ];

    /// The exported label name.
    pub fn name(&self) -> &'static str {
        match self {
            StandardLabel::Reporter => "reporter",
            StandardLabel::SourceWorkload => "source_workload",
            StandardLabel::SourceWorkloadNamespace => "source_workload_namespace",
            StandardLabel::SourcePrincipal => "source_principal",
            StandardLabel::SourceApp => "source_app",
            StandardLabel::SourceVersion => "source_version",
            StandardLabel::SourceCanonicalService => "source_canonical_service",
            StandardLabel::SourceCanonicalRevision => "source_canonical_revision",
            StandardLabel::SourceCluster => "source_cluster",
            StandardLabel::DestinationWorkload => "destination_workload",
            StandardLabel::DestinationWorkloadNamespace => "destination_workload_namespace",
            StandardLabel::DestinationPrincipal => "destination_principal",
            StandardLabel::DestinationApp => "destination_app",
            StandardLabel::DestinationVersion => "destination_version",
            StandardLabel::DestinationService => "destination_service",
            StandardLabel::DestinationServiceName => "destination_service_name",
            StandardLabel::DestinationServiceNamespace => "destination_service_namespace",
            StandardLabel::DestinationCanonicalService => "destination_canonical_service",
            StandardLabel::DestinationCanonicalRevision => "destination_canonical_revision",
            StandardLabel::DestinationCluster => "destination_cluster",
            StandardLabel::RequestProtocol => "request_protocol",
            StandardLabel::ResponseFlags => "response_flags",
            StandardLabel::ConnectionSecurityPolicy => "connection_security_policy",
            StandardLabel::ResponseCode => "response_code",
            StandardLabel::GrpcResponseStatus => "grpc_response_status",
        }
    }
}

/// Ordered label values; the mutable per-request scratch buffer and, once
/// cloned, the cache key.
///
/// Length is fixed at standard-label count plus the number of registered
/// custom expressions and never changes for the life of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DimensionVector {
    values: Vec<String>,
}

impl DimensionVector {
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![String::new(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overwrite one slot, reusing the slot's allocation when possible.
    pub fn set(&mut self, index: usize, value: &str) {
        let slot = &mut self.values[index];
        slot.clear();
        slot.push_str(value);
    }

    pub fn get(&self, index: usize) -> &str {
        &self.values[index]
    }
}

impl Index<usize> for DimensionVector {
    type Output = String;

    fn index(&self, index: usize) -> &String {
        &self.values[index]
    }
}

impl IndexMut<usize> for DimensionVector {
    fn index_mut(&mut self, index: usize) -> &mut String {
        &mut self.values[index]
    }
}

impl Index<StandardLabel> for DimensionVector {
    type Output = String;

    fn index(&self, label: StandardLabel) -> &String {
        &self.values[label as usize]
    }
}

impl IndexMut<StandardLabel> for DimensionVector {
    fn index_mut(&mut self, label: StandardLabel) -> &mut String {
        &mut self.values[label as usize]
    }
}

/// Fill one side's workload identity labels from node metadata.
///
/// Every slot of that side is always written so no value from a previous
/// peer survives. Canonical service falls back to the workload name,
/// canonical revision to the "latest" sentinel.
pub fn map_node(vector: &mut DimensionVector, is_source: bool, node: &NodeInfo) {
    use StandardLabel::*;

    let app = node.label("app").unwrap_or("");
    let version = node.label("version").unwrap_or("");
    let canonical_service = node
        .label(CANONICAL_SERVICE_LABEL)
        .unwrap_or(&node.workload_name);
    let canonical_revision = node.label(CANONICAL_REVISION_LABEL).unwrap_or(LATEST);

    if is_source {
        vector.set(SourceWorkload as usize, &node.workload_name);
        vector.set(SourceWorkloadNamespace as usize, &node.namespace);
        vector.set(SourceCluster as usize, &node.cluster_id);
        vector.set(SourceApp as usize, app);
        vector.set(SourceVersion as usize, version);
        vector.set(SourceCanonicalService as usize, canonical_service);
        vector.set(SourceCanonicalRevision as usize, canonical_revision);
    } else {
        vector.set(DestinationWorkload as usize, &node.workload_name);
        vector.set(DestinationWorkloadNamespace as usize, &node.namespace);
        vector.set(DestinationCluster as usize, &node.cluster_id);
        vector.set(DestinationApp as usize, app);
        vector.set(DestinationVersion as usize, version);
        vector.set(DestinationCanonicalService as usize, canonical_service);
        vector.set(DestinationCanonicalRevision as usize, canonical_revision);
        vector.set(DestinationServiceNamespace as usize, &node.namespace);
    }
}

/// Fill the request-derived labels. Local and peer identity labels are
/// expected to be in place already.
pub fn map_request(vector: &mut DimensionVector, request: &RequestInfo) {
    use StandardLabel::*;

    vector.set(SourcePrincipal as usize, &request.source_principal);
    vector.set(DestinationPrincipal as usize, &request.destination_principal);
    vector.set(DestinationService as usize, &request.destination_service_host);
    vector.set(
        DestinationServiceName as usize,
        &request.destination_service_name,
    );
    vector.set(RequestProtocol as usize, request.request_protocol.as_str());
    vector.set(ResponseCode as usize, &request.response_code.to_string());
    vector.set(ResponseFlags as usize, &request.response_flags);
    vector.set(
        ConnectionSecurityPolicy as usize,
        &request.service_auth_policy.as_str().to_ascii_lowercase(),
    );
}

/// Final pass: any standard slot still empty gets the unknown sentinel, so
/// no empty-string label is ever exported. Idempotent.
pub fn map_unknown_if_empty(vector: &mut DimensionVector) {
    for label in StandardLabel::ALL {
        if vector[label].is_empty() {
            vector.set(label as usize, UNKNOWN);
        }
    }
}

/// Map peer node and request into the vector.
///
/// The peer side is the destination for outbound instances and the source
/// for inbound ones. The gRPC status slot is only populated for gRPC
/// requests; for everything else it is cleared so HTTP and TCP traffic never
/// carries a stale status.
pub fn map(
    vector: &mut DimensionVector,
    outbound: bool,
    peer_node: &NodeInfo,
    request: &RequestInfo,
) {
    map_node(vector, !outbound, peer_node);
    map_request(vector, request);
    map_unknown_if_empty(vector);
    if request.request_protocol == Protocol::Grpc {
        vector.set(
            StandardLabel::GrpcResponseStatus as usize,
            &request.grpc_status.to_string(),
        );
    } else {
        vector.set(StandardLabel::GrpcResponseStatus as usize, "");
    }
}
