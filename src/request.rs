//! Request and peer metadata model
//!
//! `RequestInfo` is the per-stream scratch state an external inspector keeps
//! up to date; the engine only reads it and drains its recurrent counters.
//! Node metadata arrives through the `MetadataSource` port so the engine can
//! be exercised without a live host.

use bitflags::bitflags;
use std::collections::HashMap;

/// Protocol of a proxied stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Unspecified,
    Tcp,
    Http,
    Grpc,
}

bitflags! {
    /// Protocol applicability mask carried by each metric definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtocolSet: u32 {
        const TCP = 0b001;
        const HTTP = 0b010;
        const GRPC = 0b100;
    }
}

impl Protocol {
    /// Label value for the `request_protocol` dimension.
    /// Unspecified maps to empty and is later filled with the unknown
    /// sentinel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Unspecified => "",
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Grpc => "grpc",
        }
    }

    /// The singleton mask for this protocol.
    pub fn as_set(&self) -> ProtocolSet {
        match self {
            Protocol::Unspecified => ProtocolSet::empty(),
            Protocol::Tcp => ProtocolSet::TCP,
            Protocol::Http => ProtocolSet::HTTP,
            Protocol::Grpc => ProtocolSet::GRPC,
        }
    }
}

/// Service authentication policy negotiated for the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPolicy {
    #[default]
    Unspecified,
    None,
    MutualTls,
}

impl AuthPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPolicy::Unspecified => "",
            AuthPolicy::None => "NONE",
            AuthPolicy::MutualTls => "MUTUAL_TLS",
        }
    }
}

/// Per-stream request state, owned by the stream and shared with the engine
/// while the stream is open.
///
/// The recurrent byte/message counters are drained by metric value
/// extractors on every flush, so between two flushes they hold deltas, not
/// totals.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Total request duration in nanoseconds.
    pub duration_ns: u64,
    /// Request total size in bytes, including header, body, and trailer.
    pub request_size: u64,
    /// Response total size in bytes, including header, body, and trailer.
    pub response_size: u64,
    pub request_protocol: Protocol,
    pub response_code: u32,
    /// gRPC status code; 2 (UNKNOWN) until the trailer is seen.
    pub grpc_status: u32,
    /// Response flags giving additional information - NR, UAEX etc.
    pub response_flags: String,
    /// Host name of the destination service.
    pub destination_service_host: String,
    /// Short name of the destination service.
    pub destination_service_name: String,
    pub source_principal: String,
    pub destination_principal: String,
    pub service_auth_policy: AuthPolicy,
    /// Connection id of the TCP connection, used to key pending streams.
    pub connection_id: u64,

    // gRPC streaming message counts with last-flushed watermarks.
    pub request_message_count: u64,
    pub last_request_message_count: u64,
    pub response_message_count: u64,
    pub last_response_message_count: u64,

    // TCP counters, reset to zero on every flush.
    pub tcp_sent_bytes: u64,
    pub tcp_received_bytes: u64,
    pub tcp_connections_opened: u64,
    pub tcp_connections_closed: u64,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            duration_ns: 0,
            request_size: 0,
            response_size: 0,
            request_protocol: Protocol::Unspecified,
            response_code: 0,
            grpc_status: 2,
            response_flags: String::new(),
            destination_service_host: String::new(),
            destination_service_name: String::new(),
            source_principal: String::new(),
            destination_principal: String::new(),
            service_auth_policy: AuthPolicy::Unspecified,
            connection_id: 0,
            request_message_count: 0,
            last_request_message_count: 0,
            response_message_count: 0,
            last_response_message_count: 0,
            tcp_sent_bytes: 0,
            tcp_received_bytes: 0,
            tcp_connections_opened: 0,
            tcp_connections_closed: 0,
        }
    }
}

/// Well-known node label keys.
pub const CANONICAL_SERVICE_LABEL: &str = "service.mesh/canonical-name";
pub const CANONICAL_REVISION_LABEL: &str = "service.mesh/canonical-revision";

/// Workload identity of one side of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub workload_name: String,
    pub namespace: String,
    pub cluster_id: String,
    /// Mesh control-plane version, recorded once on the build gauge.
    pub mesh_version: String,
    pub labels: HashMap<String, String>,
}

impl NodeInfo {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Outcome of a peer metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerInfo {
    /// Metadata exchange completed for this stream.
    Node(NodeInfo),
    /// Exchange may still complete; only meaningful for TCP streams.
    Pending,
    /// The peer never supplied metadata.
    NotFound,
}

impl PeerInfo {
    /// Node to map dimensions from, falling back to an empty identity.
    pub fn node(&self) -> NodeInfo {
        match self {
            PeerInfo::Node(node) => node.clone(),
            PeerInfo::Pending | PeerInfo::NotFound => NodeInfo::default(),
        }
    }
}

/// Host port handing out node metadata.
///
/// `peer` is consulted on every report; the upstream lookups only in host or
/// cluster metadata mode, where local identity is re-derived per request.
pub trait MetadataSource {
    /// This proxy instance's own workload identity.
    fn local_node(&self) -> NodeInfo;

    /// The remote peer of the given stream.
    fn peer(&self, info: &RequestInfo) -> PeerInfo;

    /// Identity of the upstream host selected for the request, if any.
    fn upstream_host_node(&self) -> Option<NodeInfo> {
        None
    }

    /// Identity attached to the upstream cluster, if any.
    fn upstream_cluster_node(&self) -> Option<NodeInfo> {
        None
    }
}
