//! Built-in metric catalog
//!
//! The default metric definitions and the value extractors backing them.
//! Extractors take the request info mutably: recurrent metrics drain or
//! watermark their counters on every flush so mid-stream reports emit
//! deltas rather than running totals.

use crate::dimensions::{COUNT_PEER_LABELS, COUNT_STANDARD_LABELS, COUNT_TCP_LABELS};
use crate::expr::ExprToken;
use crate::request::{ProtocolSet, RequestInfo};
use crate::sink::MetricKind;
use std::sync::OnceLock;

/// Prefix prepended to every exported metric name.
pub const STAT_PREFIX: &str = "mesh_";

/// Produces the value to record for one report.
#[derive(Debug, Clone, Copy)]
pub enum ValueExtractor {
    /// Built-in extractor reading (and possibly draining) request state.
    Func(fn(&mut RequestInfo) -> u64),
    /// User-defined integer expression, evaluated by the host.
    Expression(ExprToken),
}

/// A metric definition before tag projection: what to record and when.
#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub name: String,
    pub kind: MetricKind,
    pub value: ValueExtractor,
    pub protocols: ProtocolSet,
    /// How many leading standard labels this metric carries by default.
    pub count_labels: usize,
    /// Recorded on every flush, including mid-stream ticks.
    pub recurrent: bool,
}

fn one(_: &mut RequestInfo) -> u64 {
    1
}

fn duration_millis(info: &mut RequestInfo) -> u64 {
    info.duration_ns / 1_000_000
}

fn request_bytes(info: &mut RequestInfo) -> u64 {
    info.request_size
}

fn response_bytes(info: &mut RequestInfo) -> u64 {
    info.response_size
}

fn request_messages_delta(info: &mut RequestInfo) -> u64 {
    let out = info
        .request_message_count
        .saturating_sub(info.last_request_message_count);
    info.last_request_message_count = info.request_message_count;
    out
}

fn response_messages_delta(info: &mut RequestInfo) -> u64 {
    let out = info
        .response_message_count
        .saturating_sub(info.last_response_message_count);
    info.last_response_message_count = info.response_message_count;
    out
}

fn take_tcp_sent(info: &mut RequestInfo) -> u64 {
    std::mem::take(&mut info.tcp_sent_bytes)
}

fn take_tcp_received(info: &mut RequestInfo) -> u64 {
    std::mem::take(&mut info.tcp_received_bytes)
}

fn take_tcp_opened(info: &mut RequestInfo) -> u64 {
    std::mem::take(&mut info.tcp_connections_opened)
}

fn tcp_closed(info: &mut RequestInfo) -> u64 {
    info.tcp_connections_closed
}

/// The default metric set, built once at first use.
pub fn default_metrics() -> &'static [MetricSpec] {
    static CATALOG: OnceLock<Vec<MetricSpec>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let http_grpc = ProtocolSet::HTTP | ProtocolSet::GRPC;
        vec![
            // HTTP, HTTP/2, and gRPC request metrics.
            MetricSpec {
                name: "requests_total".to_string(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Func(one),
                protocols: http_grpc,
                count_labels: COUNT_STANDARD_LABELS,
                recurrent: false,
            },
            MetricSpec {
                name: "request_duration_milliseconds".to_string(),
                kind: MetricKind::Histogram,
                value: ValueExtractor::Func(duration_millis),
                protocols: http_grpc,
                count_labels: COUNT_STANDARD_LABELS,
                recurrent: false,
            },
            MetricSpec {
                name: "request_bytes".to_string(),
                kind: MetricKind::Histogram,
                value: ValueExtractor::Func(request_bytes),
                protocols: http_grpc,
                count_labels: COUNT_STANDARD_LABELS,
                recurrent: false,
            },
            MetricSpec {
                name: "response_bytes".to_string(),
                kind: MetricKind::Histogram,
                value: ValueExtractor::Func(response_bytes),
                protocols: http_grpc,
                count_labels: COUNT_STANDARD_LABELS,
                recurrent: false,
            },
            // gRPC streaming metrics, dimensioned by peer labels only.
            MetricSpec {
                name: "request_messages_total".to_string(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Func(request_messages_delta),
                protocols: ProtocolSet::GRPC,
                count_labels: COUNT_PEER_LABELS,
                recurrent: true,
            },
            MetricSpec {
                name: "response_messages_total".to_string(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Func(response_messages_delta),
                protocols: ProtocolSet::GRPC,
                count_labels: COUNT_PEER_LABELS,
                recurrent: true,
            },
            // TCP metrics.
            MetricSpec {
                name: "tcp_sent_bytes_total".to_string(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Func(take_tcp_sent),
                protocols: ProtocolSet::TCP,
                count_labels: COUNT_TCP_LABELS,
                recurrent: true,
            },
            MetricSpec {
                name: "tcp_received_bytes_total".to_string(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Func(take_tcp_received),
                protocols: ProtocolSet::TCP,
                count_labels: COUNT_TCP_LABELS,
                recurrent: true,
            },
            MetricSpec {
                name: "tcp_connections_opened_total".to_string(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Func(take_tcp_opened),
                protocols: ProtocolSet::TCP,
                count_labels: COUNT_TCP_LABELS,
                recurrent: true,
            },
            MetricSpec {
                name: "tcp_connections_closed_total".to_string(),
                kind: MetricKind::Counter,
                value: ValueExtractor::Func(tcp_closed),
                protocols: ProtocolSet::TCP,
                count_labels: COUNT_TCP_LABELS,
                recurrent: false,
            },
        ]
    })
}
