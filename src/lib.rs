//! # meshstats
//!
//! The dimension-resolution and metric-caching engine behind a service-mesh
//! sidecar's stats extension.
//!
//! For every request or connection event the engine turns request and peer
//! metadata into an ordered vector of label values, resolves that vector --
//! at most once per unique combination -- into a set of bound
//! counter/gauge/histogram handles, and records values against them. The
//! same path runs on a periodic timer for long-lived TCP streams.
//!
//! ## Architecture
//!
//! - **Config resolution** ([`config`], `plugin::merge`): merges the
//!   built-in metric catalog with user overrides into a frozen label schema
//!   and stat-generator list, once per configuration
//! - **Request mapping** ([`dimensions`]): pure functions filling label
//!   slots from node metadata and per-request fields
//! - **Resolution cache** ([`plugin`]): memoizes dimension vectors to
//!   resolved metric handles so the backend sees each label combination
//!   exactly once
//! - **Host ports** ([`expr`], [`sink`], [`request::MetadataSource`]):
//!   expression evaluation, metric storage, and node metadata are injected
//!   interfaces, so the core runs and tests without a live host
//!
//! One engine instance serves one worker thread and holds no locks; the
//! host never interleaves callbacks within an instance.

pub mod catalog;
pub mod config;
pub mod dimensions;
pub mod expr;
pub mod plugin;
pub mod request;
pub mod sink;
pub mod stats;

mod error;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use plugin::{Direction, StatsPlugin};
