//! `shelfd`: a Statsd-compatible metrics aggregation server.
//!
//! Ingests Statsd lines over UDP and TCP ([`collector`]), folds them into a
//! single-owner [`shelf`] through the [`processor`], and flushes aggregated
//! snapshots on a fixed interval to one or more [`destination`]s. The
//! [`server`] module wires these together and owns startup, shutdown, and
//! reload.

pub mod collector;
pub mod config;
pub mod destination;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod metric;
pub mod privilege;
pub mod processor;
pub mod queue;
pub mod server;
pub mod shelf;
pub mod signals;

pub use error::{ShelfdError, ShelfdResult};
