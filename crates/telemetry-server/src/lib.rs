//! Central telemetry server.
//!
//! Agents push gauge and counter updates over HTTP; the server validates
//! them, applies them to an in-memory [`store::MetricStore`], and makes the
//! store durable through a pluggable [`persistence::StorageBackend`]
//! (periodic JSON file snapshot or transactional database replace).

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod persistence;
pub mod store;
