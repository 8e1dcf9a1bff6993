//! Shared wire types for the telemetry pipeline.
//!
//! The agent and the server both speak the same JSON schema for metric
//! updates, carry gzip-compressed request bodies, and may attach an
//! HMAC-SHA256 signature over the uncompressed payload. This crate holds
//! those three concerns so neither binary re-declares them:
//!
//! - [`MetricPayload`] / [`MetricKind`] / [`MetricValue`]: the wire schema
//! - [`codec`]: gzip helpers for request bodies
//! - [`signing`]: `HashSHA256` header computation and verification

pub mod codec;
pub mod payload;
pub mod signing;

pub use payload::MetricKind;
pub use payload::MetricPayload;
pub use payload::MetricValue;
pub use payload::WireError;
pub use signing::SIGNATURE_HEADER;
