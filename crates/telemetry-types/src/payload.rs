//! Metric wire schema.
//!
//! One JSON object per metric:
//! `{"id": "...", "type": "gauge"|"counter", "delta": i64?, "value": f64?}`.
//! Exactly one of `delta`/`value` is meaningful for a given `type`; the
//! other is omitted on the wire.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Errors produced while validating a wire payload.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown metric kind: {0:?}")]
    UnknownKind(String),

    #[error("{kind} metric {id:?} is missing its {field} field")]
    MissingField {
        id: String,
        kind: MetricKind,
        field: &'static str,
    },
}

/// The two metric kinds carried by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Latest sampled value, overwritten on each update.
    Gauge,
    /// Running total, updated by adding a delta.
    Counter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => f.write_str("gauge"),
            MetricKind::Counter => f.write_str("counter"),
        }
    }
}

impl FromStr for MetricKind {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(WireError::UnknownKind(other.to_string())),
        }
    }
}

/// A validated metric value, ready to apply to the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

/// One metric as it travels over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricPayload {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Validate the payload and extract the typed value.
    pub fn metric_value(&self) -> Result<MetricValue, WireError> {
        match self.kind {
            MetricKind::Gauge => self.value.map(MetricValue::Gauge).ok_or(WireError::MissingField {
                id: self.id.clone(),
                kind: self.kind,
                field: "value",
            }),
            MetricKind::Counter => {
                self.delta.map(MetricValue::Counter).ok_or(WireError::MissingField {
                    id: self.id.clone(),
                    kind: self.kind,
                    field: "delta",
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn gauge_payload_serializes_without_delta() {
        let payload = MetricPayload::gauge("Alloc", 123.5);

        let json = serde_json::to_string(&payload).expect("should serialize gauge payload");

        assert_eq!(
            json, r#"{"id":"Alloc","type":"gauge","value":123.5}"#,
            "gauge JSON should omit the delta field"
        );
    }

    #[test]
    fn counter_payload_serializes_without_value() {
        let payload = MetricPayload::counter("PollCount", 7);

        let json = serde_json::to_string(&payload).expect("should serialize counter payload");

        assert_eq!(
            json, r#"{"id":"PollCount","type":"counter","delta":7}"#,
            "counter JSON should omit the value field"
        );
    }

    #[test]
    fn payload_round_trips_through_json() {
        let original = MetricPayload::counter("PollCount", 42);

        let json = serde_json::to_string(&original).expect("should serialize");
        let decoded: MetricPayload = serde_json::from_str(&json).expect("should deserialize");

        assert_eq!(decoded, original, "payload should survive a JSON round trip");
    }

    #[test]
    fn unknown_kind_is_rejected_at_parse_time() {
        let err = "histogram".parse::<MetricKind>().expect_err("should reject unknown kind");

        assert_eq!(err, WireError::UnknownKind("histogram".to_string()));
    }

    #[test]
    fn counter_without_delta_fails_validation() {
        let payload = MetricPayload {
            id: "PollCount".to_string(),
            kind: MetricKind::Counter,
            delta: None,
            value: Some(1.0),
        };

        let err = payload.metric_value().expect_err("counter without delta should be invalid");

        assert!(
            matches!(err, WireError::MissingField { field: "delta", .. }),
            "error should name the missing delta field"
        );
    }

    #[test]
    fn gauge_value_extraction() {
        let payload = MetricPayload::gauge("HeapInuse", 4096.0);

        let value = payload.metric_value().expect("gauge with value should validate");

        assert_eq!(value, MetricValue::Gauge(4096.0));
    }
}
