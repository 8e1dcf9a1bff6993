//! Request handlers.
//!
//! Validation happens here; the store itself never sees malformed input.
//! Path-segment endpoints answer 400 for an unknown kind, the JSON
//! endpoints answer 404, mirroring the agent-facing contract.

use std::sync::Arc;

use poem::handler;
use poem::http::StatusCode;
use poem::web::Data;
use poem::web::Json;
use poem::web::Path;
use poem::IntoResponse;
use poem::Response;
use serde::Deserialize;
use serde::Serialize;
use telemetry_types::MetricKind;
use telemetry_types::MetricPayload;
use telemetry_types::MetricValue;
use tracing::warn;

use crate::persistence::StorageBackend;
use crate::store::MetricStore;

/// Raw wire document before kind validation. `kind` stays a string here so
/// an unknown kind is a validation outcome, not a deserialization failure.
#[derive(Debug, Deserialize)]
struct WireMetric {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<i64>,
    #[serde(default)]
    value: Option<f64>,
}

impl WireMetric {
    /// Validate kind and numeric field, yielding the value to apply. Once
    /// the kind parses, the numeric-field check is the shared payload
    /// validation.
    fn validate(&self) -> Result<MetricValue, String> {
        let kind: MetricKind = self.kind.parse().map_err(|_| {
            format!("Invalid metric type {:?}. Can only be 'gauge' or 'counter'", self.kind)
        })?;
        MetricPayload {
            id: self.id.clone(),
            kind,
            delta: self.delta,
            value: self.value,
        }
        .metric_value()
        .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub applied: usize,
    pub rejected: usize,
}

fn status_only(status: StatusCode) -> Response {
    Response::builder().status(status).finish()
}

fn bad_request(message: String) -> Response {
    Response::builder().status(StatusCode::BAD_REQUEST).body(message)
}

fn payload_for(id: &str, value: MetricValue) -> MetricPayload {
    match value {
        MetricValue::Gauge(v) => MetricPayload::gauge(id, v),
        MetricValue::Counter(d) => MetricPayload::counter(id, d),
    }
}

/// `POST /update/{type}/{name}/{value}`
#[handler]
pub async fn update_path(
    Path((kind, name, raw_value)): Path<(String, String, String)>,
    store: Data<&Arc<MetricStore>>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return bad_request("Invalid metric type. Can only be 'gauge' or 'counter'".to_string());
    };

    let value = match kind {
        MetricKind::Gauge => match raw_value.parse::<f64>() {
            Ok(v) => MetricValue::Gauge(v),
            Err(_) => {
                return bad_request(format!("{raw_value} cannot be converted to a float"));
            }
        },
        MetricKind::Counter => match raw_value.parse::<i64>() {
            Ok(d) => MetricValue::Counter(d),
            Err(_) => {
                return bad_request(format!("{raw_value} cannot be converted to an integer"));
            }
        },
    };

    store.apply(&name, value);
    status_only(StatusCode::OK)
}

/// `POST /update/` with a single JSON metric.
#[handler]
pub async fn update_json(
    Json(metric): Json<WireMetric>,
    store: Data<&Arc<MetricStore>>,
) -> Response {
    if metric.kind.parse::<MetricKind>().is_err() {
        return status_only(StatusCode::NOT_FOUND);
    }
    match metric.validate() {
        Ok(value) => {
            store.apply(&metric.id, value);
            Json(payload_for(&metric.id, value)).into_response()
        }
        Err(message) => bad_request(message),
    }
}

/// `POST /updates/` with a JSON array. Application is per-item: a bad entry
/// is rejected and logged without blocking the rest of the batch.
#[handler]
pub async fn update_batch(
    Json(batch): Json<Vec<WireMetric>>,
    store: Data<&Arc<MetricStore>>,
) -> Response {
    let mut summary = BatchSummary { applied: 0, rejected: 0 };
    for metric in &batch {
        match metric.validate() {
            Ok(value) => {
                store.apply(&metric.id, value);
                summary.applied += 1;
            }
            Err(message) => {
                warn!(id = %metric.id, "skipping invalid batch entry: {message}");
                summary.rejected += 1;
            }
        }
    }
    Json(summary).into_response()
}

/// Plain-text read for `GET /value/{type}/{name}`; an absent metric answers
/// an empty 404.
#[handler]
pub async fn value_path(
    Path((kind, name)): Path<(String, String)>,
    store: Data<&Arc<MetricStore>>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return bad_request("Invalid metric type. Can only be 'gauge' or 'counter'".to_string());
    };
    match store.value(kind, &name) {
        Some(text) => text.into_response(),
        None => status_only(StatusCode::NOT_FOUND),
    }
}

/// JSON lookup of one metric via `POST /value/`.
#[handler]
pub async fn value_json(
    Json(query): Json<WireMetric>,
    store: Data<&Arc<MetricStore>>,
) -> Response {
    let Ok(kind) = query.kind.parse::<MetricKind>() else {
        return status_only(StatusCode::NOT_FOUND);
    };
    match store.typed_value(kind, &query.id) {
        Some(value) => Json(payload_for(&query.id, value)).into_response(),
        None => status_only(StatusCode::NOT_FOUND),
    }
}

/// Human-readable listing of everything in the store, served at `GET /`.
#[handler]
pub async fn list_metrics(store: Data<&Arc<MetricStore>>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .content_type("text/plain; charset=utf-8")
        .body(store.render_text())
}

/// Persistence liveness probe at `GET /ping`.
#[handler]
pub async fn ping(backend: Data<&Arc<StorageBackend>>) -> Response {
    match backend.check().await {
        Ok(()) => status_only(StatusCode::OK),
        Err(e) => Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(format!("storage unavailable: {e}")),
    }
}
