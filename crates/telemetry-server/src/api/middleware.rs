//! Inbound request decoding.
//!
//! Runs before routing touches the body: gzip-encoded bodies are inflated,
//! and when a signing key is configured the `HashSHA256` header is verified
//! against the inflated bytes. A missing header counts as a mismatch, so an
//! unsigned request never reaches a handler on a keyed server.

use poem::http::header::CONTENT_ENCODING;
use poem::http::StatusCode;
use poem::Endpoint;
use poem::IntoResponse;
use poem::Middleware;
use poem::Request;
use poem::Response;
use poem::Result as PoemResult;
use telemetry_types::codec;
use telemetry_types::signing;
use telemetry_types::SIGNATURE_HEADER;
use tracing::warn;

pub struct DecodeRequest {
    sign_key: Option<String>,
}

impl DecodeRequest {
    pub fn new(sign_key: Option<String>) -> Self {
        Self { sign_key }
    }
}

impl<E> Middleware<E> for DecodeRequest
where E: Endpoint
{
    type Output = DecodeRequestEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        DecodeRequestEndpoint {
            inner: ep,
            sign_key: self.sign_key.clone(),
        }
    }
}

pub struct DecodeRequestEndpoint<E> {
    inner: E,
    sign_key: Option<String>,
}

impl<E> Endpoint for DecodeRequestEndpoint<E>
where E: Endpoint
{
    type Output = Response;

    async fn call(&self, mut req: Request) -> PoemResult<Self::Output> {
        let is_gzip = req
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("gzip"));
        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let raw = req.take_body().into_vec().await.map_err(|e| {
            poem::Error::from_string(
                format!("failed to read request body: {e}"),
                StatusCode::BAD_REQUEST,
            )
        })?;

        let body = if is_gzip && !raw.is_empty() {
            match codec::decompress(&raw) {
                Ok(body) => body,
                Err(e) => {
                    warn!("rejecting request with undecodable gzip body: {e}");
                    return Ok(Response::builder()
                        .status(StatusCode::BAD_REQUEST)
                        .body("body is not valid gzip"));
                }
            }
        } else {
            raw
        };

        // The signature covers the uncompressed bytes.
        if let Some(key) = &self.sign_key {
            let signature = signature.unwrap_or_default();
            if !signing::verify(&body, key.as_bytes(), &signature) {
                warn!("rejecting request with missing or invalid body signature");
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body("signature is not valid"));
            }
        }

        req.set_body(body);
        self.inner.call(req).await.map(IntoResponse::into_response)
    }
}
