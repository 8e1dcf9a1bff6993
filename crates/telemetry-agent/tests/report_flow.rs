//! End-to-end report delivery against a live capture server.

use std::sync::Arc;
use std::sync::Mutex;

use clap::Parser;
use poem::handler;
use poem::http::header::CONTENT_ENCODING;
use poem::http::StatusCode;
use poem::listener::Acceptor;
use poem::listener::Listener;
use poem::listener::TcpListener;
use poem::post;
use poem::web::Data;
use poem::Body;
use poem::EndpointExt;
use poem::Request;
use poem::Route;
use poem::Server;
use serde_json::Value;
use telemetry_agent::collector::MetricBuffer;
use telemetry_agent::config::AgentArgs;
use telemetry_agent::crypto::BodyCipher;
use telemetry_agent::transmitter::Transmitter;
use telemetry_types::codec;
use telemetry_types::signing;
use telemetry_types::SIGNATURE_HEADER;
use tokio_util::sync::CancellationToken;

const SIGN_KEY: &str = "integration-test-key";

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    gzip: bool,
    signature: Option<String>,
    body: Vec<u8>,
}

type CaptureLog = Arc<Mutex<Vec<Captured>>>;

#[handler]
async fn capture(
    req: &Request,
    body: Body,
    Data(log): Data<&CaptureLog>,
    Data(status): Data<&StatusCode>,
) -> StatusCode {
    let gzip = req
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let bytes = body.into_vec().await.expect("read captured body");

    log.lock().expect("capture log lock").push(Captured {
        path: req.uri().path().to_string(),
        gzip,
        signature,
        body: bytes,
    });
    *status
}

struct CaptureServer {
    addr: String,
    log: CaptureLog,
    token: CancellationToken,
}

impl CaptureServer {
    /// Serve on an ephemeral port, answering every request with `status`.
    async fn start(status: StatusCode) -> Self {
        let log: CaptureLog = Arc::new(Mutex::new(Vec::new()));
        let app = Route::new()
            .at("/update/", post(capture))
            .at("/updates/", post(capture))
            .data(Arc::clone(&log))
            .data(status);

        let acceptor = TcpListener::bind("127.0.0.1:0")
            .into_acceptor()
            .await
            .expect("bind capture server");
        let addr = acceptor.local_addr()[0]
            .as_socket_addr()
            .expect("tcp listener has a socket address")
            .to_string();

        let token = CancellationToken::new();
        let shutdown = token.clone();
        tokio::spawn(async move {
            let _ = Server::new_with_acceptor(acceptor)
                .run_with_graceful_shutdown(app, shutdown.cancelled_owned(), None)
                .await;
        });

        Self { addr, log, token }
    }

    fn requests(&self) -> Vec<Captured> {
        self.log.lock().expect("capture log lock").clone()
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn agent_args(addr: &str) -> AgentArgs {
    AgentArgs::try_parse_from(["telemetry-agent", "-a", addr, "-k", SIGN_KEY])
        .expect("agent arguments should parse")
}

fn decode(captured: &Captured) -> Value {
    assert!(captured.gzip, "report bodies are gzip encoded");
    let raw = codec::decompress(&captured.body).expect("report body should inflate");

    let signature = captured
        .signature
        .as_deref()
        .expect("configured key means every report is signed");
    assert!(
        signing::verify(&raw, SIGN_KEY.as_bytes(), signature),
        "signature must cover the uncompressed JSON"
    );

    serde_json::from_slice(&raw).expect("report body should be JSON")
}

#[test_log::test(tokio::test)]
async fn report_cycle_delivers_signed_gzip_batch_and_poll_count() {
    let server = CaptureServer::start(StatusCode::OK).await;

    let buffer = Arc::new(MetricBuffer::new());
    buffer.record_tick(
        Some(vec![("Alloc".to_string(), 123.5)]),
        Some(vec![("TotalMemory".to_string(), 1024.0)]),
    );
    buffer.record_tick(None, None);

    let transmitter = Transmitter::new(
        &agent_args(&server.addr),
        Arc::clone(&buffer),
        BodyCipher::plaintext(),
    )
    .expect("build transmitter");
    transmitter.report_cycle().await;

    let requests = server.requests();
    assert_eq!(
        requests.len(),
        3,
        "one batch, one random gauge, one counter update"
    );

    let batch_req = &requests[0];
    assert_eq!(batch_req.path, "/updates/");
    let batch = decode(batch_req);
    let entries = batch.as_array().expect("batch is a JSON array");
    let ids: Vec<_> = entries
        .iter()
        .map(|m| m["id"].as_str().expect("metric id"))
        .collect();
    assert_eq!(ids, vec!["Alloc", "TotalMemory", "RandomValue"]);
    assert_eq!(entries[0]["type"], "gauge");
    assert_eq!(entries[0]["value"], 123.5);

    let random_req = &requests[1];
    assert_eq!(random_req.path, "/update/");
    let random = decode(random_req);
    assert_eq!(random["id"], "RandomValue");
    assert_eq!(random["type"], "gauge");
    assert_eq!(
        random["value"], entries[2]["value"],
        "batch and individual report carry the same random value"
    );

    let counter_req = &requests[2];
    assert_eq!(counter_req.path, "/update/");
    let counter = decode(counter_req);
    assert_eq!(counter["id"], "PollCount");
    assert_eq!(counter["type"], "counter");
    assert_eq!(counter["delta"], 2, "both poll ticks are reported");

    let (_, remaining) = buffer.report_view();
    assert_eq!(remaining, 0, "delivered ticks are cleared from the buffer");
}

#[test_log::test(tokio::test)]
async fn rejected_poll_count_stays_buffered_for_the_next_cycle() {
    let server = CaptureServer::start(StatusCode::BAD_REQUEST).await;

    let buffer = Arc::new(MetricBuffer::new());
    buffer.record_tick(Some(vec![("Alloc".to_string(), 1.0)]), None);

    let transmitter = Transmitter::new(
        &agent_args(&server.addr),
        Arc::clone(&buffer),
        BodyCipher::plaintext(),
    )
    .expect("build transmitter");
    transmitter.report_cycle().await;

    let (_, remaining) = buffer.report_view();
    assert_eq!(remaining, 1, "an unacknowledged delta must survive");
}

#[test_log::test(tokio::test)]
async fn empty_buffer_still_reports_a_random_value_batch() {
    let server = CaptureServer::start(StatusCode::OK).await;

    let buffer = Arc::new(MetricBuffer::new());
    let transmitter = Transmitter::new(
        &agent_args(&server.addr),
        Arc::clone(&buffer),
        BodyCipher::plaintext(),
    )
    .expect("build transmitter");
    transmitter.report_cycle().await;

    let requests = server.requests();
    assert_eq!(requests.len(), 2, "no poll ticks means no counter update");
    let batch = decode(&requests[0]);
    assert_eq!(batch[0]["id"], "RandomValue");
    assert_eq!(requests[1].path, "/update/");
}
