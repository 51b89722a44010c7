// crates/backdrop-server/tests/relay_e2e.rs
// ============================================================================
// Module: Relay End-to-End Tests
// Description: Drive the HTTP server against a local upstream.
// Purpose: Prove endpoint status mapping, header hygiene, and fail-closed
//          validation without network access.
// ============================================================================

//! ## Overview
//! Each test starts the relay on 127.0.0.1 with the trusted origin pointed at
//! a throwaway `tiny_http` upstream, then calls it with `reqwest`. The
//! upstream counts requests so tests can prove nothing was fetched.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use backdrop_config::BackdropConfig;
use backdrop_server::RelayAuditEvent;
use backdrop_server::RelayAuditSink;
use backdrop_server::RelayOutcome;
use backdrop_server::RelayServer;
use backdrop_server::ServerError;
use backdrop_server::ServerStartEvent;
use serde_json::Value;
use tiny_http::Header;
use tiny_http::Request;
use tiny_http::Response;
use tiny_http::Server;
use tokio::net::TcpListener;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<RelayAuditEvent>>,
    starts: Mutex<Vec<ServerStartEvent>>,
}

impl RelayAuditSink for RecordingSink {
    fn record(&self, event: &RelayAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn record_start(&self, event: &ServerStartEvent) {
        self.starts.lock().unwrap().push(event.clone());
    }
}

type Responder = fn(&Request) -> Response<Cursor<Vec<u8>>>;

struct Upstream {
    addr: SocketAddr,
    handle: thread::JoinHandle<usize>,
}

impl Upstream {
    /// Serves up to `limit` requests, stopping after one idle second.
    fn start(limit: usize, responder: Responder) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            let mut served = 0;
            while served < limit {
                match server.recv_timeout(Duration::from_secs(1)) {
                    Ok(Some(request)) => {
                        let response = responder(&request);
                        let _ = request.respond(response);
                        served += 1;
                    }
                    _ => break,
                }
            }
            served
        });
        Self {
            addr,
            handle,
        }
    }

    fn origin(&self) -> String {
        format!("http://{}/", self.addr)
    }

    fn served(self) -> usize {
        self.handle.join().unwrap()
    }
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
}

fn profile_page(_: &Request) -> Response<Cursor<Vec<u8>>> {
    Response::from_string(
        "<html><head><title>p</title><script>steal()</script></head><body>\
         <div class=\"profile_page\" onclick=\"x()\"><a href=\"javascript:alert(1)\">a</a>\
         <iframe src=\"https://evil.example/\"></iframe><p>hello</p></div></body></html>",
    )
    .with_header(header("Content-Type", "text/html"))
    .with_header(header("X-Frame-Options", "DENY"))
    .with_header(header("Content-Security-Policy", "frame-ancestors 'none'"))
}

fn not_found(_: &Request) -> Response<Cursor<Vec<u8>>> {
    Response::from_string("gone").with_status_code(404)
}

fn config_for(origin: &str) -> BackdropConfig {
    let mut config = BackdropConfig::default();
    config.origin.allowed_origin = origin.to_string();
    config.fetch.timeout_ms = 2_000;
    config
}

async fn start_relay(config: BackdropConfig, sink: Arc<RecordingSink>) -> SocketAddr {
    let server = RelayServer::from_config(config, sink).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve_on(listener));
    addr
}

async fn get(relay: SocketAddr, path_and_query: &str) -> reqwest::Response {
    reqwest::get(format!("http://{relay}{path_and_query}")).await.unwrap()
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn disallowed_host_is_rejected_without_fetching() {
    let upstream = Upstream::start(1, profile_page);
    let sink = Arc::new(RecordingSink::default());
    let relay = start_relay(config_for(&upstream.origin()), Arc::clone(&sink)).await;

    let response =
        get(relay, &format!("/fetch?url={}", encode("https://example.com/profile"))).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Only 127.0.0.1 URLs are allowed");
    assert_eq!(upstream.served(), 0);

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, RelayOutcome::Rejected);
    assert_eq!(events[0].error_kind, Some("disallowed_host"));
    assert_eq!(events[0].endpoint, "/fetch");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_and_malformed_urls_are_client_errors() {
    let sink = Arc::new(RecordingSink::default());
    let relay = start_relay(config_for("http://127.0.0.1:9/"), sink).await;

    let missing = get(relay, "/fetch").await;
    assert_eq!(missing.status().as_u16(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "URL parameter is required");

    let malformed = get(relay, "/fetch?url=not%20a%20url").await;
    assert_eq!(malformed.status().as_u16(), 400);
    let body: Value = malformed.json().await.unwrap();
    assert_eq!(body["error"], "Invalid URL format");
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_query_is_a_json_client_error() {
    let sink = Arc::new(RecordingSink::default());
    let relay = start_relay(config_for("http://127.0.0.1:9/"), Arc::clone(&sink)).await;

    let duplicate = get(relay, "/fetch?url=a&url=b").await;
    assert_eq!(duplicate.status().as_u16(), 400);
    assert_eq!(duplicate.headers()["access-control-allow-origin"], "*");
    assert!(
        duplicate.headers()["content-type"].to_str().unwrap().starts_with("application/json")
    );
    let body: Value = duplicate.json().await.unwrap();
    assert_eq!(body["error"], "Invalid URL format");

    let preview = get(relay, "/preview?url=a&bg=x&bg=y").await;
    assert_eq!(preview.status().as_u16(), 400);
    let body: Value = preview.json().await.unwrap();
    assert_eq!(body["error"], "Invalid URL format");

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.outcome == RelayOutcome::Rejected));
    assert_eq!(events[0].error_kind, Some("malformed_url"));
    assert_eq!(events[1].endpoint, "/preview");
}

// ============================================================================
// SECTION: Relay
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn relayed_document_is_sanitized_and_embeddable() {
    let upstream = Upstream::start(1, profile_page);
    let origin = upstream.origin();
    let sink = Arc::new(RecordingSink::default());
    let relay = start_relay(config_for(&origin), Arc::clone(&sink)).await;

    let target = format!("{origin}id/someone");
    let response = get(relay, &format!("/fetch?url={}", encode(&target))).await;
    assert_eq!(response.status().as_u16(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers["content-type"], "text/html; charset=utf-8");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(headers.get("x-frame-options").is_none());
    assert!(headers.get("content-security-policy").is_none());
    assert!(headers.get("x-content-type-options").is_none());

    let body = response.text().await.unwrap();
    assert!(body.contains(&format!("<base href=\"{origin}\">")), "{body}");
    assert!(body.contains("<p>hello</p>"), "{body}");
    assert!(!body.to_ascii_lowercase().contains("<script"), "{body}");
    assert!(!body.contains("onclick"), "{body}");
    assert!(!body.contains("javascript:"), "{body}");
    assert!(!body.contains("<iframe"), "{body}");
    assert_eq!(upstream.served(), 1);
    assert_eq!(sink.events.lock().unwrap()[0].outcome, RelayOutcome::Ok);
}

#[tokio::test(flavor = "multi_thread")]
async fn upstream_status_is_propagated() {
    let upstream = Upstream::start(1, not_found);
    let origin = upstream.origin();
    let relay = start_relay(config_for(&origin), Arc::new(RecordingSink::default())).await;

    let target = format!("{origin}id/missing");
    let response = get(relay, &format!("/fetch?url={}", encode(&target))).await;
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Upstream returned 404: Not Found");
    assert!(body.get("details").is_none());
    upstream.served();
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_upstream_is_a_generic_failure() {
    let closed = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);
    let origin = format!("http://{addr}/");
    let relay = start_relay(config_for(&origin), Arc::new(RecordingSink::default())).await;

    let response = get(relay, &format!("/fetch?url={}", encode(&origin))).await;
    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Failed to fetch profile");
    assert!(body["details"].as_str().unwrap().starts_with("network error"));
}

#[tokio::test(flavor = "multi_thread")]
async fn saturated_server_answers_busy() {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    let upstream = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf);
            thread::sleep(Duration::from_millis(800));
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        }
    });
    let origin = format!("http://{upstream_addr}/");
    let mut config = config_for(&origin);
    config.server.max_inflight = 1;
    let relay = start_relay(config, Arc::new(RecordingSink::default())).await;

    let slow_path = format!("/fetch?url={}", encode(&origin));
    let slow = tokio::spawn(async move { get(relay, &slow_path).await.status().as_u16() });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let busy = get(relay, &format!("/fetch?url={}", encode(&origin))).await;
    assert_eq!(busy.status().as_u16(), 503);
    let body: Value = busy.json().await.unwrap();
    assert_eq!(body["error"], "server busy");

    let rejected = get(relay, "/fetch?url=https%3A%2F%2Fexample.com%2Fprofile").await;
    assert_eq!(rejected.status().as_u16(), 400);
    let malformed = get(relay, "/preview?url=a&bg=javascript%3Ax").await;
    assert_eq!(malformed.status().as_u16(), 400);

    assert_eq!(slow.await.unwrap(), 200);
    upstream.join().unwrap();
}

// ============================================================================
// SECTION: Preview
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn preview_applies_the_background() {
    let upstream = Upstream::start(1, profile_page);
    let origin = upstream.origin();
    let relay = start_relay(config_for(&origin), Arc::new(RecordingSink::default())).await;

    let path = format!(
        "/preview?url={}&bg={}",
        encode(&format!("{origin}id/someone")),
        encode("https://cdn.example/profilebackground_b.jpg")
    );
    let response = get(relay, &path).await;
    assert_eq!(response.status().as_u16(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("cdn.example/profilebackground_b.jpg"), "{body}");
    assert!(body.contains("!important"), "{body}");
    upstream.served();
}

#[tokio::test(flavor = "multi_thread")]
async fn preview_rejects_script_backgrounds_before_fetching() {
    let upstream = Upstream::start(1, profile_page);
    let origin = upstream.origin();
    let relay = start_relay(config_for(&origin), Arc::new(RecordingSink::default())).await;

    let path = format!(
        "/preview?url={}&bg={}",
        encode(&format!("{origin}id/someone")),
        encode("javascript:alert(1)")
    );
    let response = get(relay, &path).await;
    assert_eq!(response.status().as_u16(), 400);
    let missing = get(relay, &format!("/preview?url={}", encode(&origin))).await;
    assert_eq!(missing.status().as_u16(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "Background parameter is required");
    assert_eq!(upstream.served(), 0);
}

// ============================================================================
// SECTION: Catalog and Health
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn catalog_is_served_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steam_backgrounds.json");
    std::fs::write(
        &path,
        r#"["https://cdn.example/profilebackground_a.jpg","https://cdn.example/profilebackground_b.jpg"]"#,
    )
    .unwrap();
    let mut config = config_for("http://127.0.0.1:9/");
    config.catalog.path = Some(path.to_string_lossy().into_owned());
    let sink = Arc::new(RecordingSink::default());
    let relay = start_relay(config, Arc::clone(&sink)).await;

    let response = get(relay, "/steam_backgrounds.json").await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Vec<String> = response.json().await.unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[1], "https://cdn.example/profilebackground_b.jpg");
    assert_eq!(sink.starts.lock().unwrap()[0].catalog_entries, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_catalog_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steam_backgrounds.json");
    std::fs::write(&path, r#"["javascript:alert(1)"]"#).unwrap();
    let mut config = config_for("http://127.0.0.1:9/");
    config.catalog.path = Some(path.to_string_lossy().into_owned());
    let result = RelayServer::from_config(config, Arc::new(RecordingSink::default()));
    assert!(matches!(result, Err(ServerError::Init(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_reports_ok() {
    let mut config = config_for("http://127.0.0.1:9/");
    config.server.cors_allow_any = false;
    let relay = start_relay(config, Arc::new(RecordingSink::default())).await;
    let response = get(relay, "/healthz").await;
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.headers().get("access-control-allow-origin").is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}
