// crates/backdrop-server/src/audit.rs
// ============================================================================
// Module: Relay Audit Logging
// Description: Structured audit events for relay request handling.
// Purpose: Emit JSON-lines audit records without page content.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events describe what the relay did with a request: endpoint,
//! outcome, status, error kind, response size, and elapsed time. They never
//! carry page bodies or query strings. Sinks are pluggable so deployments can
//! route events to stderr, an append-only file, or nowhere.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Coarse classification of a relay response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayOutcome {
    /// Document delivered.
    Ok,
    /// Request refused before any fetch.
    Rejected,
    /// Upstream answered with a non-success status.
    UpstreamStatus,
    /// Fetch failed (timeout, size, network, redirect).
    Failed,
    /// Concurrency cap reached.
    Busy,
}

/// Relay request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RelayAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Endpoint path.
    pub endpoint: &'static str,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Request outcome.
    pub outcome: RelayOutcome,
    /// HTTP status returned to the caller.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Response body size in bytes.
    pub response_bytes: usize,
    /// Handling time in milliseconds.
    pub elapsed_ms: u128,
}

/// Inputs required to construct a relay audit event.
pub struct RelayAuditEventParams {
    /// Endpoint path.
    pub endpoint: &'static str,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Request outcome.
    pub outcome: RelayOutcome,
    /// HTTP status returned to the caller.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Response body size in bytes.
    pub response_bytes: usize,
    /// Handling time in milliseconds.
    pub elapsed_ms: u128,
}

impl RelayAuditEvent {
    /// Creates a new relay audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: RelayAuditEventParams) -> Self {
        Self {
            event: "relay_request",
            timestamp_ms: timestamp_ms(),
            endpoint: params.endpoint,
            peer_ip: params.peer_ip,
            outcome: params.outcome,
            status: params.status,
            error_kind: params.error_kind,
            response_bytes: params.response_bytes,
            elapsed_ms: params.elapsed_ms,
        }
    }
}

/// Server startup audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStartEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Bound listener address.
    pub bind: String,
    /// Trusted upstream origin.
    pub allowed_origin: String,
    /// Concurrent relay call cap.
    pub max_inflight: usize,
    /// Number of catalog entries served.
    pub catalog_entries: usize,
}

impl ServerStartEvent {
    /// Creates a new startup event with a consistent timestamp.
    #[must_use]
    pub fn new(
        bind: String,
        allowed_origin: String,
        max_inflight: usize,
        catalog_entries: usize,
    ) -> Self {
        Self {
            event: "server_start",
            timestamp_ms: timestamp_ms(),
            bind,
            allowed_origin,
            max_inflight,
            catalog_entries,
        }
    }
}

/// Milliseconds since the Unix epoch, zero when the clock is before it.
fn timestamp_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for relay events.
pub trait RelayAuditSink: Send + Sync {
    /// Record a relay request event.
    fn record(&self, event: &RelayAuditEvent);

    /// Record a server startup event.
    fn record_start(&self, _event: &ServerStartEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct RelayStderrAuditSink;

impl RelayAuditSink for RelayStderrAuditSink {
    fn record(&self, event: &RelayAuditEvent) {
        write_line(&mut io::stderr(), event);
    }

    fn record_start(&self, event: &ServerStartEvent) {
        write_line(&mut io::stderr(), event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct RelayFileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl RelayFileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one event under the file lock.
    fn append(&self, event: &impl Serialize) {
        if let Ok(mut file) = self.file.lock() {
            write_line(&mut *file, event);
        }
    }
}

impl RelayAuditSink for RelayFileAuditSink {
    fn record(&self, event: &RelayAuditEvent) {
        self.append(event);
    }

    fn record_start(&self, event: &ServerStartEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct RelayNoopAuditSink;

impl RelayAuditSink for RelayNoopAuditSink {
    fn record(&self, _event: &RelayAuditEvent) {}
}

/// Serializes an event as one JSON line; write failures are dropped.
fn write_line(writer: &mut impl Write, event: &impl Serialize) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(writer, "{payload}");
        let _ = writer.flush();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only audit file assertions."
    )]

    use std::fs;

    use super::RelayAuditEvent;
    use super::RelayAuditEventParams;
    use super::RelayAuditSink;
    use super::RelayFileAuditSink;
    use super::RelayOutcome;
    use super::ServerStartEvent;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = RelayFileAuditSink::new(&path).unwrap();
        sink.record_start(&ServerStartEvent::new(
            "127.0.0.1:3000".to_string(),
            "https://steamcommunity.com/".to_string(),
            64,
            2,
        ));
        sink.record(&RelayAuditEvent::new(RelayAuditEventParams {
            endpoint: "/fetch",
            peer_ip: Some("127.0.0.1".to_string()),
            outcome: RelayOutcome::Rejected,
            status: 400,
            error_kind: Some("disallowed_host"),
            response_bytes: 48,
            elapsed_ms: 1,
        }));
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            content.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "server_start");
        assert_eq!(lines[0]["catalog_entries"], 2);
        assert_eq!(lines[1]["event"], "relay_request");
        assert_eq!(lines[1]["outcome"], "rejected");
        assert_eq!(lines[1]["error_kind"], "disallowed_host");
    }
}
