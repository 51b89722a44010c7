// crates/backdrop-server/src/lib.rs
// ============================================================================
// Module: Backdrop Server Library
// Description: HTTP surface for the trusted content relay.
// Purpose: Expose the relay service, HTTP server, catalog, and audit sinks.
// Dependencies: axum, backdrop-config, backdrop-core, backdrop-fetch, tokio
// ============================================================================

//! ## Overview
//! `backdrop-server` wires the relay pipeline (validate, fetch, sanitize,
//! assemble) behind an axum router. Every relay call is bounded by a
//! concurrency cap and recorded through a [`RelayAuditSink`].
//!
//! Security posture: query parameters and upstream bodies are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod catalog;
pub mod relay;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::RelayAuditEvent;
pub use audit::RelayAuditSink;
pub use audit::RelayFileAuditSink;
pub use audit::RelayNoopAuditSink;
pub use audit::RelayOutcome;
pub use audit::RelayStderrAuditSink;
pub use audit::ServerStartEvent;
pub use catalog::BackgroundCatalog;
pub use catalog::CatalogError;
pub use relay::RelayError;
pub use relay::RelayService;
pub use server::RelayServer;
pub use server::ServerError;
pub use server::audit_sink_from_config;
