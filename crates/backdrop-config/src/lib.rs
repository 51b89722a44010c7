// crates/backdrop-config/src/lib.rs
// ============================================================================
// Module: Backdrop Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for backdrop.toml semantics.
// Dependencies: backdrop-core, backdrop-fetch, serde, toml
// ============================================================================

//! ## Overview
//! `backdrop-config` defines the configuration model for the relay server.
//! Every section has built-in defaults and is validated fail-closed before
//! any listener or client is created.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
