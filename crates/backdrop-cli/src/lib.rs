// crates/backdrop-cli/src/lib.rs
// ============================================================================
// Module: Backdrop CLI Library
// Description: Shared helpers for the Backdrop command-line interface.
// Purpose: Provide reusable components for the CLI binary and tests.
// Dependencies: backdrop-config
// ============================================================================

//! ## Overview
//! This library houses the bind exposure policy used by `backdrop serve`, so
//! the binary and its tests share one implementation.
//!
//! Security posture: CLI inputs are untrusted and must be validated.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod serve_policy;
