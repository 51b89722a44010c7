// crates/backdrop-core/src/injector/message.rs
// ============================================================================
// Module: Injector Message Contract
// Description: Commands accepted across the embedding trust boundary.
// Purpose: Validate cross-boundary messages by shape before acting on them.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The embedding controller talks to the injector with structurally typed
//! JSON messages. The only command is `{"type":"resetBg"}`; any other shape,
//! including extra fields, is ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Messages
// ============================================================================

/// Command sent by the embedding controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InjectorMessage {
    /// Remove the background applied by the injector.
    #[serde(rename = "resetBg")]
    ResetBackground,
}

impl InjectorMessage {
    /// Parses a message, returning `None` for any shape other than a known command.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };
        if map.len() != 1 {
            return None;
        }
        Self::deserialize(value).ok()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
