// crates/backdrop-cli/src/serve_policy.rs
// ============================================================================
// Module: Serve Policy
// Description: Network exposure policy checks for the CLI server launcher.
// Purpose: Enforce safe-by-default bind behavior with explicit opt-in.
// Dependencies: backdrop-config, std
// ============================================================================

//! ## Overview
//! The relay fetches on behalf of whoever can reach it, so binding to a
//! non-loopback address turns it into a public proxy. The policy is
//! fail-closed: loopback binds always pass, anything else needs the
//! `--allow-non-loopback` flag or a truthy `BACKDROP_ALLOW_NON_LOOPBACK`.

use std::env;
use std::net::SocketAddr;

use backdrop_config::BackdropConfig;
use thiserror::Error;

/// Environment variable enabling non-loopback server binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "BACKDROP_ALLOW_NON_LOOPBACK";

/// Bind outcome metadata for startup warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOutcome {
    /// Address the server will bind.
    pub bind_addr: SocketAddr,
    /// True when the server is bound to a non-loopback address.
    pub network_exposed: bool,
}

/// Serve policy failures for bind safety.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServePolicyError {
    /// Environment variable was set to an invalid value.
    #[error("{ALLOW_NON_LOOPBACK_ENV} has invalid value \"{value}\"; use true or false")]
    InvalidEnv {
        /// Raw environment value.
        value: String,
    },
    /// Bind string failed to parse.
    #[error("invalid bind address {bind}: {error}")]
    InvalidBind {
        /// Raw bind value.
        bind: String,
        /// Parse error message.
        error: String,
    },
    /// Non-loopback binding requires explicit opt-in.
    #[error(
        "refusing to bind {bind}: non-loopback binds require --allow-non-loopback or \
         {ALLOW_NON_LOOPBACK_ENV}=true"
    )]
    NonLoopbackOptInRequired {
        /// Bind address.
        bind: String,
    },
}

/// Resolves the non-loopback opt-in flag from CLI and environment.
///
/// # Errors
/// Returns [`ServePolicyError::InvalidEnv`] when the environment value is invalid.
pub fn resolve_allow_non_loopback(flag: bool) -> Result<bool, ServePolicyError> {
    if flag {
        return Ok(true);
    }
    let Some(value) = env::var_os(ALLOW_NON_LOOPBACK_ENV) else {
        return Ok(false);
    };
    parse_allow_non_loopback_value(&value.to_string_lossy())
}

/// Enforces the loopback-only bind policy for the relay server.
///
/// # Errors
/// Returns [`ServePolicyError`] when the bind is invalid or exposed without opt-in.
pub fn enforce_local_only(
    config: &BackdropConfig,
    allow_non_loopback: bool,
) -> Result<BindOutcome, ServePolicyError> {
    let bind = config.server.bind.trim();
    let bind_addr: SocketAddr =
        bind.parse().map_err(|err: std::net::AddrParseError| ServePolicyError::InvalidBind {
            bind: bind.to_string(),
            error: err.to_string(),
        })?;
    if bind_addr.ip().is_loopback() {
        return Ok(BindOutcome {
            bind_addr,
            network_exposed: false,
        });
    }
    if !allow_non_loopback {
        return Err(ServePolicyError::NonLoopbackOptInRequired {
            bind: bind.to_string(),
        });
    }
    Ok(BindOutcome {
        bind_addr,
        network_exposed: true,
    })
}

/// Parses a bool-ish string (true/false/1/0/yes/no/on/off).
fn parse_boolish(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parses an env value for allow-non-loopback.
fn parse_allow_non_loopback_value(value: &str) -> Result<bool, ServePolicyError> {
    parse_boolish(value).ok_or_else(|| ServePolicyError::InvalidEnv {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        reason = "Test helpers use expect/expect_err for concise failure messages."
    )]

    use backdrop_config::BackdropConfig;

    use super::ServePolicyError;
    use super::enforce_local_only;
    use super::parse_allow_non_loopback_value;

    fn config_with_bind(bind: &str) -> BackdropConfig {
        BackdropConfig::from_toml(&format!("[server]\nbind = \"{bind}\"")).expect("load config")
    }

    #[test]
    fn loopback_bind_is_allowed() {
        let outcome = enforce_local_only(&config_with_bind("127.0.0.1:3000"), false)
            .expect("loopback allowed");
        assert!(!outcome.network_exposed);
        assert_eq!(outcome.bind_addr.port(), 3000);
    }

    #[test]
    fn ipv6_loopback_bind_is_allowed() {
        let outcome =
            enforce_local_only(&config_with_bind("[::1]:3000"), false).expect("loopback allowed");
        assert!(!outcome.network_exposed);
    }

    #[test]
    fn non_loopback_requires_opt_in() {
        let err = enforce_local_only(&config_with_bind("0.0.0.0:3000"), false)
            .expect_err("expected opt-in error");
        assert!(matches!(err, ServePolicyError::NonLoopbackOptInRequired { .. }));
    }

    #[test]
    fn non_loopback_with_opt_in_is_exposed() {
        let outcome = enforce_local_only(&config_with_bind("0.0.0.0:3000"), true)
            .expect("expected success");
        assert!(outcome.network_exposed);
    }

    #[test]
    fn parse_allow_non_loopback_accepts_truthy_values() {
        for value in ["true", "1", " YES ", "on"] {
            assert!(parse_allow_non_loopback_value(value).expect("parse env"), "{value}");
        }
        assert!(!parse_allow_non_loopback_value("off").expect("parse env"));
    }

    #[test]
    fn parse_allow_non_loopback_rejects_invalid() {
        let err = parse_allow_non_loopback_value("maybe").expect_err("expected invalid env");
        assert!(matches!(err, ServePolicyError::InvalidEnv { .. }));
    }
}
