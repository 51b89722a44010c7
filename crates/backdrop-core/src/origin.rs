// crates/backdrop-core/src/origin.rs
// ============================================================================
// Module: Origin Guard
// Description: Validation of relay targets against the single trusted origin.
// Purpose: Fail closed on any URL that is not an http(s) URL on the allowed host.
// Dependencies: thiserror, url
// ============================================================================

//! ## Overview
//! The origin guard decides whether a caller-supplied URL may be fetched by
//! the relay. Host comparison is exact (ASCII case-insensitive, one trailing
//! dot ignored); there is no suffix, subdomain, or wildcard matching.
//! Secondary targets such as background images only pass the scheme check.
//! Security posture: every input string is untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons a relay target or background URL is refused.
///
/// # Invariants
/// - Every variant maps to a client error; none is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Input is empty or not an absolute URL.
    #[error("Invalid URL format")]
    MalformedUrl,
    /// Host differs from the allowed host, or the URL carries credentials.
    #[error("Only {allowed} URLs are allowed")]
    DisallowedHost {
        /// Host the guard accepts.
        allowed: String,
    },
    /// Scheme is neither `http` nor `https`.
    #[error("URL scheme {scheme} is not allowed")]
    DisallowedScheme {
        /// Rejected scheme.
        scheme: String,
    },
}

impl ValidationError {
    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedUrl => "malformed_url",
            Self::DisallowedHost {
                ..
            } => "disallowed_host",
            Self::DisallowedScheme {
                ..
            } => "disallowed_scheme",
        }
    }
}

// ============================================================================
// SECTION: Validated Values
// ============================================================================

/// A relay target that passed the origin guard.
///
/// # Invariants
/// - Scheme is `http` or `https` and the host equals the guard's host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Validated target URL.
    target_url: Url,
}

impl FetchRequest {
    /// Returns the validated target URL.
    #[must_use]
    pub const fn target_url(&self) -> &Url {
        &self.target_url
    }
}

/// A background image URL chosen by the user.
///
/// # Invariants
/// - Scheme is `http` or `https`. The host is not restricted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundSelection {
    /// Validated image URL.
    image_url: Url,
}

impl BackgroundSelection {
    /// Parses and scheme-checks a background image URL.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedUrl`] for empty or relative input
    /// and [`ValidationError::DisallowedScheme`] for non-http(s) schemes.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let image_url = parse_absolute(raw)?;
        ensure_http_scheme(&image_url)?;
        Ok(Self {
            image_url,
        })
    }

    /// Returns the validated image URL.
    #[must_use]
    pub const fn image_url(&self) -> &Url {
        &self.image_url
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Exact-host allowlist for relay targets.
///
/// # Invariants
/// - `host` is normalized (lowercase, no trailing dot) and non-empty.
/// - `origin` is the `scheme://host[:port]/` form of the trusted upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginGuard {
    /// Normalized allowed host.
    host: String,
    /// Trusted origin used as the base URL of relayed documents.
    origin: Url,
}

impl OriginGuard {
    /// Builds a guard from the trusted origin URL.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the origin is not an http(s) URL with
    /// a host and without credentials.
    pub fn new(allowed_origin: &Url) -> Result<Self, ValidationError> {
        ensure_http_scheme(allowed_origin)?;
        let host = allowed_origin
            .host_str()
            .map(normalize_host_label)
            .filter(|host| !host.is_empty())
            .ok_or(ValidationError::MalformedUrl)?;
        if has_credentials(allowed_origin) {
            return Err(ValidationError::DisallowedHost {
                allowed: host,
            });
        }
        let origin = Url::parse(&format!("{}/", allowed_origin.origin().ascii_serialization()))
            .map_err(|_| ValidationError::MalformedUrl)?;
        Ok(Self {
            host,
            origin,
        })
    }

    /// Returns the normalized allowed host.
    #[must_use]
    pub fn allowed_host(&self) -> &str {
        &self.host
    }

    /// Returns the trusted origin (`scheme://host[:port]/`).
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Validates a caller-supplied relay target.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the input is malformed, uses a
    /// non-http(s) scheme, carries credentials, or names another host.
    pub fn validate(&self, raw: &str) -> Result<Url, ValidationError> {
        let url = parse_absolute(raw)?;
        self.check(&url)?;
        Ok(url)
    }

    /// Validates a relay target and wraps it as a [`FetchRequest`].
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`OriginGuard::validate`].
    pub fn request(&self, raw: &str) -> Result<FetchRequest, ValidationError> {
        self.validate(raw).map(|target_url| FetchRequest {
            target_url,
        })
    }

    /// Validates a background image URL (scheme check only).
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`BackgroundSelection::parse`].
    pub fn validate_background(&self, raw: &str) -> Result<BackgroundSelection, ValidationError> {
        BackgroundSelection::parse(raw)
    }

    /// Checks an already parsed URL, such as a redirect hop.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the URL fails the scheme, credential,
    /// or host rule.
    pub fn check(&self, url: &Url) -> Result<(), ValidationError> {
        ensure_http_scheme(url)?;
        if has_credentials(url) {
            return Err(self.host_error());
        }
        let host = url.host_str().map(normalize_host_label).ok_or_else(|| self.host_error())?;
        if host != self.host {
            return Err(self.host_error());
        }
        Ok(())
    }

    /// Builds the host rejection for this guard.
    fn host_error(&self) -> ValidationError {
        ValidationError::DisallowedHost {
            allowed: self.host.clone(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses an absolute URL, treating blank input as malformed.
fn parse_absolute(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MalformedUrl);
    }
    Url::parse(trimmed).map_err(|_| ValidationError::MalformedUrl)
}

/// Rejects every scheme other than `http` and `https`.
fn ensure_http_scheme(url: &Url) -> Result<(), ValidationError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::DisallowedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// Returns true when the URL embeds a username or password.
fn has_credentials(url: &Url) -> bool {
    !url.username().is_empty() || url.password().is_some()
}

/// Normalizes host labels for exact comparisons.
fn normalize_host_label(host: &str) -> String {
    let trimmed = host.strip_suffix('.').unwrap_or(host);
    let trimmed =
        trimmed.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
