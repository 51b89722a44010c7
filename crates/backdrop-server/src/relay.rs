// crates/backdrop-server/src/relay.rs
// ============================================================================
// Module: Relay Service
// Description: Validate, fetch, sanitize, and assemble one upstream document.
// Purpose: Run the relay pipeline without HTTP concerns.
// Dependencies: backdrop-core, backdrop-fetch, tokio
// ============================================================================

//! ## Overview
//! [`RelayService::relay`] runs the pipeline strictly in order: origin check,
//! bounded fetch, sanitization, then assembly. Nothing is fetched unless the
//! target passed the guard. The service holds only read-only state, so
//! concurrent calls share nothing mutable.
//!
//! [`RelayService::preview`] additionally validates a background URL before
//! any fetch and applies it to the assembled document.
//!
//! Callers that hold a scarce resource for the fetch (the server's inflight
//! permits) split each call in two: [`RelayService::prepare_relay`] or
//! [`RelayService::prepare_preview`] validate the parameters without I/O, and
//! [`RelayService::relay_request`] or [`RelayService::preview_request`] run
//! the rest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use backdrop_core::AssembledDocument;
use backdrop_core::BackgroundSelection;
use backdrop_core::FetchRequest;
use backdrop_core::OriginGuard;
use backdrop_core::RawDocument;
use backdrop_core::SanitizationPolicy;
use backdrop_core::ValidationError;
use backdrop_core::assemble;
use backdrop_core::render_preview;
use backdrop_core::sanitize;
use backdrop_fetch::FetchError;
use backdrop_fetch::Fetcher;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Relay failures, each mapped to one HTTP status by the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The profile URL parameter was absent.
    #[error("URL parameter is required")]
    MissingUrl,
    /// The background URL parameter was absent.
    #[error("Background parameter is required")]
    MissingBackground,
    /// A URL failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The upstream fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The concurrency cap was reached.
    #[error("server busy")]
    Busy,
}

impl RelayError {
    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingUrl | Self::MissingBackground => "missing_parameter",
            Self::Validation(err) => err.kind(),
            Self::Fetch(err) => err.kind(),
            Self::Busy => "busy",
        }
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// The relay pipeline bound to one trusted origin.
#[derive(Debug, Clone)]
pub struct RelayService {
    /// Guard applied to every target.
    guard: OriginGuard,
    /// Bounded upstream client.
    fetcher: Fetcher,
    /// Read-only sanitization policy.
    policy: Arc<SanitizationPolicy>,
}

impl RelayService {
    /// Builds a relay service.
    #[must_use]
    pub const fn new(
        guard: OriginGuard,
        fetcher: Fetcher,
        policy: Arc<SanitizationPolicy>,
    ) -> Self {
        Self {
            guard,
            fetcher,
            policy,
        }
    }

    /// Returns the origin guard.
    #[must_use]
    pub const fn guard(&self) -> &OriginGuard {
        &self.guard
    }

    /// Relays one upstream document.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the parameter is missing or invalid, or the
    /// fetch fails.
    pub async fn relay(&self, url_param: Option<&str>) -> Result<AssembledDocument, RelayError> {
        let request = self.prepare_relay(url_param)?;
        self.relay_request(&request).await
    }

    /// Relays one upstream document with a background applied.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when either parameter is missing or invalid, or
    /// the fetch fails. The background is validated before any fetch.
    pub async fn preview(
        &self,
        url_param: Option<&str>,
        background_param: Option<&str>,
    ) -> Result<AssembledDocument, RelayError> {
        let (request, background) = self.prepare_preview(url_param, background_param)?;
        self.preview_request(&request, &background).await
    }

    /// Validates the profile URL parameter without any I/O.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingUrl`] or [`RelayError::Validation`].
    pub fn prepare_relay(&self, url_param: Option<&str>) -> Result<FetchRequest, RelayError> {
        let raw_url = url_param.ok_or(RelayError::MissingUrl)?;
        Ok(self.guard.request(raw_url)?)
    }

    /// Validates the background parameter, then the profile URL parameter.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingBackground`], [`RelayError::MissingUrl`],
    /// or [`RelayError::Validation`].
    pub fn prepare_preview(
        &self,
        url_param: Option<&str>,
        background_param: Option<&str>,
    ) -> Result<(FetchRequest, BackgroundSelection), RelayError> {
        let raw_background = background_param.ok_or(RelayError::MissingBackground)?;
        let background = self.guard.validate_background(raw_background)?;
        Ok((self.prepare_relay(url_param)?, background))
    }

    /// Fetches, sanitizes, and assembles a validated request.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Fetch`] when the upstream fetch fails.
    pub async fn relay_request(
        &self,
        request: &FetchRequest,
    ) -> Result<AssembledDocument, RelayError> {
        let raw = self.fetcher.fetch(request).await?;
        Ok(self.sanitize_and_assemble(&raw))
    }

    /// Relays a validated request and applies the background.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Fetch`] when the upstream fetch fails.
    pub async fn preview_request(
        &self,
        request: &FetchRequest,
        background: &BackgroundSelection,
    ) -> Result<AssembledDocument, RelayError> {
        let assembled = self.relay_request(request).await?;
        let (preview, _) = render_preview(assembled, background);
        Ok(preview)
    }

    /// Runs the CPU-bound stages off the async worker when possible.
    fn sanitize_and_assemble(&self, raw: &RawDocument) -> AssembledDocument {
        let run = || assemble(sanitize(raw, &self.policy), self.guard.origin());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(run)
            }
            _ => run(),
        }
    }
}
