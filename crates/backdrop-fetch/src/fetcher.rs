// crates/backdrop-fetch/src/fetcher.rs
// ============================================================================
// Module: Bounded Fetcher
// Description: Single-GET upstream fetch with redirect, time, and size limits.
// Purpose: Retrieve untrusted profile pages without unbounded resource use.
// Dependencies: backdrop-core, reqwest, tokio, url
// ============================================================================

//! ## Overview
//! The fetcher issues one GET per call through a shared connection pool.
//! Every redirect hop and the final URL must pass the origin guard. A
//! wall-clock timeout covers connect, headers, and body; dropping the request
//! future on timeout releases the connection and the partial body. The body
//! is streamed chunk by chunk against a hard byte ceiling.
//! Security posture: upstream responses are untrusted and may lie about their
//! length, stall, or redirect elsewhere.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error as StdError;
use std::time::Duration;

use backdrop_core::FetchRequest;
use backdrop_core::OriginGuard;
use backdrop_core::RawDocument;
use reqwest::Client;
use reqwest::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default wall-clock budget for one fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default response body ceiling.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Default redirect hop limit.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Default identifying user agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                      (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures of a single fetch.
///
/// # Invariants
/// - Only [`FetchError::UpstreamError`] carries an upstream status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The wall-clock budget elapsed.
    #[error("upstream request timed out")]
    FetchTimeout,
    /// The body exceeded the byte ceiling.
    #[error("response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Configured ceiling in bytes.
        limit: usize,
    },
    /// DNS, TLS, connection, or protocol failure.
    #[error("network error: {cause}")]
    NetworkError {
        /// Description of the underlying failure.
        cause: String,
    },
    /// A redirect hop or the final URL left the allowed origin.
    #[error("redirect to {location} leaves the allowed origin")]
    DisallowedRedirect {
        /// Rejected location.
        location: String,
    },
    /// Upstream answered with a non-success status.
    #[error("Upstream returned {status}: {status_text}")]
    UpstreamError {
        /// Upstream HTTP status code.
        status: u16,
        /// Reason phrase for the status.
        status_text: String,
    },
}

impl FetchError {
    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::FetchTimeout => "fetch_timeout",
            Self::ResponseTooLarge {
                ..
            } => "response_too_large",
            Self::NetworkError {
                ..
            } => "network_error",
            Self::DisallowedRedirect {
                ..
            } => "disallowed_redirect",
            Self::UpstreamError {
                ..
            } => "upstream_error",
        }
    }
}

/// Failure to build the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("http client build failed: {0}")]
pub struct FetcherBuildError(
    /// Client builder failure message.
    String,
);

/// Redirect hop rejected by the origin guard.
#[derive(Debug, Error)]
#[error("redirect to {location} leaves the allowed origin")]
struct DisallowedHop {
    /// Rejected location.
    location: String,
}

/// Redirect chain longer than the configured limit.
#[derive(Debug, Error)]
#[error("too many redirects (limit {limit})")]
struct TooManyRedirects {
    /// Configured hop limit.
    limit: usize,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Limits and identity for outbound fetches.
///
/// # Invariants
/// - `timeout` covers the whole request lifecycle including the body.
/// - `max_body_bytes` is a hard ceiling on buffered body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    /// Wall-clock budget per fetch.
    pub timeout: Duration,
    /// Response body ceiling in bytes.
    pub max_body_bytes: usize,
    /// Maximum redirect hops followed.
    pub max_redirects: usize,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Fetcher
// ============================================================================

/// Bounded HTTP fetcher bound to one origin guard.
///
/// # Invariants
/// - Holds no per-request state; concurrent calls share only the pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    /// Pooled HTTP client.
    client: Client,
    /// Guard re-applied to redirect hops and the final URL.
    guard: OriginGuard,
    /// Limits and identity.
    config: FetcherConfig,
}

impl Fetcher {
    /// Builds a fetcher and its connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`FetcherBuildError`] when the HTTP client cannot be created.
    pub fn new(guard: OriginGuard, config: FetcherConfig) -> Result<Self, FetcherBuildError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy(guard.clone(), config.max_redirects))
            .build()
            .map_err(|err| FetcherBuildError(err.to_string()))?;
        Ok(Self {
            client,
            guard,
            config,
        })
    }

    /// Returns the fetcher configuration.
    #[must_use]
    pub const fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetches a validated target.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on timeout, oversized body, network failure,
    /// off-origin redirect, or non-success status.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError> {
        tokio::time::timeout(self.config.timeout, self.fetch_unbounded(request.target_url()))
            .await
            .unwrap_or(Err(FetchError::FetchTimeout))
    }

    /// Performs the fetch without the outer wall-clock bound.
    async fn fetch_unbounded(&self, url: &Url) -> Result<RawDocument, FetchError> {
        let mut response = self.client.get(url.clone()).send().await.map_err(classify)?;
        if self.guard.check(response.url()).is_err() {
            return Err(FetchError::DisallowedRedirect {
                location: response.url().to_string(),
            });
        }
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamError {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = read_body_limited(&mut response, self.config.max_body_bytes).await?;
        Ok(RawDocument::new(body, content_type))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a redirect policy that re-validates every hop.
fn redirect_policy(guard: OriginGuard, max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error(TooManyRedirects {
                limit: max_redirects,
            });
        }
        if guard.check(attempt.url()).is_err() {
            let location = attempt.url().to_string();
            return attempt.error(DisallowedHop {
                location,
            });
        }
        attempt.follow()
    })
}

/// Streams the body while enforcing the byte ceiling.
async fn read_body_limited(response: &mut Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    let limit_u64 = u64::try_from(limit).unwrap_or(u64::MAX);
    if let Some(declared) = response.content_length()
        && declared > limit_u64
    {
        return Err(FetchError::ResponseTooLarge {
            limit,
        });
    }
    let initial = response
        .content_length()
        .and_then(|declared| usize::try_from(declared).ok())
        .unwrap_or(0)
        .min(limit);
    let mut body = Vec::with_capacity(initial);
    while let Some(chunk) = response.chunk().await.map_err(classify)? {
        if body.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge {
                limit,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Maps a client error onto the fetch taxonomy.
fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::FetchTimeout;
    }
    if let Some(hop) = find_source::<DisallowedHop>(&err) {
        return FetchError::DisallowedRedirect {
            location: hop.location.clone(),
        };
    }
    FetchError::NetworkError {
        cause: describe(&err),
    }
}

/// Finds an error of type `T` in the source chain.
fn find_source<'a, T: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut current = Some(err);
    while let Some(candidate) = current {
        if let Some(found) = candidate.downcast_ref::<T>() {
            return Some(found);
        }
        current = candidate.source();
    }
    None
}

/// Renders an error with its source chain.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
