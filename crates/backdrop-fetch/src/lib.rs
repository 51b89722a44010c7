// crates/backdrop-fetch/src/lib.rs
// ============================================================================
// Module: Backdrop Fetch Library
// Description: Bounded async HTTP fetching for the relay.
// Purpose: Expose the fetcher, its configuration, and its error taxonomy.
// Dependencies: backdrop-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! `backdrop-fetch` is the only part of the relay that performs network I/O.
//! It turns a validated [`backdrop_core::FetchRequest`] into a
//! [`backdrop_core::RawDocument`] or a classified [`FetchError`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod fetcher;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fetcher::DEFAULT_MAX_BODY_BYTES;
pub use fetcher::DEFAULT_MAX_REDIRECTS;
pub use fetcher::DEFAULT_TIMEOUT;
pub use fetcher::DEFAULT_USER_AGENT;
pub use fetcher::FetchError;
pub use fetcher::Fetcher;
pub use fetcher::FetcherBuildError;
pub use fetcher::FetcherConfig;
