// crates/backdrop-server/src/catalog.rs
// ============================================================================
// Module: Background Catalog
// Description: Validated list of selectable profile background images.
// Purpose: Load, build, and serialize the catalog served to the embedder.
// Dependencies: backdrop-core, serde_json, url
// ============================================================================

//! ## Overview
//! The catalog is a JSON array of absolute http(s) image URLs. It is read
//! once when the server starts and served verbatim; the relay never fetches
//! or sanitizes its entries.
//!
//! [`BackgroundCatalog::from_scraped`] turns raw scraper output into a
//! catalog: only profile background URLs are kept, query strings are
//! removed, and duplicates collapse onto their first occurrence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use backdrop_core::BackgroundSelection;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Path marker that identifies profile background images.
pub const PROFILE_BACKGROUND_MARKER: &str = "profilebackground";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog loading and validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("catalog io error: {0}")]
    Io(String),
    /// The catalog file exceeds the configured ceiling.
    #[error("catalog exceeds {limit} bytes")]
    TooLarge {
        /// Configured ceiling in bytes.
        limit: usize,
    },
    /// The catalog is not a JSON array of strings.
    #[error("catalog parse error: {0}")]
    Parse(String),
    /// An entry is not an absolute http(s) URL.
    #[error("catalog entry {index} rejected: {reason}")]
    InvalidEntry {
        /// Zero-based entry position.
        index: usize,
        /// Validation failure.
        reason: String,
    },
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Ordered list of background image URLs.
///
/// # Invariants
/// - Every entry is an absolute http(s) URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundCatalog {
    /// Entries in serving order.
    entries: Vec<Url>,
}

impl BackgroundCatalog {
    /// Loads and validates a catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the file is unreadable, too large, not a
    /// JSON string array, or holds an invalid URL.
    pub fn load(path: &Path, max_bytes: usize) -> Result<Self, CatalogError> {
        let bytes = fs::read(path).map_err(|err| CatalogError::Io(err.to_string()))?;
        if bytes.len() > max_bytes {
            return Err(CatalogError::TooLarge {
                limit: max_bytes,
            });
        }
        Self::from_json(&bytes)
    }

    /// Parses and validates catalog JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] for anything but an array of strings and
    /// [`CatalogError::InvalidEntry`] for a non-http(s) or relative URL.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CatalogError> {
        let raw: Vec<String> =
            serde_json::from_slice(bytes).map_err(|err| CatalogError::Parse(err.to_string()))?;
        let entries = raw
            .iter()
            .enumerate()
            .map(|(index, value)| {
                BackgroundSelection::parse(value)
                    .map(|selection| selection.image_url().clone())
                    .map_err(|err| CatalogError::InvalidEntry {
                        index,
                        reason: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            entries,
        })
    }

    /// Builds a catalog from scraper output.
    ///
    /// The input is either a JSON array of strings or one URL per line.
    /// Entries without the profile background marker, and entries that are
    /// not absolute http(s) URLs once the query is removed, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] when input that looks like JSON does not
    /// parse as an array of strings.
    pub fn from_scraped(input: &str) -> Result<Self, CatalogError> {
        let candidates: Vec<String> = if input.trim_start().starts_with('[') {
            serde_json::from_str(input).map_err(|err| CatalogError::Parse(err.to_string()))?
        } else {
            input.lines().map(str::to_string).collect()
        };
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for candidate in &candidates {
            let trimmed = candidate.trim();
            if !trimmed.contains(PROFILE_BACKGROUND_MARKER) {
                continue;
            }
            let cleaned = trimmed.split_once('?').map_or(trimmed, |(head, _)| head);
            let Ok(selection) = BackgroundSelection::parse(cleaned) else {
                continue;
            };
            if seen.insert(cleaned.to_string()) {
                entries.push(selection.image_url().clone());
            }
        }
        Ok(Self {
            entries,
        })
    }

    /// Returns the entries in serving order.
    #[must_use]
    pub fn entries(&self) -> &[Url] {
        &self.entries
    }

    /// Returns the number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the catalog has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the catalog as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] when serialization fails.
    pub fn to_json(&self) -> Result<String, CatalogError> {
        let values: Vec<&str> = self.entries.iter().map(Url::as_str).collect();
        serde_json::to_string_pretty(&values).map_err(|err| CatalogError::Parse(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
