#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Hot-item scanner for eBay storefronts.
//!
//! The crate runs three stages in order:
//!
//! 1. [`listing`] polls a store's "sold items" search and turns each listing
//!    card into an [`model::Observation`], appended to a per-store log.
//! 2. [`hot`] groups the logged observations by item and keeps the items whose
//!    quantity-sold counter changed often enough inside the trailing window.
//! 3. [`retailer`] searches for each hot item at Australian retailers and
//!    records any prices it can pull off the result pages.
//!
//! [`pipeline`] wires the stages together around the flat files in
//! [`records`]. Every page load goes through the [`browser::PageSource`]
//! trait, so the scraping logic runs the same against a real WebDriver
//! session, a plain HTTP client, or canned HTML in tests.

pub mod browser;
pub mod config;
pub mod hot;
pub mod html;
pub mod listing;
pub mod model;
pub mod pipeline;
pub mod records;
pub mod retailer;

/// Errors raised while scraping, filtering, or writing results.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// A page could not be loaded (navigation failure, timeout, bad status).
    #[error("failed to retrieve {url}: {reason}")]
    Retrieval {
        /// The URL that was being loaded.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// A page or file did not have the expected structure.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The WebDriver session could not be created or driven.
    #[error("WebDriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    /// The HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or writing a CSV file failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Writing a JSON report failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file or flags were invalid.
    #[error("Config error: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Builds a [`ScrapeError::Retrieval`] for `url`.
    pub fn retrieval(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::Retrieval {
            url: url.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error only affects a single page or item, so the caller
    /// can log it and move on.
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::Retrieval { .. } | Self::Parse(_))
    }
}
