//! Pipeline settings.
//!
//! Every stage receives a [`Config`] explicitly. Values come from the
//! defaults below, optionally replaced by a TOML file and then by
//! command-line flags.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::ScrapeError;

/// Which page loader the scraping stages use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A browser driven through a WebDriver server (chromedriver).
    #[default]
    #[value(name = "webdriver")]
    WebDriver,
    /// Plain HTTP requests. No JavaScript runs, so some retailers render
    /// without prices.
    Http,
}

/// Settings shared by all three stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Length of the trailing window, in days.
    pub days_limit: i64,
    /// Minimum number of counter changes for an item to count as hot.
    pub min_sales: usize,
    /// Upper bound on hot items handed to the retailer search.
    pub max_items: Option<usize>,
    /// Upper bound on retailer pages visited per item.
    pub max_results: usize,
    /// Upper bound on search-result pages scanned per poll.
    pub max_pages: Option<u32>,
    /// Run the browser without a window.
    pub headless: bool,
    pub backend: Backend,
    /// eBay site the store lives on.
    pub base_url: String,
    /// HTML endpoint of the search engine used for retailer lookups.
    pub search_url: String,
    /// Address of the WebDriver server.
    pub webdriver_url: String,
    /// Pause between consecutive listing pages.
    pub page_delay_ms: u64,
    /// Pause before each retailer page visit.
    pub retailer_delay_ms: u64,
    pub navigation_timeout_secs: u64,
    /// How long to wait for a page's key selector to appear.
    pub wait_timeout_secs: u64,
    /// Share of the item title's words a retailer page title must contain.
    pub min_title_overlap: f64,
    /// Directory that holds the logs, result CSVs and report folders.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            days_limit: 14,
            min_sales: 3,
            max_items: Some(10),
            max_results: 15,
            max_pages: None,
            headless: false,
            backend: Backend::WebDriver,
            base_url: "https://www.ebay.com.au".to_owned(),
            search_url: "https://duckduckgo.com/html/".to_owned(),
            webdriver_url: "http://localhost:9515".to_owned(),
            page_delay_ms: 1500,
            retailer_delay_ms: 2000,
            navigation_timeout_secs: 60,
            wait_timeout_secs: 15,
            min_title_overlap: 0.5,
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Reads a TOML config file. Keys that are absent keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Io`] if the file cannot be read and
    /// [`ScrapeError::Config`] if it is not valid TOML or fails
    /// [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self, ScrapeError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)
            .map_err(|e| ScrapeError::Config(format!("{}: {e}", path.display())))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Config`] on malformed TOML or invalid values.
    pub fn from_toml(raw: &str) -> Result<Self, ScrapeError> {
        let config: Self = toml::from_str(raw).map_err(|e| ScrapeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.days_limit < 0 {
            return Err(ScrapeError::Config(format!(
                "days_limit must not be negative (got {})",
                self.days_limit
            )));
        }
        if window_start(Utc::now(), self.days_limit).is_none() {
            return Err(ScrapeError::Config(format!(
                "days_limit is too large to compute a window start (got {})",
                self.days_limit
            )));
        }
        // A threshold of zero would let items with a single observation through.
        if self.min_sales == 0 {
            return Err(ScrapeError::Config("min_sales must be at least 1".to_owned()));
        }
        if self.max_results == 0 {
            return Err(ScrapeError::Config("max_results must be at least 1".to_owned()));
        }
        if !(0.0..=1.0).contains(&self.min_title_overlap) {
            return Err(ScrapeError::Config(format!(
                "min_title_overlap must be between 0 and 1 (got {})",
                self.min_title_overlap
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn page_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.page_delay_ms)
    }

    #[must_use]
    pub const fn retailer_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retailer_delay_ms)
    }
}

/// Start of a trailing window of `days` days ending at `now`, or `None` when
/// it falls outside the representable date range.
#[must_use]
pub fn window_start(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(TimeDelta::try_days(days)?)
}
