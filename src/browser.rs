//! Page loading.
//!
//! The scrapers only ever need "load this URL and give me its HTML", so that
//! is what [`PageSource`] offers. [`WebDriverSource`] drives a real browser
//! through a WebDriver server, [`HttpSource`] fetches pages with `reqwest`,
//! and [`Session`] picks one of them from the [`Config`].

use std::future::Future;
use std::time::Duration;

use reqwest::header::USER_AGENT;
use scraper::Html;
use thirtyfour::ChromiumLikeCapabilities;
use thirtyfour::prelude::*;

use crate::ScrapeError;
use crate::config::{Backend, Config};
use crate::html::document_title;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Poll interval while waiting for a selector to appear.
const WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// A loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// URL the page was requested with.
    pub url: String,
    pub title: String,
    pub html: String,
}

impl Page {
    #[must_use]
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Something that can turn a URL into a [`Page`].
pub trait PageSource {
    /// Loads `url`. When `wait_for` is given, implementations that render
    /// JavaScript give the page a chance to show an element matching that
    /// selector before capturing it. A selector that never appears is not an
    /// error; the caller sees whatever the page contained.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Retrieval`] if the page cannot be loaded.
    fn fetch(&self, url: &str, wait_for: Option<&str>) -> impl Future<Output = Result<Page, ScrapeError>>;
}

/// A Chrome session driven through a WebDriver server.
pub struct WebDriverSource {
    driver: WebDriver,
    wait_timeout: Duration,
}

impl WebDriverSource {
    /// Starts a new browser session.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::WebDriver`] if the WebDriver server is not
    /// reachable or rejects the capabilities.
    pub async fn start(config: &Config) -> Result<Self, ScrapeError> {
        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.set_headless()?;
        }
        caps.add_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_arg("--lang=en-AU")?;
        caps.add_arg("--window-size=1366,768")?;
        caps.add_arg(&format!("--user-agent={DESKTOP_USER_AGENT}"))?;

        log::info!(
            "Starting browser session via {} (headless: {})",
            config.webdriver_url,
            config.headless
        );
        let driver = WebDriver::new(config.webdriver_url.as_str(), caps).await?;
        driver
            .set_page_load_timeout(Duration::from_secs(config.navigation_timeout_secs))
            .await?;

        Ok(Self {
            driver,
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
        })
    }

    /// Ends the browser session.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::WebDriver`] if the server refuses to close it.
    pub async fn quit(self) -> Result<(), ScrapeError> {
        self.driver.quit().await?;
        Ok(())
    }
}

impl PageSource for WebDriverSource {
    async fn fetch(&self, url: &str, wait_for: Option<&str>) -> Result<Page, ScrapeError> {
        log::debug!("Navigating to {url}");
        self.driver
            .goto(url)
            .await
            .map_err(|e| ScrapeError::retrieval(url, e))?;

        if let Some(selector) = wait_for
            && let Err(e) = self
                .driver
                .query(By::Css(selector.to_owned()))
                .wait(self.wait_timeout, WAIT_INTERVAL)
                .first()
                .await
        {
            log::debug!("'{selector}' did not appear on {url}: {e}");
        }

        let html = self
            .driver
            .source()
            .await
            .map_err(|e| ScrapeError::retrieval(url, e))?;
        let title = self.driver.title().await.unwrap_or_default();

        Ok(Page {
            url: url.to_owned(),
            title,
            html,
        })
    }
}

/// Fetches pages with plain HTTP requests. Ignores `wait_for`, since
/// nothing renders.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Http`] if the client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.navigation_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    async fn fetch(&self, url: &str, _wait_for: Option<&str>) -> Result<Page, ScrapeError> {
        log::debug!("Fetching {url}");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, DESKTOP_USER_AGENT)
            .send()
            .await
            .map_err(|e| ScrapeError::retrieval(url, e))?;

        let status = response.status();
        if !keeps_body(status) {
            return Err(ScrapeError::retrieval(url, format!("HTTP status {status}")));
        }
        if status.is_client_error() {
            log::debug!("{url} answered {status}, keeping the page body");
        }

        let html = response
            .text()
            .await
            .map_err(|e| ScrapeError::retrieval(url, e))?;
        let title = document_title(&Html::parse_document(&html));

        Ok(Page {
            url: url.to_owned(),
            title,
            html,
        })
    }
}

/// Bot walls answer with 4xx but still send a page, so client errors are
/// handed on for blocked-page detection. Server errors are not.
fn keeps_body(status: reqwest::StatusCode) -> bool {
    status.is_success() || status.is_client_error()
}

/// The page source chosen by [`Config::backend`]. One session serves a whole
/// stage.
pub enum Session {
    WebDriver(WebDriverSource),
    Http(HttpSource),
}

impl Session {
    /// Opens the configured backend.
    ///
    /// # Errors
    ///
    /// Propagates the backend's start-up error.
    pub async fn open(config: &Config) -> Result<Self, ScrapeError> {
        match config.backend {
            Backend::WebDriver => Ok(Self::WebDriver(WebDriverSource::start(config).await?)),
            Backend::Http => Ok(Self::Http(HttpSource::new(config)?)),
        }
    }

    /// Releases the session. Failures are logged, not returned, so closing
    /// never masks the stage's own result.
    pub async fn close(self) {
        if let Self::WebDriver(source) = self
            && let Err(e) = source.quit().await
        {
            log::warn!("Failed to close browser session: {e}");
        }
    }
}

impl PageSource for Session {
    async fn fetch(&self, url: &str, wait_for: Option<&str>) -> Result<Page, ScrapeError> {
        match self {
            Self::WebDriver(source) => source.fetch(url, wait_for).await,
            Self::Http(source) => source.fetch(url, wait_for).await,
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory page source for tests.

    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use super::{Page, PageSource};
    use crate::ScrapeError;
    use crate::html::document_title;

    /// Serves canned HTML by exact URL, with an optional fallback page, and
    /// remembers every URL requested.
    #[derive(Default)]
    pub struct StaticPages {
        pages: BTreeMap<String, String>,
        fallback: Option<String>,
        requests: RefCell<Vec<String>>,
    }

    impl StaticPages {
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_owned(), html.to_owned());
            self
        }

        #[must_use]
        pub fn with_fallback(mut self, html: &str) -> Self {
            self.fallback = Some(html.to_owned());
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.borrow().clone()
        }
    }

    impl PageSource for StaticPages {
        async fn fetch(&self, url: &str, _wait_for: Option<&str>) -> Result<Page, ScrapeError> {
            self.requests.borrow_mut().push(url.to_owned());
            let html = self
                .pages
                .get(url)
                .or(self.fallback.as_ref())
                .cloned()
                .ok_or_else(|| ScrapeError::retrieval(url, "no such page"))?;
            let title = document_title(&scraper::Html::parse_document(&html));
            Ok(Page {
                url: url.to_owned(),
                title,
                html,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn client_error_pages_are_kept_for_inspection() {
        assert!(keeps_body(StatusCode::OK));
        assert!(keeps_body(StatusCode::FORBIDDEN));
        assert!(keeps_body(StatusCode::TOO_MANY_REQUESTS));
        assert!(!keeps_body(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!keeps_body(StatusCode::SERVICE_UNAVAILABLE));
    }
}
