//! Retailer price lookup.
//!
//! For a hot item, searches DuckDuckGo's HTML endpoint for Australian
//! retailer pages, visits at most `max_results` of them, and pulls a price
//! off each page that looks like the same product.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::ScrapeError;
use crate::browser::{Page, PageSource};
use crate::config::Config;
use crate::html::{element_text, parse_selector, text_without_sup};
use crate::model::RetailerPrice;

/// Marketplaces excluded from both the query and the result links.
pub const EXCLUDED_SITES: &[&str] = &["ebay", "amazon", "catch", "kogan"];

const RESULT_LINK: &str = "a.result__a";
const REQUIRED_DOMAIN: &str = ".com.au";

const BLOCKED_TITLE_MARKERS: &[&str] = &["access denied", "403", "blocked", "captcha", "just a moment"];
const BLOCKED_HEADING_MARKERS: &[&str] = &["access denied", "403", "blocked"];

const PRICE_SELECTORS: &[&str] = &[
    "[itemprop='price']",
    ".price",
    ".product-price",
    "[class*='price']",
    "[data-testid*='price']",
    ".offer-price",
];

const MIN_PRICE: f64 = 0.5;
const MAX_PRICE: f64 = 50_000.0;

const AMOUNT: &str = r"\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?";

static PRICE_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(AMOUNT).expect("valid regex"));
static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\$\s*({AMOUNT})")).expect("valid regex"));

/// Search engine query for an item title, with marketplaces excluded.
#[must_use]
pub fn search_query(title: &str) -> String {
    let exclusions: Vec<String> = EXCLUDED_SITES.iter().map(|site| format!("-{site}")).collect();
    format!("{} {}", title.trim(), exclusions.join(" "))
}

/// Search URL for an item title, restricted to the Australian region.
///
/// # Errors
///
/// Returns [`ScrapeError::Config`] if `endpoint` is not a valid URL.
pub fn search_url(endpoint: &str, title: &str) -> Result<String, ScrapeError> {
    let query = search_query(title);
    Url::parse_with_params(endpoint, &[("q", query.as_str()), ("kl", "au-en")])
        .map(String::from)
        .map_err(|e| ScrapeError::Config(format!("invalid search endpoint '{endpoint}': {e}")))
}

/// Resolves a result link to the retailer URL it points at. Redirect links
/// carry the target in their `uddg` parameter; one without it is dropped.
#[must_use]
pub fn decode_result_link(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_owned()
    };

    if !absolute.contains("uddg=") {
        return Some(absolute);
    }
    let parsed = Url::parse(&absolute).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, target)| target.into_owned())
        .filter(|target| !target.is_empty())
}

/// Whether a URL belongs to an Australian retailer rather than a
/// marketplace.
#[must_use]
pub fn is_retailer_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains(REQUIRED_DOMAIN) && EXCLUDED_SITES.iter().all(|site| !lower.contains(site))
}

/// Retailer links from a search results page, in result order, stopping at
/// `max_results`.
#[must_use]
pub fn parse_search_results(html: &str, max_results: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = parse_selector(RESULT_LINK) else {
        return Vec::new();
    };

    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&selector) {
        if links.len() >= max_results {
            break;
        }
        let Some(url) = anchor.value().attr("href").and_then(decode_result_link) else {
            continue;
        };
        if is_retailer_url(&url) && !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

/// Reads a price string, accepting it only within a plausible range.
#[must_use]
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != '$').collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    (MIN_PRICE..=MAX_PRICE).contains(&value).then_some(value)
}

/// Whether the page is a bot wall or error page rather than a product page.
#[must_use]
pub fn is_access_denied(page: &Page) -> bool {
    let title = page.title.to_lowercase();
    if BLOCKED_TITLE_MARKERS.iter().any(|m| title.contains(m)) {
        return true;
    }

    let document = page.document();
    let Ok(headings) = parse_selector("h1, h2") else {
        return false;
    };
    document.select(&headings).any(|heading| {
        let text = element_text(heading).to_lowercase();
        BLOCKED_HEADING_MARKERS.iter().any(|m| text.contains(m))
    })
}

/// Finds a product price on a retailer page, trying in order: JSON-LD
/// offers, the `product:price:amount` meta tag, common price elements, and
/// finally the largest dollar amount in the body text.
#[must_use]
pub fn extract_price(page: &Page) -> Option<f64> {
    if is_access_denied(page) {
        log::info!("Blocked page at {}, skipping price extraction", page.url);
        return None;
    }

    let document = page.document();
    price_from_json_ld(&document)
        .or_else(|| price_from_meta(&document))
        .or_else(|| price_from_elements(&document))
        .or_else(|| price_from_body(&document))
}

fn price_from_json_ld(document: &Html) -> Option<f64> {
    let selector = parse_selector("script[type='application/ld+json']").ok()?;
    document.select(&selector).find_map(|script| {
        let raw: String = script.text().collect();
        let data: Value = serde_json::from_str(&raw).ok()?;
        json_ld_nodes(&data).into_iter().find_map(offer_price)
    })
}

/// Top-level JSON-LD objects, flattening arrays and `@graph` lists.
fn json_ld_nodes(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().flat_map(json_ld_nodes).collect(),
        Value::Object(map) => match map.get("@graph") {
            Some(graph) => json_ld_nodes(graph),
            None => vec![data],
        },
        _ => Vec::new(),
    }
}

fn offer_price(node: &Value) -> Option<f64> {
    let offers = node.get("offers")?;
    let candidates: Vec<&Value> = match offers {
        Value::Array(list) => list.iter().collect(),
        other => vec![other],
    };
    candidates.into_iter().find_map(|offer| match offer.get("price")? {
        Value::Number(n) => n.as_f64().and_then(|v| parse_price(&v.to_string())),
        Value::String(s) => parse_price(s),
        _ => None,
    })
}

fn price_from_meta(document: &Html) -> Option<f64> {
    let selector = parse_selector("meta[property='product:price:amount']").ok()?;
    let content = document.select(&selector).next()?.value().attr("content")?;
    parse_price(content)
}

fn price_from_elements(document: &Html) -> Option<f64> {
    PRICE_SELECTORS.iter().find_map(|sel| {
        let selector = parse_selector(sel).ok()?;
        document.select(&selector).find_map(element_price)
    })
}

fn element_price(element: ElementRef<'_>) -> Option<f64> {
    let text = text_without_sup(element);
    let amount = PRICE_TEXT.find(text.trim())?;
    parse_price(amount.as_str())
}

fn price_from_body(document: &Html) -> Option<f64> {
    let selector = parse_selector("body").ok()?;
    let body = element_text(document.select(&selector).next()?);
    DOLLAR_AMOUNT
        .captures_iter(&body)
        .filter_map(|c| parse_price(&c[1]))
        .max_by(f64::total_cmp)
}

fn title_tokens(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 3)
        .map(str::to_owned)
        .collect()
}

/// Share of the item title's significant words (three or more characters)
/// that also appear in the page title. An item title with no such words
/// matches anything.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn title_overlap(item_title: &str, page_title: &str) -> f64 {
    let wanted = title_tokens(item_title);
    if wanted.is_empty() {
        return 1.0;
    }
    let found = title_tokens(page_title);
    wanted.intersection(&found).count() as f64 / wanted.len() as f64
}

/// Looks up retailer prices for hot items through a [`PageSource`].
pub struct RetailerFinder<'a, S> {
    source: &'a S,
    config: &'a Config,
}

impl<'a, S: PageSource> RetailerFinder<'a, S> {
    #[must_use]
    pub const fn new(source: &'a S, config: &'a Config) -> Self {
        Self { source, config }
    }

    /// Searches for `title` and visits up to `max_results` retailer links.
    ///
    /// Every page that loads produces a record; the price is set only when
    /// the page title matches the item and a price was found. Pages that
    /// fail to load are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Retrieval`] if the search page itself cannot be
    /// loaded, or [`ScrapeError::Config`] if the search endpoint is invalid.
    pub async fn find(&self, item_id: &str, title: &str) -> Result<Vec<RetailerPrice>, ScrapeError> {
        let url = search_url(&self.config.search_url, title)?;
        log::info!("Searching retailers for {item_id}");
        let results = self.source.fetch(&url, Some(RESULT_LINK)).await?;

        let candidates = parse_search_results(&results.html, self.config.max_results);
        log::info!("Found {} AU retailer links for {item_id}", candidates.len());

        let mut records = Vec::new();
        for candidate in candidates.iter().take(self.config.max_results) {
            tokio::time::sleep(self.config.retailer_delay()).await;
            log::debug!("Visiting {candidate}");

            let page = match self.source.fetch(candidate, None).await {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("Skipping {candidate}: {e}");
                    continue;
                }
            };
            records.push(self.price_record(item_id, title, &page));
        }
        Ok(records)
    }

    fn price_record(&self, item_id: &str, title: &str, page: &Page) -> RetailerPrice {
        let overlap = title_overlap(title, &page.title);
        let matched = overlap >= self.config.min_title_overlap;
        let price = if matched { extract_price(page) } else { None };

        match (matched, price) {
            (true, Some(p)) => log::info!("Price found at {}: {p:.2}", page.url),
            (true, None) => log::info!("No price found at {}", page.url),
            (false, _) => log::info!(
                "{} does not look like the same product ({:.0}% title overlap)",
                page.url,
                overlap * 100.0
            ),
        }

        RetailerPrice {
            item_id: item_id.to_owned(),
            url: page.url.clone(),
            matched_title: matched.then(|| page.title.clone()),
            price,
        }
    }
}
