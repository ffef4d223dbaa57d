//! Store listing scraper.
//!
//! Walks the store's "sold items" search newest-first and yields one
//! [`Observation`] per listing card until the cards fall out of the
//! trailing window, the pages run out, or `max_pages` is reached.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use futures::Stream;
use regex::Regex;
use scraper::{ElementRef, Html};

use crate::browser::PageSource;
use crate::config::{Config, window_start};
use crate::html::{element_text, parse_selector, text_from_selectors};
use crate::model::Observation;

/// Selector for one listing card on the search results page.
pub const LISTING_CARD: &str = "li.s-card";

const SOLD_MARKER: &str = r#"span[aria-label="Sold item"]"#;
const TITLE_SELECTORS: &[&str] = &["div.s-card__title span", "div.s-card__title"];
const PRICE_SELECTORS: &[&str] = &["span.s-card__price"];

static QUANTITY_SOLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d{1,3}(?:,\d{3})+|\d+)\+?\s+sold\s*$").expect("valid regex")
});

/// What a single listing card shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCard {
    pub item_id: String,
    pub title: String,
    pub price: String,
    pub quantity_sold: Option<u64>,
    /// Date from the "Sold ..." marker. `None` if the date was unreadable.
    pub sold_on: Option<NaiveDate>,
}

impl ListingCard {
    #[must_use]
    pub fn into_observation(self, observed_at: DateTime<Utc>) -> Observation {
        Observation {
            item_id: self.item_id,
            observed_at,
            quantity_sold: self.quantity_sold,
            price: self.price,
            title: self.title,
        }
    }
}

/// URL of one page of the store's sold listings, newest first.
#[must_use]
pub fn search_url(base_url: &str, store: &str, page_number: u32) -> String {
    format!(
        "{}/sch/i.html?_ssn={store}&LH_Sold=1&LH_Complete=1&_sop=13&_ipg=200&_pgn={page_number}",
        base_url.trim_end_matches('/')
    )
}

/// Parses the date out of a sold marker such as `Sold 18 Feb 2026` or
/// `Sold Feb 18, 2026`.
#[must_use]
pub fn parse_sold_date(text: &str) -> Option<NaiveDate> {
    let cleaned = text.replace("Sold", "");
    let cleaned = cleaned.trim();

    NaiveDate::parse_from_str(cleaned, "%d %b %Y")
        .or_else(|_| NaiveDate::parse_from_str(cleaned, "%b %d, %Y"))
        .ok()
}

/// Reads an `N sold` counter from a single piece of card text.
#[must_use]
pub fn parse_quantity_sold(text: &str) -> Option<u64> {
    let captures = QUANTITY_SOLD.captures(text)?;
    captures[1].replace(',', "").parse().ok()
}

/// Extracts every usable card from a search results page. Cards missing an
/// item id or a sold marker are skipped.
#[must_use]
pub fn parse_listing_page(html: &str) -> Vec<ListingCard> {
    let document = Html::parse_document(html);
    let (Ok(card_selector), Ok(sold_selector)) = (parse_selector(LISTING_CARD), parse_selector(SOLD_MARKER))
    else {
        return Vec::new();
    };

    let mut cards = Vec::new();
    for card in document.select(&card_selector) {
        let Some(item_id) = card.value().attr("data-listingid").filter(|id| !id.is_empty()) else {
            log::debug!("Skipping card without a listing id");
            continue;
        };
        let Some(sold_marker) = card.select(&sold_selector).next() else {
            log::debug!("Skipping card {item_id} without a sold marker");
            continue;
        };

        let sold_text = element_text(sold_marker);
        let sold_on = parse_sold_date(&sold_text);
        if sold_on.is_none() {
            log::warn!("Could not parse sold date '{sold_text}' for {item_id}");
        }

        cards.push(ListingCard {
            item_id: item_id.to_owned(),
            title: text_from_selectors(card, TITLE_SELECTORS),
            price: text_from_selectors(card, PRICE_SELECTORS),
            quantity_sold: card_quantity_sold(card),
            sold_on,
        });
    }
    cards
}

fn card_quantity_sold(card: ElementRef<'_>) -> Option<u64> {
    card.text().find_map(parse_quantity_sold)
}

/// Polls the store once, yielding an [`Observation`] per card stamped with
/// `now`.
///
/// The stream is lazy and single-pass: each page is only loaded once the
/// previous page's observations have been consumed. A page that fails to
/// load ends the stream, since later pages cannot be reached reliably
/// without it.
pub fn observations<'a, S: PageSource>(
    source: &'a S,
    config: &'a Config,
    store: &'a str,
    now: DateTime<Utc>,
) -> impl Stream<Item = Observation> + 'a {
    let cutoff = window_start(now, config.days_limit)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .date_naive();

    async_stream::stream! {
        let mut page_number: u32 = 1;

        loop {
            if config.max_pages.is_some_and(|max| page_number > max) {
                log::info!("Reached max pages, stopping");
                break;
            }

            let url = search_url(&config.base_url, store, page_number);
            log::info!("Scraping page {page_number} of {store}");
            let page = match source.fetch(&url, Some(LISTING_CARD)).await {
                Ok(page) => page,
                Err(e) => {
                    log::error!("Stopping scan of {store}: {e}");
                    break;
                }
            };

            let cards = parse_listing_page(&page.html);
            if cards.is_empty() {
                log::info!("No listings on page {page_number}, scan complete");
                break;
            }
            log::debug!("Page {page_number}: {} listings", cards.len());

            let mut reached_cutoff = false;
            for card in cards {
                if card.sold_on.is_some_and(|sold_on| sold_on < cutoff) {
                    log::info!("Reached sales older than {cutoff}, stopping");
                    reached_cutoff = true;
                    break;
                }
                yield card.into_observation(now);
            }
            if reached_cutoff {
                break;
            }

            page_number += 1;
            tokio::time::sleep(config.page_delay()).await;
        }
    }
}
