//! Stage orchestration.
//!
//! The generic functions ([`poll`], [`filter`], [`find`]) take a
//! [`PageSource`] and do one stage's work. The `run_*` functions open a
//! fresh [`Session`] per stage around them, so each stage uses exactly one
//! browser.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::StreamExt as _;

use crate::ScrapeError;
use crate::browser::{PageSource, Session};
use crate::config::Config;
use crate::hot::{HotItemFilter, ItemTally};
use crate::listing;
use crate::model::{HotItem, ItemReport, Observation};
use crate::records;
use crate::retailer::RetailerFinder;

/// Scrapes the store once and appends the observations to its log.
///
/// # Errors
///
/// Returns [`ScrapeError::Io`] or [`ScrapeError::Csv`] if the log cannot be
/// written. Page failures end the scan early but are not errors.
pub async fn poll<S: PageSource>(
    source: &S,
    config: &Config,
    store: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Observation>, ScrapeError> {
    let observations: Vec<Observation> = listing::observations(source, config, store, now).collect().await;

    let log_path = records::observation_log_path(&config.output_dir, store);
    records::append_observations(&log_path, &observations)?;
    log::info!(
        "Recorded {} observations for {store} in {}",
        observations.len(),
        log_path.display()
    );
    Ok(observations)
}

/// Reads the store's observation log, picks the hot items, prints a summary
/// and writes `<store>_results.csv`.
///
/// # Errors
///
/// Returns [`ScrapeError::Csv`] if the log or results file cannot be
/// accessed.
pub fn filter(config: &Config, store: &str, now: DateTime<Utc>) -> Result<Vec<HotItem>, ScrapeError> {
    let observations = records::read_observations(&records::observation_log_path(&config.output_dir, store))?;
    let hot_filter = HotItemFilter::from_config(config, now);
    log::info!(
        "Counting quantity changes since {} (threshold {})",
        hot_filter.cutoff(),
        hot_filter.min_sales()
    );

    let tallies = hot_filter.tally(observations);
    let hot = hot_filter.select(&tallies);
    print_summary(config, &tallies, &hot);

    let results = records::results_path(&config.output_dir, store);
    records::write_hot_items(&results, &hot)?;
    log::info!(
        "{} items with >= {} quantity changes saved to {}",
        hot.len(),
        config.min_sales,
        results.display()
    );
    Ok(hot)
}

/// Looks up retailer prices for each hot item and writes one JSON report per
/// item under `<output_dir>/<store>/`. Items whose search page cannot be
/// loaded are skipped.
///
/// # Errors
///
/// Returns the first error that is not specific to a single item, such as a
/// report that cannot be written.
pub async fn find<S: PageSource>(
    source: &S,
    config: &Config,
    store: &str,
    items: &[HotItem],
) -> Result<Vec<PathBuf>, ScrapeError> {
    let dir = records::report_dir(&config.output_dir, store);
    log::info!("Saving retailer results to {}", dir.display());

    let finder = RetailerFinder::new(source, config);
    let mut written = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        log::info!("[{}/{}] Processing item {}: {}", index + 1, items.len(), item.item_id, item.title);

        let retailers = match finder.find(&item.item_id, &item.title).await {
            Ok(retailers) => retailers,
            Err(e) if e.is_skippable() => {
                log::warn!("Skipping item {}: {e}", item.item_id);
                continue;
            }
            Err(e) => return Err(e),
        };

        let report = ItemReport::new(item, retailers);
        let path = match records::write_report(&dir, &report) {
            Ok(path) => path,
            Err(e) if e.is_skippable() => {
                log::warn!("Skipping item {}: {e}", item.item_id);
                continue;
            }
            Err(e) => return Err(e),
        };
        log::info!(
            "Saved {} retailers ({} priced) to {}",
            report.retailers.len(),
            report.priced(),
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}

/// Runs the listing scrape in its own session.
///
/// # Errors
///
/// Returns an error if the session cannot start or the log cannot be
/// written.
pub async fn run_poll(config: &Config, store: &str) -> Result<Vec<Observation>, ScrapeError> {
    let session = Session::open(config).await?;
    let result = poll(&session, config, store, Utc::now()).await;
    session.close().await;
    result
}

/// Runs the retailer search for a results CSV in its own session. The store
/// name, and so the report folder, comes from the file name.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] if no store name can be derived from
/// `results`, or any error from reading the file, opening the session, or
/// writing reports.
pub async fn run_find(config: &Config, results: &Path) -> Result<Vec<PathBuf>, ScrapeError> {
    let store = records::store_from_results_path(results)
        .ok_or_else(|| ScrapeError::Parse(format!("cannot derive a store name from {}", results.display())))?;
    let items = records::read_hot_items(results)?;
    log::info!("Loaded {} items from {}", items.len(), results.display());

    let session = Session::open(config).await?;
    let result = find(&session, config, &store, &items).await;
    session.close().await;
    result
}

/// Poll, filter, then search, for one store.
///
/// # Errors
///
/// Returns the first stage-level failure.
pub async fn run(config: &Config, store: &str) -> Result<Vec<PathBuf>, ScrapeError> {
    banner(&format!("STEP 1: Scraping sold listings for store: {store}"));
    run_poll(config, store).await?;

    banner("STEP 2: Filtering hot items");
    let hot = filter(config, store, Utc::now())?;
    if hot.is_empty() {
        log::info!("No items passed the filter, nothing to search");
        log::info!(
            "Counter changes only show up across polls; run again later to build up {}",
            records::observation_log_path(&config.output_dir, store).display()
        );
        return Ok(Vec::new());
    }

    banner(&format!("STEP 3: Finding retailers for {} items", hot.len()));
    let session = Session::open(config).await?;
    let result = find(&session, config, store, &hot).await;
    session.close().await;

    let written = result?;
    banner(&format!(
        "DONE: results saved to {}",
        records::report_dir(&config.output_dir, store).display()
    ));
    Ok(written)
}

fn banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("  {title}");
    println!("{}\n", "=".repeat(60));
}

fn print_summary(config: &Config, tallies: &[ItemTally], hot: &[HotItem]) {
    println!(
        "\n==== ALL ITEMS (quantity changes, last {} days) ====",
        config.days_limit
    );
    print_header();
    for tally in tallies {
        print_row(&tally.item_id, tally.revision_count, &tally.price, &tally.title);
    }

    println!("\n==== FILTERED (>= {} quantity changes) ====", config.min_sales);
    print_header();
    for item in hot {
        print_row(&item.item_id, item.revision_count, &item.price, &item.title);
    }
}

fn print_header() {
    println!("{:<15} {:<12} {:<12} Title", "Item ID", "QtyChanges", "Price");
    println!("{}", "-".repeat(100));
}

fn print_row(item_id: &str, changes: usize, price: &str, title: &str) {
    println!("{item_id:<15} {changes:<12} {price:<12} {title}");
}
