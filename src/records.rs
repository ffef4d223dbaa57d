//! Flat files shared between stages.
//!
//! * `<store>_observations.csv`: append-only log of every poll.
//! * `<store>_results.csv`: hot items, input to the retailer search.
//! * `<store>/<item_id>.json`: retailer prices per hot item.

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::ScrapeError;
use crate::model::{HotItem, ItemReport, Observation};

#[must_use]
pub fn observation_log_path(dir: &Path, store: &str) -> PathBuf {
    dir.join(format!("{store}_observations.csv"))
}

#[must_use]
pub fn results_path(dir: &Path, store: &str) -> PathBuf {
    dir.join(format!("{store}_results.csv"))
}

#[must_use]
pub fn report_dir(dir: &Path, store: &str) -> PathBuf {
    dir.join(store)
}

/// Recovers the store name from a results file name, e.g.
/// `mystore_results.csv` gives `mystore`.
#[must_use]
pub fn store_from_results_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let store = name
        .strip_suffix("_results.csv")
        .or_else(|| name.strip_suffix(".csv"))
        .unwrap_or(name);
    (!store.is_empty()).then(|| store.to_owned())
}

/// Appends observations to the log, writing the header row only when the
/// file is new or empty. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`ScrapeError::Io`] or [`ScrapeError::Csv`] if the log cannot be
/// written.
pub fn append_observations(path: &Path, observations: &[Observation]) -> Result<usize, ScrapeError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    for observation in observations {
        writer.serialize(observation)?;
    }
    writer.flush()?;

    log::debug!("Appended {} observations to {}", observations.len(), path.display());
    Ok(observations.len())
}

/// Reads the whole observation log. A missing log reads as empty; rows that
/// cannot be parsed are logged and skipped.
///
/// # Errors
///
/// Returns [`ScrapeError::Csv`] if the file exists but cannot be opened.
pub fn read_observations(path: &Path) -> Result<Vec<Observation>, ScrapeError> {
    if !path.exists() {
        log::info!("No observation log at {} yet", path.display());
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut observations = Vec::new();
    for (index, row) in reader.deserialize::<Observation>().enumerate() {
        match row {
            Ok(observation) => observations.push(observation),
            Err(e) => log::warn!("Skipping row {} of {}: {e}", index + 2, path.display()),
        }
    }
    Ok(observations)
}

/// Writes the hot items CSV, replacing any previous file.
///
/// # Errors
///
/// Returns [`ScrapeError::Csv`] if the file cannot be written.
pub fn write_hot_items(path: &Path, items: &[HotItem]) -> Result<(), ScrapeError> {
    let mut writer = csv::Writer::from_path(path)?;
    if items.is_empty() {
        writer.write_record(["itemID", "quantitysold", "price", "title"])?;
    }
    for item in items {
        writer.serialize(item)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a hot items CSV.
///
/// # Errors
///
/// Returns [`ScrapeError::Csv`] if the file cannot be opened or a row is
/// malformed.
pub fn read_hot_items(path: &Path) -> Result<Vec<HotItem>, ScrapeError> {
    let mut reader = csv::Reader::from_path(path)?;
    let items = reader.deserialize().collect::<Result<Vec<HotItem>, _>>()?;
    Ok(items)
}

/// Writes `<dir>/<item_id>.json`, creating `dir` if needed.
///
/// # Errors
///
/// Returns [`ScrapeError::Parse`] if the item id is not a plain file name,
/// and [`ScrapeError::Io`] or [`ScrapeError::Json`] on write failures.
pub fn write_report(dir: &Path, report: &ItemReport) -> Result<PathBuf, ScrapeError> {
    let id = report.item_id.as_str();
    if id.contains(['/', '\\']) || Path::new(id).file_name() != Some(OsStr::new(id)) {
        return Err(ScrapeError::Parse(format!("item id {id:?} is not usable as a file name")));
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{id}.json"));
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn observation(id: &str, quantity: Option<u64>) -> Observation {
        Observation {
            item_id: id.to_owned(),
            observed_at: Utc.with_ymd_and_hms(2026, 2, 18, 9, 30, 0).unwrap(),
            quantity_sold: quantity,
            price: "AU $12.50".to_owned(),
            title: "Rattan basket, large".to_owned(),
        }
    }

    #[test]
    fn derives_paths_and_store_names() {
        let dir = Path::new("out");
        assert_eq!(results_path(dir, "shop"), Path::new("out/shop_results.csv"));
        assert_eq!(observation_log_path(dir, "shop"), Path::new("out/shop_observations.csv"));
        assert_eq!(report_dir(dir, "shop"), Path::new("out/shop"));
        assert_eq!(
            store_from_results_path(Path::new("data/ozplaza.living_results.csv")).as_deref(),
            Some("ozplaza.living")
        );
        assert_eq!(store_from_results_path(Path::new("shop.csv")).as_deref(), Some("shop"));
    }

    #[test]
    fn appends_across_polls_with_single_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = observation_log_path(tmp.path(), "shop");

        append_observations(&path, &[observation("1", Some(4))]).unwrap();
        append_observations(&path, &[observation("2", None)]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().filter(|l| l.starts_with("itemID")).count(), 1);

        let read = read_observations(&path).unwrap();
        assert_eq!(read, vec![observation("1", Some(4)), observation("2", None)]);
    }

    #[test]
    fn malformed_counter_reads_as_missing_and_bad_rows_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.csv");
        fs::write(
            &path,
            "itemID,observedAt,quantitySold,price,title\n\
             1,2026-02-18T09:30:00Z,lots,$1,A\n\
             2,not-a-time,3,$2,B\n\
             3,2026-02-18T09:30:00Z,7,$3,C\n",
        )
        .unwrap();

        let read = read_observations(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].quantity_sold, None);
        assert_eq!(read[1].item_id, "3");
        assert_eq!(read[1].quantity_sold, Some(7));
    }

    #[test]
    fn report_ids_must_be_plain_file_names() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = report_dir(tmp.path(), "shop");
        let item = HotItem {
            item_id: "../escaped".to_owned(),
            revision_count: 3,
            price: "AU $1.00".to_owned(),
            title: "Mug".to_owned(),
        };

        for id in ["../escaped", "a/b", "..", "", "c\\d"] {
            let report = ItemReport::new(&HotItem { item_id: id.to_owned(), ..item.clone() }, Vec::new());
            assert!(matches!(write_report(&dir, &report), Err(ScrapeError::Parse(_))), "{id}");
        }
        assert!(!tmp.path().join("escaped.json").exists());

        let report = ItemReport::new(&HotItem { item_id: "1234".to_owned(), ..item }, Vec::new());
        assert_eq!(write_report(&dir, &report).unwrap(), dir.join("1234.json"));
    }

    #[test]
    fn missing_log_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_observations(&tmp.path().join("absent.csv")).unwrap().is_empty());
    }

    #[test]
    fn hot_items_csv_has_expected_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = results_path(tmp.path(), "shop");
        let items = vec![HotItem {
            item_id: "42".to_owned(),
            revision_count: 5,
            price: "AU $9.99".to_owned(),
            title: "Cushion, linen".to_owned(),
        }];

        write_hot_items(&path, &items).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("itemID,quantitysold,price,title\n"));
        assert_eq!(read_hot_items(&path).unwrap(), items);

        write_hot_items(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "itemID,quantitysold,price,title\n");
    }
}
