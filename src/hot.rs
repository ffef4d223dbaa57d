//! Hot-item detection.
//!
//! Observations are grouped per item, trimmed to the trailing window, put in
//! time order, and scanned once. Every position where the quantity-sold
//! counter differs from the previous observation is one revision. Any change
//! counts, including a counter that went down. Items with at least
//! `min_sales` revisions are hot.
//!
//! The window is anchored at the wall-clock time the caller passes in as
//! `now`, not at each item's latest observation, so an item that stopped
//! appearing ages out of the window like everything else.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::{Config, window_start};
use crate::model::{HotItem, Observation};

/// Revision count for one item, hot or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTally {
    pub item_id: String,
    /// Title and price of the latest in-window observation.
    pub title: String,
    pub price: String,
    /// In-window observations that carried a counter.
    pub observations: usize,
    pub revision_count: usize,
}

impl ItemTally {
    #[must_use]
    pub fn to_hot_item(&self) -> HotItem {
        HotItem {
            item_id: self.item_id.clone(),
            revision_count: self.revision_count,
            price: self.price.clone(),
            title: self.title.clone(),
        }
    }
}

/// Window and threshold for one filtering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotItemFilter {
    cutoff: DateTime<Utc>,
    min_sales: usize,
    max_items: Option<usize>,
}

impl HotItemFilter {
    /// Keeps observations made at or after `now - days_limit` days. A window
    /// reaching past the earliest representable date keeps everything.
    #[must_use]
    pub fn new(now: DateTime<Utc>, days_limit: i64, min_sales: usize) -> Self {
        Self {
            cutoff: window_start(now, days_limit).unwrap_or(DateTime::<Utc>::MIN_UTC),
            min_sales,
            max_items: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config, now: DateTime<Utc>) -> Self {
        Self {
            max_items: config.max_items,
            ..Self::new(now, config.days_limit, config.min_sales)
        }
    }

    /// Caps how many hot items [`HotItemFilter::apply`] returns.
    #[must_use]
    pub const fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    #[must_use]
    pub const fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    #[must_use]
    pub const fn min_sales(&self) -> usize {
        self.min_sales
    }

    /// Counts revisions for every item that has at least one usable
    /// in-window observation, ordered by item id.
    ///
    /// Observations before the cutoff or without a counter are dropped
    /// before counting. Observations with equal timestamps keep the order
    /// they were supplied in.
    pub fn tally<I>(&self, observations: I) -> Vec<ItemTally>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut partitions: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        for observation in observations {
            if observation.observed_at < self.cutoff || observation.quantity_sold.is_none() {
                continue;
            }
            partitions
                .entry(observation.item_id.clone())
                .or_default()
                .push(observation);
        }

        partitions
            .into_iter()
            .filter_map(|(item_id, mut sequence)| {
                // Stable, so ties stay in insertion order.
                sequence.sort_by_key(|o| o.observed_at);
                let latest = sequence.last()?;
                Some(ItemTally {
                    title: latest.title.clone(),
                    price: latest.price.clone(),
                    observations: sequence.len(),
                    revision_count: count_revisions(&sequence),
                    item_id,
                })
            })
            .collect()
    }

    /// Hot items, most revisions first (item id breaks ties), truncated to
    /// `max_items` if set.
    pub fn apply<I>(&self, observations: I) -> Vec<HotItem>
    where
        I: IntoIterator<Item = Observation>,
    {
        self.select(&self.tally(observations))
    }

    /// Picks the hot items out of an existing tally.
    #[must_use]
    pub fn select(&self, tallies: &[ItemTally]) -> Vec<HotItem> {
        let mut hot: Vec<HotItem> = tallies
            .iter()
            .filter(|t| t.revision_count >= self.min_sales)
            .map(ItemTally::to_hot_item)
            .collect();

        hot.sort_by(|a, b| {
            b.revision_count
                .cmp(&a.revision_count)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        if let Some(max) = self.max_items
            && hot.len() > max
        {
            log::info!("Keeping the top {max} of {} hot items", hot.len());
            hot.truncate(max);
        }
        hot
    }
}

/// Number of adjacent pairs in `sequence` whose counters differ.
#[must_use]
pub fn count_revisions(sequence: &[Observation]) -> usize {
    sequence
        .windows(2)
        .filter(|pair| pair[0].quantity_sold != pair[1].quantity_sold)
        .count()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn obs(item: &str, days_ago: i64, quantity: Option<u64>) -> Observation {
        Observation {
            item_id: item.to_owned(),
            observed_at: now() - TimeDelta::days(days_ago),
            quantity_sold: quantity,
            price: format!("AU ${days_ago}.00"),
            title: format!("{item} day {days_ago}"),
        }
    }

    /// One observation per day, ending today.
    fn series(item: &str, quantities: &[u64]) -> Vec<Observation> {
        let len = i64::try_from(quantities.len()).unwrap();
        quantities
            .iter()
            .zip((0..len).rev())
            .map(|(q, days_ago)| obs(item, days_ago, Some(*q)))
            .collect()
    }

    fn filter() -> HotItemFilter {
        HotItemFilter::new(now(), 14, 3)
    }

    #[test]
    fn two_changes_fall_short_of_threshold() {
        let tallies = filter().tally(series("a", &[5, 5, 7, 7, 7, 9]));
        assert_eq!(tallies[0].revision_count, 2);
        assert!(filter().apply(series("a", &[5, 5, 7, 7, 7, 9])).is_empty());
    }

    #[test]
    fn three_changes_qualify() {
        let hot = filter().apply(series("a", &[5, 7, 9, 12]));
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0].item_id, "a");
        assert_eq!(hot[0].revision_count, 3);
    }

    #[test]
    fn hot_item_uses_latest_title_and_price() {
        let hot = filter().apply(series("a", &[5, 7, 9, 12]));
        assert_eq!(hot[0].title, "a day 0");
        assert_eq!(hot[0].price, "AU $0.00");
    }

    #[test]
    fn decreases_count_as_revisions() {
        let hot = filter().apply(series("a", &[9, 4, 9, 4]));
        assert_eq!(hot[0].revision_count, 3);
    }

    #[test]
    fn zero_or_one_observation_never_qualifies() {
        let lenient = HotItemFilter::new(now(), 14, 1);
        assert!(lenient.apply(Vec::new()).is_empty());
        assert!(lenient.apply(vec![obs("a", 1, Some(3))]).is_empty());
    }

    #[test]
    fn observations_outside_window_contribute_nothing() {
        let mut observations = vec![obs("a", 15, Some(1))];
        observations.extend(series("a", &[2, 3, 4]));
        let tallies = filter().tally(observations.clone());
        assert_eq!(tallies[0].revision_count, 2);
        assert_eq!(tallies[0].observations, 3);
        assert!(filter().apply(observations).is_empty());
    }

    #[test]
    fn exposes_window_start_and_threshold() {
        assert_eq!(filter().cutoff(), now() - TimeDelta::days(14));
        assert_eq!(filter().min_sales(), 3);
    }

    #[test]
    fn oversized_window_keeps_everything() {
        let wide = HotItemFilter::new(now(), 100_000_000, 3);
        assert_eq!(wide.cutoff(), DateTime::<Utc>::MIN_UTC);

        let mut observations = vec![obs("a", 400, Some(1))];
        observations.extend(series("a", &[2, 3, 4]));
        assert_eq!(wide.apply(observations)[0].revision_count, 3);
    }

    #[test]
    fn observation_exactly_at_cutoff_is_kept() {
        let observations = vec![
            obs("a", 14, Some(1)),
            obs("a", 3, Some(2)),
            obs("a", 2, Some(3)),
            obs("a", 1, Some(4)),
        ];
        assert_eq!(filter().apply(observations)[0].revision_count, 3);
    }

    #[test]
    fn unordered_input_is_sorted_by_time() {
        let mut observations = series("a", &[1, 2, 3, 4]);
        observations.reverse();
        assert_eq!(filter().apply(observations)[0].revision_count, 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let observations = vec![
            obs("a", 2, Some(1)),
            obs("a", 1, Some(1)),
            obs("a", 1, Some(2)),
            obs("a", 0, Some(2)),
        ];
        assert_eq!(filter().tally(observations)[0].revision_count, 1);
    }

    #[test]
    fn missing_counters_are_excluded_not_fatal() {
        let observations = vec![
            obs("a", 4, Some(1)),
            obs("a", 3, None),
            obs("a", 2, Some(2)),
            obs("a", 1, Some(3)),
            obs("a", 0, Some(4)),
            obs("b", 0, None),
        ];
        let tallies = filter().tally(observations);
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].observations, 4);
        assert_eq!(tallies[0].revision_count, 3);
    }

    #[test]
    fn orders_by_revisions_then_id_and_caps() {
        let mut observations = series("b", &[1, 2, 3, 4]);
        observations.extend(series("a", &[1, 2, 3, 4]));
        observations.extend(series("c", &[1, 2, 3, 4, 5, 6]));

        let hot = filter().apply(observations.clone());
        let ids: Vec<&str> = hot.iter().map(|h| h.item_id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);

        let capped = filter().with_max_items(Some(2)).apply(observations);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[1].item_id, "a");
    }

    #[test]
    fn filtering_is_idempotent() {
        let mut observations = series("hot", &[1, 2, 3, 4, 5]);
        observations.extend(series("cold", &[1, 1, 2]));
        observations.extend(series("edge", &[3, 4, 3, 4]));

        let first = filter().apply(observations.clone());
        let kept: Vec<Observation> = observations
            .into_iter()
            .filter(|o| first.iter().any(|h| h.item_id == o.item_id))
            .collect();
        let second = filter().apply(kept);

        assert_eq!(first, second);
    }

    #[test]
    fn revision_count_matches_adjacent_changes() {
        let observations = series("a", &[5, 5, 7, 7, 7, 9, 9, 3]);
        let expected = [5, 5, 7, 7, 7, 9, 9, 3]
            .windows(2)
            .filter(|w| w[0] != w[1])
            .count();
        assert_eq!(count_revisions(&observations), expected);
    }
}
