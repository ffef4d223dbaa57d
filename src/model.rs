use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// One sighting of a listing on the store's sold-items page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "itemID")]
    pub item_id: String,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
    /// The listing's "N sold" counter. `None` when the card had no counter
    /// or it could not be read.
    #[serde(rename = "quantitySold", deserialize_with = "csv::invalid_option")]
    pub quantity_sold: Option<u64>,
    /// Price text exactly as shown on the card.
    pub price: String,
    pub title: String,
}

/// An item whose sold counter moved often enough to be worth pricing.
///
/// Field order is the column order of `<store>_results.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotItem {
    #[serde(rename = "itemID")]
    pub item_id: String,
    /// Number of counter changes inside the window.
    #[serde(rename = "quantitysold")]
    pub revision_count: usize,
    pub price: String,
    pub title: String,
}

/// One retailer page visited while looking for a hot item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetailerPrice {
    #[serde(skip)]
    pub item_id: String,
    pub url: String,
    /// Page title, present only when it passed the product match check.
    pub matched_title: Option<String>,
    #[serde(serialize_with = "price_or_not_found")]
    pub price: Option<f64>,
}

/// Contents of `<store>/<item_id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    #[serde(rename = "itemID")]
    pub item_id: String,
    pub title: String,
    pub ebay_price: String,
    #[serde(rename = "quantitysold")]
    pub revision_count: usize,
    pub retailers: Vec<RetailerPrice>,
}

impl ItemReport {
    #[must_use]
    pub fn new(item: &HotItem, retailers: Vec<RetailerPrice>) -> Self {
        Self {
            item_id: item.item_id.clone(),
            title: item.title.clone(),
            ebay_price: item.price.clone(),
            revision_count: item.revision_count,
            retailers,
        }
    }

    /// Number of retailers that yielded a price.
    #[must_use]
    pub fn priced(&self) -> usize {
        self.retailers.iter().filter(|r| r.price.is_some()).count()
    }
}

fn price_or_not_found<S: Serializer>(price: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match price {
        Some(value) => serializer.serialize_f64(*value),
        None => serializer.serialize_str("price not found"),
    }
}
