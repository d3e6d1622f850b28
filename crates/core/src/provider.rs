//! Provider records produced by the PrEP locator

use serde::{Deserialize, Serialize};

/// Sentinel used for fields missing from the scraped markup
pub const NOT_AVAILABLE: &str = "N/A";

/// One provider entry from a locator search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub name: String,
    pub address: String,
    pub phone: String,
    /// Parsed distance in miles; `None` when the label could not be parsed
    pub distance_miles: Option<f64>,
}

impl ProviderRecord {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        phone: impl Into<String>,
        distance_miles: Option<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            phone: phone.into(),
            distance_miles,
        }
    }

    /// Whether the record has a known distance within `radius_miles`
    pub fn is_within(&self, radius_miles: f64) -> bool {
        matches!(self.distance_miles, Some(d) if d <= radius_miles)
    }
}
