//! Result page extraction
//!
//! Turns the provider directory's result markup into [`ProviderRecord`]s.
//! Missing elements degrade to the `"N/A"` sentinel and never fail the parse.

use scraper::{ElementRef, Html, Selector};

use chia_config::LocatorSelectors;
use chia_core::{ProviderRecord, NOT_AVAILABLE};

use super::LocatorError;

/// Compiled result-page selectors
#[derive(Debug, Clone)]
pub struct ResultSelectors {
    item: Selector,
    name: Selector,
    field: Selector,
    distance_prefix: String,
}

fn compile(css: &str) -> Result<Selector, LocatorError> {
    Selector::parse(css).map_err(|e| LocatorError::Selector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

impl ResultSelectors {
    pub fn compile(selectors: &LocatorSelectors) -> Result<Self, LocatorError> {
        Ok(Self {
            item: compile(&selectors.result_item)?,
            name: compile(&selectors.name)?,
            field: compile(&selectors.field)?,
            distance_prefix: selectors.distance_prefix.clone(),
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Absent and empty (after trimming) elements both read as `"N/A"`
fn or_missing(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Parse every result item in page order, without distance filtering
pub fn parse_results(html: &str, selectors: &ResultSelectors) -> Vec<ProviderRecord> {
    let document = Html::parse_document(html);

    document
        .select(&selectors.item)
        .map(|item| {
            let name = or_missing(item.select(&selectors.name).next().map(element_text));

            let fields: Vec<String> = item.select(&selectors.field).map(element_text).collect();
            let address = or_missing(fields.first().cloned());
            let phone = or_missing(fields.get(1).cloned());
            let distance = fields
                .get(2)
                .and_then(|label| parse_distance(label, &selectors.distance_prefix));

            ProviderRecord::new(name, address, phone, distance)
        })
        .collect()
}

/// Numeric distance from a label such as "Distance from your location: 12.5 miles"
///
/// Strips `prefix`, drops every character that is not a digit or `.`, and
/// parses what remains.
pub fn parse_distance(label: &str, prefix: &str) -> Option<f64> {
    let label = label.trim();
    let rest = label.strip_prefix(prefix).unwrap_or(label);
    let numeric: String = rest
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Keep records with a known distance no greater than `radius_miles`
pub fn filter_within_radius(records: Vec<ProviderRecord>, radius_miles: f64) -> Vec<ProviderRecord> {
    records
        .into_iter()
        .filter(|r| r.is_within(radius_miles))
        .collect()
}
