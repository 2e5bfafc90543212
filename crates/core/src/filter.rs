//! Filtering of extracted elements.
//!
//! Keeps only elements that are actually enrichable - no `ele` tag yet, and
//! a usable coordinate - and splits them into the three pipeline categories.
//! Alpine huts get their own bucket because they are processed first.

use serde::{Deserialize, Serialize};

use crate::element::{Category, Element};
use crate::extract::RawData;

/// Categorized elements awaiting enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilteredData {
    pub train_stations: Vec<Element>,
    pub alpine_huts: Vec<Element>,
    pub other_accommodations: Vec<Element>,
}

impl FilteredData {
    pub fn total(&self) -> usize {
        self.train_stations.len() + self.alpine_huts.len() + self.other_accommodations.len()
    }
}

/// Keep elements that lack an `ele` tag and have a valid coordinate.
pub fn missing_elevation(elements: &[Element]) -> Vec<Element> {
    elements
        .iter()
        .filter(|e| !e.has_elevation() && e.coord().is_some())
        .cloned()
        .collect()
}

/// Filter raw extraction output into the categorized enrichment input.
pub fn filter_data(data: &RawData) -> FilteredData {
    let mut result = FilteredData {
        train_stations: missing_elevation(&data.train_stations),
        ..Default::default()
    };

    for element in missing_elevation(&data.accommodations) {
        if element.category() == Category::AlpineHut {
            result.alpine_huts.push(element);
        } else {
            result.other_accommodations.push(element);
        }
    }

    log::info!(
        "Filtered to {} train stations, {} alpine huts, {} other accommodations",
        result.train_stations.len(),
        result.alpine_huts.len(),
        result.other_accommodations.len()
    );

    result
}
