//! Elevation validation before upload.
//!
//! Enrichment can return values that are clearly wrong for the region being
//! processed (DEM voids come back as large negative numbers, peaks bleed
//! into neighboring cells). Every enriched element is range-checked before
//! it is allowed anywhere near the OSM API, and elements with a malformed
//! `ele` tag are rejected outright.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::{Element, ELE_SOURCE_TAG, ELE_TAG};
use crate::enrich::EnrichedData;

/// Default lower bound for accepted elevations, in meters.
pub const DEFAULT_MIN_ELEVATION: f64 = 0.0;

/// Default upper bound for accepted elevations, in meters.
pub const DEFAULT_MAX_ELEVATION: f64 = 2600.0;

/// Result of validating one element.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationStatus {
    /// Element can be uploaded.
    Valid,
    /// Element must be dropped.
    Invalid(InvalidReason),
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid)
    }
}

/// Reason an element failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvalidReason {
    /// No elevation was fetched for the element.
    MissingElevation,
    /// Fetched elevation is below the configured minimum.
    BelowMinimum { elevation: f64, min: f64 },
    /// Fetched elevation is above the configured maximum.
    AboveMaximum { elevation: f64, max: f64 },
    /// The `ele` tag is not a plain decimal number.
    MalformedTag { value: String },
    /// The `ele:source` tag is missing.
    MissingSource,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::MissingElevation => write!(f, "no elevation data"),
            InvalidReason::BelowMinimum { elevation, min } => {
                write!(f, "elevation {elevation:.1}m below minimum {min:.1}m")
            }
            InvalidReason::AboveMaximum { elevation, max } => {
                write!(f, "elevation {elevation:.1}m above maximum {max:.1}m")
            }
            InvalidReason::MalformedTag { value } => {
                write!(f, "invalid elevation format: {value}")
            }
            InvalidReason::MissingSource => write!(f, "missing ele:source tag"),
        }
    }
}

/// Per-category validation output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCategory {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub valid_elements: Vec<Element>,
}

/// Validation output for all categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatedData {
    pub train_stations: ValidatedCategory,
    pub alpine_huts: ValidatedCategory,
    pub other_accommodations: ValidatedCategory,
}

impl ValidatedData {
    /// All valid elements across categories, alpine huts first.
    pub fn valid_elements(&self) -> Vec<Element> {
        let mut elements = Vec::with_capacity(self.total_valid());
        elements.extend(self.alpine_huts.valid_elements.iter().cloned());
        elements.extend(self.train_stations.valid_elements.iter().cloned());
        elements.extend(self.other_accommodations.valid_elements.iter().cloned());
        elements
    }

    pub fn total_valid(&self) -> usize {
        self.train_stations.valid_count
            + self.alpine_huts.valid_count
            + self.other_accommodations.valid_count
    }
}

/// Range validator for fetched elevations.
#[derive(Debug, Clone)]
pub struct ElevationValidator {
    pub min_elevation: f64,
    pub max_elevation: f64,
}

impl Default for ElevationValidator {
    fn default() -> Self {
        Self {
            min_elevation: DEFAULT_MIN_ELEVATION,
            max_elevation: DEFAULT_MAX_ELEVATION,
        }
    }
}

impl ElevationValidator {
    pub fn new(min_elevation: f64, max_elevation: f64) -> Self {
        Self {
            min_elevation,
            max_elevation,
        }
    }

    /// Check the fetched elevation against the configured range.
    pub fn validate(&self, element: &Element) -> ValidationStatus {
        let Some(elevation) = element.elevation_fetched else {
            return ValidationStatus::Invalid(InvalidReason::MissingElevation);
        };

        if elevation < self.min_elevation {
            return ValidationStatus::Invalid(InvalidReason::BelowMinimum {
                elevation,
                min: self.min_elevation,
            });
        }
        if elevation > self.max_elevation {
            return ValidationStatus::Invalid(InvalidReason::AboveMaximum {
                elevation,
                max: self.max_elevation,
            });
        }

        ValidationStatus::Valid
    }

    /// Check that the elevation tags are well-formed for upload.
    pub fn validate_tags(&self, element: &Element) -> ValidationStatus {
        let Some(value) = element.tag(ELE_TAG) else {
            return ValidationStatus::Invalid(InvalidReason::MissingElevation);
        };
        if !is_plain_decimal(value) {
            return ValidationStatus::Invalid(InvalidReason::MalformedTag {
                value: value.to_string(),
            });
        }
        if element.tag(ELE_SOURCE_TAG).map_or(true, str::is_empty) {
            return ValidationStatus::Invalid(InvalidReason::MissingSource);
        }

        ValidationStatus::Valid
    }

    /// Split elements into valid ones and rejected ones with their reasons.
    pub fn split(&self, elements: Vec<Element>) -> (Vec<Element>, Vec<(Element, InvalidReason)>) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();

        for element in elements {
            match self.validate(&element) {
                ValidationStatus::Valid => valid.push(element),
                ValidationStatus::Invalid(reason) => invalid.push((element, reason)),
            }
        }

        (valid, invalid)
    }

    /// Validate a full enriched data set, logging per-category tallies and
    /// a few rejection examples.
    pub fn validate_all(&self, data: EnrichedData) -> ValidatedData {
        ValidatedData {
            train_stations: self.validate_category("train_stations", data.train_stations),
            alpine_huts: self.validate_category("alpine_huts", data.alpine_huts),
            other_accommodations: self
                .validate_category("other_accommodations", data.other_accommodations),
        }
    }

    fn validate_category(&self, name: &str, elements: Vec<Element>) -> ValidatedCategory {
        if elements.is_empty() {
            return ValidatedCategory::default();
        }

        let (valid, invalid) = self.split(elements);
        log::info!(
            "Validated {name}: {} valid, {} invalid",
            valid.len(),
            invalid.len()
        );
        for (element, reason) in invalid.iter().take(3) {
            log::debug!("  rejected {} {}: {reason}", element.element_type, element.id);
        }

        ValidatedCategory {
            valid_count: valid.len(),
            invalid_count: invalid.len(),
            valid_elements: valid,
        }
    }
}

/// Accept only `-?digits(.digits)?`, the format OSM expects in `ele`.
///
/// Deliberately stricter than `str::parse::<f64>`, which would let
/// exponents and `inf` through.
fn is_plain_decimal(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let mut parts = digits.split('.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    if parts.next().is_some() {
        return false;
    }

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(int_part) && frac_part.map_or(true, all_digits)
}
