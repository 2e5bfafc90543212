//! OSM element model: nodes and ways with their tags, coordinates, and
//! pipeline category.
//!
//! The JSON field layout mirrors what Overpass returns (`out body` for
//! nodes, `out center` for ways), so the structs double as wire format and
//! stage-file format.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coord::Coord;

/// Tag key for elevation in meters.
pub const ELE_TAG: &str = "ele";

/// Tag key recording where an elevation value came from.
pub const ELE_SOURCE_TAG: &str = "ele:source";

/// Kind of OSM element this pipeline handles.
///
/// Relations are never queried, so they are not represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Node,
    Way,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Node => write!(f, "node"),
            ElementType::Way => write!(f, "way"),
        }
    }
}

/// Precomputed center point of a way, as returned by Overpass `out center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// An OSM element with the fields this pipeline cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub id: i64,
    /// Node latitude; 0.0 when absent (ways carry a `center` instead).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub lat: f64,
    /// Node longitude; 0.0 when absent.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Center>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Elevation fetched during enrichment, in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_fetched: Option<f64>,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl Element {
    /// Extract the element's coordinate, if it has a usable one.
    ///
    /// Nodes use their own lat/lon; ways use the precomputed center. A
    /// (0, 0) coordinate means "no data" and yields `None`.
    pub fn coord(&self) -> Option<Coord> {
        let coord = match self.element_type {
            ElementType::Node => Coord::new(self.lat, self.lon),
            ElementType::Way => {
                let center = self.center?;
                Coord::new(center.lat, center.lon)
            }
        };
        coord.is_valid().then_some(coord)
    }

    /// Whether the element already carries an `ele` tag.
    pub fn has_elevation(&self) -> bool {
        self.tags.contains_key(ELE_TAG)
    }

    /// Get a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Human-readable identifier: the `name` tag, falling back to `ref`.
    pub fn name(&self) -> Option<&str> {
        self.tag("name").or_else(|| self.tag("ref"))
    }

    /// Link to the element on openstreetmap.org.
    pub fn osm_link(&self) -> String {
        format!(
            "https://www.openstreetmap.org/{}/{}",
            self.element_type, self.id
        )
    }

    /// Classify the element from its `tourism`/`railway` tags.
    pub fn category(&self) -> Category {
        if self.tag("tourism") == Some("alpine_hut") {
            return Category::AlpineHut;
        }

        if matches!(self.tag("railway"), Some("station") | Some("halt")) {
            return Category::TrainStation;
        }

        if let Some(tourism) = self.tag("tourism") {
            if ACCOMMODATION_TYPES.contains(&tourism) {
                return Category::OtherAccommodation;
            }
        }

        Category::Unknown
    }
}

/// `tourism` values treated as (non-alpine-hut) accommodations.
pub const ACCOMMODATION_TYPES: [&str; 5] = ["hotel", "guest_house", "chalet", "hostel", "motel"];

/// Pipeline category of an element.
///
/// Alpine huts are processed first: they are the elements where a missing
/// elevation tag hurts mappers most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AlpineHut,
    TrainStation,
    OtherAccommodation,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AlpineHut => "alpine_huts",
            Category::TrainStation => "train_stations",
            Category::OtherAccommodation => "other_accommodations",
            Category::Unknown => "unknown",
        }
    }
}
