//! Overpass API extraction.
//!
//! Queries the Overpass API for elements missing an `ele` tag inside a
//! country's `admin_level=2` area: railway stations and halts, and tourism
//! accommodations. Ways are queried with `out center` so they carry a
//! precomputed center coordinate.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::{Error, Result};

/// Pause between the two Overpass queries of a full extraction, to stay
/// polite towards the shared public instance.
const COURTESY_DELAY: Duration = Duration::from_secs(2);

/// `tourism` values requested from Overpass.
const TOURISM_QUERY_TYPES: [&str; 6] = [
    "hotel",
    "guest_house",
    "alpine_hut",
    "chalet",
    "hostel",
    "motel",
];

/// Raw extraction output: both element families, unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    pub train_stations: Vec<Element>,
    pub accommodations: Vec<Element>,
}

/// An `admin_level=2` area name known to OSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_name: Option<String>,
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Deserialize)]
struct AreaResponse {
    #[serde(default)]
    elements: Vec<AreaElement>,
}

#[derive(Deserialize)]
struct AreaElement {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Client for the Overpass API.
pub struct OverpassClient {
    agent: ureq::Agent,
    url: String,
    country: String,
}

impl OverpassClient {
    pub fn new(url: impl Into<String>, country: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
            country: country.into(),
        }
    }

    /// Fetch both element families, with a courtesy pause in between.
    pub fn fetch_all(&self) -> Result<RawData> {
        log::info!("Querying train stations in {}", self.country);
        let train_stations = self.run_query(&self.station_query())?;
        log::info!("Found {} train stations", train_stations.len());

        thread::sleep(COURTESY_DELAY);

        log::info!("Querying accommodations in {}", self.country);
        let accommodations = self.run_query(&self.accommodation_query())?;
        log::info!("Found {} accommodations", accommodations.len());

        Ok(RawData {
            train_stations,
            accommodations,
        })
    }

    /// List every `admin_level=2` area name, sorted and deduplicated.
    pub fn list_countries(&self) -> Result<Vec<CountryInfo>> {
        let query = r#"
[out:json][timeout:60];
area["admin_level"="2"];
out tags;
"#;

        let response = self
            .agent
            .post(&self.url)
            .send_form(&[("data", query)])
            .map_err(overpass_error)?;
        let parsed: AreaResponse = response
            .into_json()
            .map_err(|e| Error::Overpass(format!("failed to decode response: {e}")))?;

        let mut countries: BTreeMap<String, CountryInfo> = BTreeMap::new();
        for area in parsed.elements {
            let Some(name) = area.tags.get("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            let int_name = area
                .tags
                .get("int_name")
                .filter(|n| !n.is_empty())
                .cloned();
            countries.insert(
                name.clone(),
                CountryInfo {
                    name: name.clone(),
                    int_name,
                },
            );
        }

        Ok(countries.into_values().collect())
    }

    fn run_query(&self, query: &str) -> Result<Vec<Element>> {
        let response = self
            .agent
            .post(&self.url)
            .send_form(&[("data", query)])
            .map_err(overpass_error)?;

        let parsed: OverpassResponse = response
            .into_json()
            .map_err(|e| Error::Overpass(format!("failed to decode response: {e}")))?;

        Ok(parsed.elements)
    }

    fn station_query(&self) -> String {
        let country = escape_country(&self.country);
        format!(
            r#"
[out:json][timeout:180];
area["name"="{country}"]["admin_level"="2"]->.country;
(
  node["railway"="station"]["ele"!~".*"](area.country);
  node["railway"="halt"]["ele"!~".*"](area.country);
);
out body;
"#
        )
    }

    fn accommodation_query(&self) -> String {
        let country = escape_country(&self.country);
        let mut clauses = String::new();
        for element_kind in ["node", "way"] {
            for tourism in TOURISM_QUERY_TYPES {
                clauses.push_str(&format!(
                    "  {element_kind}[\"tourism\"=\"{tourism}\"][\"ele\"!~\".*\"](area.country);\n"
                ));
            }
        }

        format!(
            r#"
[out:json][timeout:300];
area["name"="{country}"]["admin_level"="2"]->.country;
(
{clauses});
out center;
"#
        )
    }
}

/// Escape double quotes so a country name cannot break out of the query
/// string.
fn escape_country(country: &str) -> String {
    country.replace('"', "\\\"")
}

fn overpass_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            Error::Overpass(format!("status {code}: {body}"))
        }
        other => Error::Overpass(other.to_string()),
    }
}
