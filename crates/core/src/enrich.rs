//! Elevation enrichment via batched DEM lookups.
//!
//! [`ElevationProvider`] abstracts the lookup service so the enrichment
//! logic can be tested without a network; [`OpenTopoData`] is the production
//! implementation, speaking the `locations=lat,lon|lat,lon|...` batch
//! protocol (at most 100 locations per request).
//!
//! A failed batch is logged and skipped rather than aborting the run - with
//! tens of batches per country, losing one to a transient server error
//! should not cost the other ninety-nine.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coord::Coord;
use crate::element::{Element, ELE_SOURCE_TAG, ELE_TAG};
use crate::filter::FilteredData;
use crate::{Error, Result};

/// Value written to `ele:source` for every enriched element.
pub const ELEVATION_SOURCE: &str = "SRTM";

/// Most locations OpenTopoData accepts in one request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Elements with fetched elevations, per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedData {
    pub train_stations: Vec<Element>,
    pub alpine_huts: Vec<Element>,
    pub other_accommodations: Vec<Element>,
}

/// A point-elevation lookup service.
pub trait ElevationProvider {
    /// Fetch elevations for a batch of coordinates.
    ///
    /// The result has one entry per input coordinate, in order; `None`
    /// means the service has no data there (open water, voids in the DEM).
    fn batch_elevations(&self, coords: &[Coord]) -> Result<Vec<Option<f64>>>;

    /// Fetch the elevation of a single coordinate.
    fn elevation(&self, coord: Coord) -> Result<Option<f64>> {
        let results = self.batch_elevations(std::slice::from_ref(&coord))?;
        Ok(results.into_iter().next().flatten())
    }
}

#[derive(Deserialize)]
struct OpenTopoResponse {
    status: String,
    #[serde(default)]
    results: Vec<OpenTopoResult>,
}

#[derive(Deserialize)]
struct OpenTopoResult {
    elevation: Option<f64>,
}

/// Client for the OpenTopoData API.
pub struct OpenTopoData {
    agent: ureq::Agent,
    url: String,
}

impl OpenTopoData {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
        }
    }
}

impl ElevationProvider for OpenTopoData {
    fn batch_elevations(&self, coords: &[Coord]) -> Result<Vec<Option<f64>>> {
        if coords.is_empty() {
            return Ok(Vec::new());
        }

        let locations = coords
            .iter()
            .map(|c| format!("{:.6},{:.6}", c.lat, c.lon))
            .collect::<Vec<_>>()
            .join("|");

        let response = self
            .agent
            .get(&self.url)
            .query("locations", &locations)
            .call()
            .map_err(|e| Error::Elevation(e.to_string()))?;

        let parsed: OpenTopoResponse = response
            .into_json()
            .map_err(|e| Error::Elevation(format!("failed to decode response: {e}")))?;

        if parsed.status != "OK" {
            return Err(Error::Elevation(format!(
                "API returned non-OK status: {}",
                parsed.status
            )));
        }

        let mut elevations: Vec<Option<f64>> =
            parsed.results.into_iter().map(|r| r.elevation).collect();
        // Short responses pad out with "no data" so callers can still zip
        // results against their input.
        elevations.resize(coords.len(), None);
        Ok(elevations)
    }
}

/// Applies batched elevation lookups to filtered elements.
pub struct Enricher<P> {
    provider: P,
    batch_size: usize,
    batch_delay: Duration,
}

impl<P: ElevationProvider> Enricher<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            batch_size: MAX_BATCH_SIZE,
            batch_delay: Duration::from_millis(1000),
        }
    }

    /// Set the number of locations per request (clamped to the API maximum).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Set the pause between consecutive batch requests.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Enrich every category of a filtered data set, alpine huts first.
    pub fn enrich_all(&self, data: &FilteredData, limit: Option<usize>) -> EnrichedData {
        let mut enriched = EnrichedData::default();

        if !data.alpine_huts.is_empty() {
            log::info!("Enriching {} alpine huts (priority)", data.alpine_huts.len());
            enriched.alpine_huts = self.enrich(&data.alpine_huts, limit);
        }
        if !data.train_stations.is_empty() {
            log::info!("Enriching {} train stations", data.train_stations.len());
            enriched.train_stations = self.enrich(&data.train_stations, limit);
        }
        if !data.other_accommodations.is_empty() {
            log::info!(
                "Enriching {} other accommodations",
                data.other_accommodations.len()
            );
            enriched.other_accommodations = self.enrich(&data.other_accommodations, limit);
        }

        enriched
    }

    /// Enrich up to `limit` elements, returning those that got an elevation.
    pub fn enrich(&self, elements: &[Element], limit: Option<usize>) -> Vec<Element> {
        let mut candidates: Vec<(Element, Coord)> = Vec::new();
        for element in elements {
            if let Some(cap) = limit {
                if candidates.len() >= cap {
                    break;
                }
            }
            match element.coord() {
                Some(coord) => candidates.push((element.clone(), coord)),
                None => log::warn!("Element {} has no valid coordinates", element.id),
            }
        }

        let total_batches = candidates.len().div_ceil(self.batch_size);
        let mut enriched = Vec::new();

        for (index, batch) in candidates.chunks(self.batch_size).enumerate() {
            log::info!(
                "Processing batch {}/{} ({} locations)",
                index + 1,
                total_batches,
                batch.len()
            );

            let coords: Vec<Coord> = batch.iter().map(|(_, c)| *c).collect();
            let elevations = match self.provider.batch_elevations(&coords) {
                Ok(elevations) => elevations,
                Err(err) => {
                    log::warn!("Batch request failed: {err}");
                    continue;
                }
            };

            for ((element, _), elevation) in batch.iter().zip(elevations) {
                match elevation {
                    Some(value) => enriched.push(apply_elevation(element.clone(), value)),
                    None => log::warn!("No elevation data for element {}", element.id),
                }
            }

            if index + 1 < total_batches {
                thread::sleep(self.batch_delay);
            }
        }

        log::info!(
            "Successfully enriched {}/{} elements",
            enriched.len(),
            candidates.len()
        );

        enriched
    }
}

/// Write the fetched elevation into the element's tags.
fn apply_elevation(mut element: Element, elevation: f64) -> Element {
    element
        .tags
        .insert(ELE_TAG.to_string(), format!("{elevation:.1}"));
    element
        .tags
        .insert(ELE_SOURCE_TAG.to_string(), ELEVATION_SOURCE.to_string());
    element.elevation_fetched = Some(elevation);
    element
}
