//! Core library for enriching OpenStreetMap elements with elevation data.
//!
//! This library implements an ETL pipeline: extract elements missing an
//! `ele` tag from the Overpass API, enrich them with elevations from a DEM
//! lookup service, validate the results, and upload them back to the OSM API
//! in changesets whose bounding box stays within a configured size limit.
//!
//! The size limit is what makes the upload interesting: a country-wide run
//! produces edits scattered over an area no single changeset may span, so
//! the [`cluster`] module partitions elements into geographically bounded
//! groups and the [`upload`] module opens one changeset per group.
//!
//! # Examples
//!
//! ```no_run
//! use osm_elevate_core::{Config, Pipeline};
//!
//! let config = Config {
//!     country: "România".to_string(),
//!     dry_run: true,
//!     ..Default::default()
//! };
//!
//! let pipeline = Pipeline::new(config);
//! pipeline.run_all().unwrap();
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod cluster;
pub mod coord;
pub mod element;
pub mod enrich;
pub mod extract;
pub mod filter;
pub mod pipeline;
pub mod report;
pub mod store;
#[cfg(test)]
mod testutil;
pub mod upload;
pub mod validate;

pub use cluster::{partition, partition_with, Cluster, PartitionConfig, DEFAULT_MAX_DIAGONAL};
pub use coord::{BoundingBox, Coord};
pub use element::Element;
pub use pipeline::Pipeline;

/// Errors that can occur in the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Overpass query failed: {0}")]
    Overpass(String),

    #[error("elevation lookup failed: {0}")]
    Elevation(String),

    #[error("OSM API request failed: {0}")]
    OsmApi(String),

    #[error("OAuth access token required for upload (set OSM_ACCESS_TOKEN or use --dry-run)")]
    MissingToken,

    #[error("stage file {} not found; run the `{stage}` stage first", .path.display())]
    MissingStage { path: PathBuf, stage: &'static str },

    #[error("no elements to upload")]
    NothingToUpload,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Country to process, matched against the OSM `name` tag of an
    /// `admin_level=2` area.
    pub country: String,
    /// Directory for stage files (raw/filtered/enriched/validated JSON and
    /// the review CSV).
    pub output_dir: PathBuf,
    /// Overpass API endpoint.
    pub overpass_url: String,
    /// OpenTopoData dataset endpoint.
    pub opentopo_url: String,
    /// OSM API 0.6 base URL.
    pub osm_api_url: String,
    /// OAuth2 bearer token for the OSM API. Absent means upload can only
    /// run dry.
    pub access_token: Option<String>,
    /// Delay between consecutive remote calls (elevation batches, changeset
    /// uploads).
    pub rate_limit: Duration,
    /// Locations per elevation lookup request.
    pub batch_size: usize,
    /// HTTP timeout for elevation and OSM API requests.
    pub timeout: Duration,
    /// Lowest elevation accepted by validation, in meters.
    pub min_elevation: f64,
    /// Highest elevation accepted by validation, in meters.
    pub max_elevation: f64,
    /// Changeset bounding-box diagonal limit, in degrees.
    pub max_diagonal: f64,
    /// Cap on elements per category during enrichment, for test runs.
    pub limit: Option<usize>,
    /// Log every upload action instead of performing it.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            country: "România".to_string(),
            output_dir: PathBuf::from("output"),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            opentopo_url: "https://api.opentopodata.org/v1/srtm30m".to_string(),
            osm_api_url: "https://api.openstreetmap.org/api/0.6".to_string(),
            access_token: None,
            rate_limit: Duration::from_millis(1000),
            batch_size: 100,
            timeout: Duration::from_secs(30),
            min_elevation: 0.0,
            max_elevation: 2600.0,
            max_diagonal: DEFAULT_MAX_DIAGONAL,
            limit: None,
            dry_run: false,
        }
    }
}
