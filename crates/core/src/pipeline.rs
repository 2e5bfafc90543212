//! Stage orchestration.
//!
//! Wires the pipeline together: extract -> filter -> enrich -> validate ->
//! export -> upload. Every stage reads its predecessor's JSON file and
//! writes its own, so stages can be run (and re-run) independently; a
//! missing input file turns into an error naming the stage to run first.

use std::path::PathBuf;
use std::time::Duration;

use crate::cluster;
use crate::element::Element;
use crate::enrich::{EnrichedData, Enricher, OpenTopoData};
use crate::extract::{CountryInfo, OverpassClient, RawData};
use crate::filter::{self, FilteredData};
use crate::report;
use crate::store;
use crate::upload::{OsmApiClient, UploadStats, Uploader};
use crate::validate::{ElevationValidator, ValidatedData};
use crate::{Config, Error, Result};

/// Stage file names under the output directory.
pub const RAW_FILE: &str = "osm_data_raw.json";
pub const FILTERED_FILE: &str = "osm_data_filtered.json";
pub const ENRICHED_FILE: &str = "osm_data_enriched.json";
pub const VALIDATED_FILE: &str = "osm_data_validated.json";
pub const CSV_FILE: &str = "elevation_data.csv";

/// Overpass queries run server-side for minutes; give them more room than
/// the point lookups get.
const OVERPASS_TIMEOUT: Duration = Duration::from_secs(300);

/// A configured pipeline run.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn stage_path(&self, file: &str) -> PathBuf {
        self.config.output_dir.join(file)
    }

    /// Query Overpass for enrichable elements and save the raw result.
    pub fn extract(&self) -> Result<RawData> {
        log::info!("Extract: querying Overpass API for {}", self.config.country);

        let client = OverpassClient::new(
            &self.config.overpass_url,
            &self.config.country,
            OVERPASS_TIMEOUT,
        );
        let data = client.fetch_all()?;

        store::save_json(&self.stage_path(RAW_FILE), &data)?;
        log::info!(
            "Extracted {} train stations and {} accommodations",
            data.train_stations.len(),
            data.accommodations.len()
        );
        Ok(data)
    }

    /// Drop already-tagged and coordinate-less elements, categorize the rest.
    pub fn filter(&self) -> Result<FilteredData> {
        log::info!("Filter: identifying elements without elevation");

        let raw: RawData = store::load_stage(&self.stage_path(RAW_FILE), "extract")?;
        let filtered = filter::filter_data(&raw);

        store::save_json(&self.stage_path(FILTERED_FILE), &filtered)?;
        Ok(filtered)
    }

    /// Fetch elevations for filtered elements in batches.
    pub fn enrich(&self) -> Result<EnrichedData> {
        log::info!("Enrich: fetching elevations from OpenTopoData");

        let filtered: FilteredData =
            store::load_stage(&self.stage_path(FILTERED_FILE), "filter")?;

        let provider = OpenTopoData::new(&self.config.opentopo_url, self.config.timeout);
        let enricher = Enricher::new(provider)
            .with_batch_size(self.config.batch_size)
            .with_batch_delay(self.config.rate_limit);
        let enriched = enricher.enrich_all(&filtered, self.config.limit);

        store::save_json(&self.stage_path(ENRICHED_FILE), &enriched)?;
        Ok(enriched)
    }

    /// Range-check fetched elevations.
    pub fn validate(&self) -> Result<ValidatedData> {
        log::info!(
            "Validate: checking elevation ranges ({}-{}m)",
            self.config.min_elevation,
            self.config.max_elevation
        );

        let enriched: EnrichedData =
            store::load_stage(&self.stage_path(ENRICHED_FILE), "enrich")?;

        let validator =
            ElevationValidator::new(self.config.min_elevation, self.config.max_elevation);
        let validated = validator.validate_all(enriched);

        store::save_json(&self.stage_path(VALIDATED_FILE), &validated)?;
        Ok(validated)
    }

    /// Write the review CSV.
    pub fn export_csv(&self) -> Result<usize> {
        log::info!("Export: writing CSV review file");

        let validated: ValidatedData =
            store::load_stage(&self.stage_path(VALIDATED_FILE), "validate")?;
        report::export_csv(&validated, &self.stage_path(CSV_FILE))
    }

    /// Partition valid elements into area-bounded clusters and upload them.
    pub fn upload(&self) -> Result<UploadStats> {
        let validated: ValidatedData =
            store::load_stage(&self.stage_path(VALIDATED_FILE), "validate")?;
        let elements = validated.valid_elements();
        if elements.is_empty() {
            return Err(Error::NothingToUpload);
        }

        let dry_run = self.config.dry_run || self.config.access_token.is_none();
        if dry_run && !self.config.dry_run {
            log::warn!("No OAuth access token provided, forcing dry-run mode");
        }
        log::info!(
            "Upload{}: {} elements",
            if dry_run { " (dry-run)" } else { "" },
            elements.len()
        );

        let clusters = cluster::partition(elements, Element::coord, self.config.max_diagonal);
        log::info!("Partitioned elements into {} changesets", clusters.len());
        for cluster in clusters.iter().filter(|c| !c.is_within(self.config.max_diagonal)) {
            // Best-effort partitioning: surface the rare oversized cluster
            // instead of hiding it.
            log::warn!(
                "Cluster of {} elements exceeds the diagonal limit ({:.4} > {}); the API may reject it",
                cluster.len(),
                cluster.diagonal(),
                self.config.max_diagonal
            );
        }

        let api = OsmApiClient::new(
            &self.config.osm_api_url,
            self.config.access_token.clone(),
            self.config.timeout,
        );
        let uploader = Uploader::new(api, self.config.country.clone())
            .with_dry_run(dry_run)
            .with_batch_delay(self.config.rate_limit);
        let stats = uploader.upload(&clusters);

        for error in stats.errors.iter().take(3) {
            log::warn!(
                "  failed: {} {}: {}",
                error.element_type,
                error.element_id,
                error.error
            );
        }

        Ok(stats)
    }

    /// Run every stage in order.
    pub fn run_all(&self) -> Result<()> {
        self.extract()?;
        self.filter()?;
        self.enrich()?;
        self.validate()?;
        self.export_csv()?;
        self.upload()?;
        Ok(())
    }

    /// List all `admin_level=2` area names known to OSM.
    pub fn list_countries(&self) -> Result<Vec<CountryInfo>> {
        let client = OverpassClient::new(
            &self.config.overpass_url,
            &self.config.country,
            OVERPASS_TIMEOUT,
        );
        client.list_countries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ELE_SOURCE_TAG, ELE_TAG};
    use crate::testutil::tagged_node;
    use crate::validate::ValidatedCategory;

    fn pipeline_in(dir: &std::path::Path) -> Pipeline {
        Pipeline::new(Config {
            output_dir: dir.to_path_buf(),
            dry_run: true,
            ..Default::default()
        })
    }

    fn valid_element(id: i64, lat: f64, lon: f64, elevation: f64) -> Element {
        let mut e = tagged_node(id, lat, lon, "railway", "station");
        e.tags.insert(ELE_TAG.into(), format!("{elevation:.1}"));
        e.tags.insert(ELE_SOURCE_TAG.into(), "SRTM".into());
        e.elevation_fetched = Some(elevation);
        e
    }

    #[test]
    fn test_filter_stage_reads_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());

        let raw = RawData {
            train_stations: vec![tagged_node(1, 44.4, 26.1, "railway", "station")],
            accommodations: vec![tagged_node(2, 45.3, 25.4, "tourism", "alpine_hut")],
        };
        store::save_json(&dir.path().join(RAW_FILE), &raw).unwrap();

        let filtered = pipeline.filter().unwrap();
        assert_eq!(filtered.total(), 2);
        assert!(dir.path().join(FILTERED_FILE).exists());
    }

    #[test]
    fn test_missing_stage_file_names_prerequisite() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());

        match pipeline.filter() {
            Err(Error::MissingStage { stage, .. }) => assert_eq!(stage, "extract"),
            other => panic!("expected MissingStage, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_stage() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());

        let enriched = EnrichedData {
            train_stations: vec![valid_element(1, 44.4, 26.1, 81.5)],
            alpine_huts: vec![valid_element(2, 45.4, 25.5, 9999.0)],
            other_accommodations: Vec::new(),
        };
        store::save_json(&dir.path().join(ENRICHED_FILE), &enriched).unwrap();

        let validated = pipeline.validate().unwrap();
        assert_eq!(validated.train_stations.valid_count, 1);
        assert_eq!(validated.alpine_huts.invalid_count, 1);
        assert!(dir.path().join(VALIDATED_FILE).exists());
    }

    #[test]
    fn test_upload_dry_run_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());

        let validated = ValidatedData {
            train_stations: ValidatedCategory {
                valid_count: 2,
                invalid_count: 0,
                valid_elements: vec![
                    valid_element(1, 44.4268, 26.1025, 81.5),
                    valid_element(2, 46.7712, 23.6236, 410.0),
                ],
            },
            ..Default::default()
        };
        store::save_json(&dir.path().join(VALIDATED_FILE), &validated).unwrap();

        let stats = pipeline.upload().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_upload_with_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());

        store::save_json(&dir.path().join(VALIDATED_FILE), &ValidatedData::default()).unwrap();

        match pipeline.upload() {
            Err(Error::NothingToUpload) => {}
            other => panic!("expected NothingToUpload, got {other:?}"),
        }
    }

    #[test]
    fn test_export_csv_stage() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path());

        let validated = ValidatedData {
            alpine_huts: ValidatedCategory {
                valid_count: 1,
                invalid_count: 0,
                valid_elements: vec![valid_element(3, 45.4, 25.5, 2100.0)],
            },
            ..Default::default()
        };
        store::save_json(&dir.path().join(VALIDATED_FILE), &validated).unwrap();

        let count = pipeline.export_csv().unwrap();
        assert_eq!(count, 1);
        assert!(dir.path().join(CSV_FILE).exists());
    }
}
