//! Upload of validated elements to the OSM API.
//!
//! The OSM API caps the geographic area a changeset may span, so the
//! uploader never pushes a country-wide edit set through a single
//! changeset. Elements arrive here already partitioned into area-bounded
//! clusters; each cluster gets its own changeset, opened with a comment
//! that names the cluster's size and position in the run.
//!
//! Failure isolation is per cluster: if one changeset cannot be opened the
//! cluster's members are recorded as failed and the run continues with the
//! next cluster. Within a successfully opened changeset, failures are per
//! element.
//!
//! Reads use the API's JSON views; writes use the XML bodies the 0.6 API
//! requires, assembled locally.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::element::{Element, ElementType, ELE_SOURCE_TAG, ELE_TAG};
use crate::{Error, Result};

/// Value of the `created_by` changeset tag.
pub const GENERATOR: &str = "osm-elevate";

/// A node as currently stored by the OSM API.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveNode {
    pub id: i64,
    pub version: u64,
    pub lat: f64,
    pub lon: f64,
    pub tags: BTreeMap<String, String>,
}

/// A way as currently stored by the OSM API.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveWay {
    pub id: i64,
    pub version: u64,
    pub nodes: Vec<i64>,
    pub tags: BTreeMap<String, String>,
}

/// The OSM API operations the uploader needs.
///
/// Trait-shaped so tests can substitute a scripted implementation.
pub trait OsmApi {
    fn create_changeset(&self, comment: &str) -> Result<u64>;
    fn close_changeset(&self, changeset: u64) -> Result<()>;
    fn fetch_node(&self, id: i64) -> Result<LiveNode>;
    fn fetch_way(&self, id: i64) -> Result<LiveWay>;
    fn update_node(&self, node: &LiveNode, changeset: u64) -> Result<()>;
    fn update_way(&self, way: &LiveWay, changeset: u64) -> Result<()>;
}

#[derive(Deserialize)]
struct OsmJsonResponse {
    #[serde(default)]
    elements: Vec<OsmJsonElement>,
}

#[derive(Deserialize)]
struct OsmJsonElement {
    id: i64,
    #[serde(default)]
    version: u64,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    nodes: Vec<i64>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Authenticated client for the OSM API 0.6.
pub struct OsmApiClient {
    agent: ureq::Agent,
    base_url: String,
    access_token: Option<String>,
}

impl OsmApiClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.into(),
            access_token,
        }
    }

    fn bearer(&self) -> Result<String> {
        let token = self.access_token.as_deref().ok_or(Error::MissingToken)?;
        Ok(format!("Bearer {token}"))
    }

    fn put_xml(&self, url: &str, body: &str) -> Result<String> {
        let response = self
            .agent
            .put(url)
            .set("Authorization", &self.bearer()?)
            .set("Content-Type", "text/xml")
            .send_string(body)
            .map_err(osm_error)?;
        response
            .into_string()
            .map_err(|e| Error::OsmApi(format!("failed to read response body: {e}")))
    }

    fn get_json(&self, url: &str) -> Result<OsmJsonResponse> {
        let response = self.agent.get(url).call().map_err(osm_error)?;
        response
            .into_json()
            .map_err(|e| Error::OsmApi(format!("failed to decode response: {e}")))
    }
}

impl OsmApi for OsmApiClient {
    fn create_changeset(&self, comment: &str) -> Result<u64> {
        let url = format!("{}/changeset/create", self.base_url);
        let body = self.put_xml(&url, &changeset_xml(comment))?;
        let id = body
            .trim()
            .parse()
            .map_err(|_| Error::OsmApi(format!("unexpected changeset id: {body:?}")))?;
        log::info!("Created changeset #{id}");
        Ok(id)
    }

    fn close_changeset(&self, changeset: u64) -> Result<()> {
        let url = format!("{}/changeset/{}/close", self.base_url, changeset);
        self.put_xml(&url, "")?;
        log::info!("Closed changeset #{changeset}");
        Ok(())
    }

    fn fetch_node(&self, id: i64) -> Result<LiveNode> {
        let url = format!("{}/node/{}.json", self.base_url, id);
        let element = self
            .get_json(&url)?
            .elements
            .into_iter()
            .next()
            .ok_or_else(|| Error::OsmApi(format!("no data returned for node {id}")))?;
        Ok(LiveNode {
            id: element.id,
            version: element.version,
            lat: element.lat,
            lon: element.lon,
            tags: element.tags,
        })
    }

    fn fetch_way(&self, id: i64) -> Result<LiveWay> {
        let url = format!("{}/way/{}.json", self.base_url, id);
        let element = self
            .get_json(&url)?
            .elements
            .into_iter()
            .next()
            .ok_or_else(|| Error::OsmApi(format!("no data returned for way {id}")))?;
        Ok(LiveWay {
            id: element.id,
            version: element.version,
            nodes: element.nodes,
            tags: element.tags,
        })
    }

    fn update_node(&self, node: &LiveNode, changeset: u64) -> Result<()> {
        let url = format!("{}/node/{}", self.base_url, node.id);
        self.put_xml(&url, &node_xml(node, changeset))?;
        Ok(())
    }

    fn update_way(&self, way: &LiveWay, changeset: u64) -> Result<()> {
        let url = format!("{}/way/{}", self.base_url, way.id);
        self.put_xml(&url, &way_xml(way, changeset))?;
        Ok(())
    }
}

fn osm_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            Error::OsmApi(format!("status {code}: {body}"))
        }
        other => Error::OsmApi(other.to_string()),
    }
}

// ========== XML assembly ==========

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn tag_lines(tags: &BTreeMap<String, String>) -> String {
    let mut lines = String::new();
    for (key, value) in tags {
        lines.push_str(&format!(
            "    <tag k=\"{}\" v=\"{}\"/>\n",
            xml_escape(key),
            xml_escape(value)
        ));
    }
    lines
}

fn changeset_xml(comment: &str) -> String {
    format!(
        "<osm>\n  <changeset>\n    <tag k=\"created_by\" v=\"{GENERATOR}\"/>\n    \
         <tag k=\"comment\" v=\"{}\"/>\n  </changeset>\n</osm>\n",
        xml_escape(comment)
    )
}

fn node_xml(node: &LiveNode, changeset: u64) -> String {
    format!(
        "<osm version=\"0.6\" generator=\"{GENERATOR}\">\n  \
         <node id=\"{}\" changeset=\"{changeset}\" version=\"{}\" lat=\"{}\" lon=\"{}\">\n{}  </node>\n</osm>\n",
        node.id,
        node.version,
        node.lat,
        node.lon,
        tag_lines(&node.tags)
    )
}

fn way_xml(way: &LiveWay, changeset: u64) -> String {
    let mut refs = String::new();
    for node_ref in &way.nodes {
        refs.push_str(&format!("    <nd ref=\"{node_ref}\"/>\n"));
    }
    format!(
        "<osm version=\"0.6\" generator=\"{GENERATOR}\">\n  \
         <way id=\"{}\" changeset=\"{changeset}\" version=\"{}\">\n{}{}  </way>\n</osm>\n",
        way.id,
        way.version,
        refs,
        tag_lines(&way.tags)
    )
}

// ========== Uploader ==========

/// A failed element upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadError {
    pub element_type: ElementType,
    pub element_id: i64,
    pub error: String,
}

/// Outcome of an upload run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<UploadError>,
}

impl UploadStats {
    fn record_failure(&mut self, element: &Element, error: String) {
        self.failed += 1;
        self.errors.push(UploadError {
            element_type: element.element_type,
            element_id: element.id,
            error,
        });
    }
}

/// Uploads clustered elements, one changeset per cluster.
pub struct Uploader<A> {
    api: A,
    country: String,
    dry_run: bool,
    batch_delay: Duration,
}

impl<A: OsmApi> Uploader<A> {
    pub fn new(api: A, country: impl Into<String>) -> Self {
        Self {
            api,
            country: country.into(),
            dry_run: false,
            batch_delay: Duration::from_millis(1000),
        }
    }

    /// Log every action instead of performing it.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the pause between consecutive changesets.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Upload every cluster in order.
    pub fn upload(&self, clusters: &[Cluster<Element>]) -> UploadStats {
        let total_clusters = clusters.len();
        let mut stats = UploadStats {
            total: clusters.iter().map(Cluster::len).sum(),
            ..Default::default()
        };

        for (index, cluster) in clusters.iter().enumerate() {
            let comment = format!(
                "Add elevation data to {} locations in {} (batch {}/{})",
                cluster.len(),
                self.country,
                index + 1,
                total_clusters
            );
            log::info!(
                "Uploading cluster {}/{}: {} elements, {:.4} degree diagonal",
                index + 1,
                total_clusters,
                cluster.len(),
                cluster.diagonal()
            );

            self.upload_cluster(cluster, &comment, &mut stats);

            if !self.dry_run && index + 1 < total_clusters {
                thread::sleep(self.batch_delay);
            }
        }

        log::info!(
            "Upload finished: {}/{} successful, {} failed",
            stats.successful,
            stats.total,
            stats.failed
        );

        stats
    }

    fn upload_cluster(&self, cluster: &Cluster<Element>, comment: &str, stats: &mut UploadStats) {
        if self.dry_run {
            log::info!("[dry-run] Would create changeset: {comment}");
            for element in &cluster.members {
                log::info!(
                    "[dry-run] Would update {} {} with ele={}",
                    element.element_type,
                    element.id,
                    element.tag(ELE_TAG).unwrap_or("?")
                );
                stats.successful += 1;
            }
            return;
        }

        let changeset = match self.api.create_changeset(comment) {
            Ok(id) => id,
            Err(err) => {
                // Cluster-level isolation: skip this cluster, keep going.
                log::warn!("Failed to open changeset, skipping cluster: {err}");
                for element in &cluster.members {
                    stats.record_failure(element, format!("changeset not opened: {err}"));
                }
                return;
            }
        };

        for element in &cluster.members {
            match self.upload_element(element, changeset) {
                Ok(()) => {
                    log::debug!(
                        "Updated {} {} with ele={}",
                        element.element_type,
                        element.id,
                        element.tag(ELE_TAG).unwrap_or("?")
                    );
                    stats.successful += 1;
                }
                Err(err) => {
                    log::warn!(
                        "Failed to update {} {}: {err}",
                        element.element_type,
                        element.id
                    );
                    stats.record_failure(element, err.to_string());
                }
            }
        }

        if let Err(err) = self.api.close_changeset(changeset) {
            log::warn!("Failed to close changeset #{changeset}: {err}");
        }
    }

    fn upload_element(&self, element: &Element, changeset: u64) -> Result<()> {
        let Some(elevation) = element.tag(ELE_TAG).filter(|v| !v.is_empty()) else {
            return Err(Error::OsmApi("missing elevation data in tags".into()));
        };
        let Some(source) = element.tag(ELE_SOURCE_TAG).filter(|v| !v.is_empty()) else {
            return Err(Error::OsmApi("missing elevation data in tags".into()));
        };
        let updates = [
            (ELE_TAG, elevation.to_string()),
            (ELE_SOURCE_TAG, source.to_string()),
        ];

        match element.element_type {
            ElementType::Node => {
                let mut node = self.api.fetch_node(element.id)?;
                merge_tags(&mut node.tags, updates);
                self.api.update_node(&node, changeset)
            }
            ElementType::Way => {
                let mut way = self.api.fetch_way(element.id)?;
                merge_tags(&mut way.tags, updates);
                self.api.update_way(&way, changeset)
            }
        }
    }
}

/// Merge tag updates into an existing tag map, overwriting on key clashes.
fn merge_tags<const N: usize>(tags: &mut BTreeMap<String, String>, updates: [(&str, String); N]) {
    for (key, value) in updates {
        tags.insert(key.to_string(), value);
    }
}
