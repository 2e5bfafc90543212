//! CLI for osm-elevate - add elevation tags to OSM elements.
//!
//! This is a thin wrapper around the osm-elevate-core library: it parses
//! arguments, builds a [`Config`], and dispatches to the requested pipeline
//! stage.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use osm_elevate_core::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "osm-elevate",
    about = "Add elevation data to OSM train stations and accommodations",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Country to process (OSM admin_level=2 area name, case-sensitive)
    #[arg(long, global = true, default_value = "România")]
    country: String,

    /// Directory for stage files
    #[arg(long, global = true, default_value = "output")]
    output_dir: PathBuf,

    /// Limit processed elements per category (for test runs)
    #[arg(long, global = true)]
    limit: Option<usize>,

    /// Log upload actions without performing them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Changeset bounding-box diagonal limit in degrees
    #[arg(long, global = true, default_value_t = osm_elevate_core::DEFAULT_MAX_DIAGONAL)]
    max_diagonal: f64,

    /// Overpass API endpoint
    #[arg(
        long,
        global = true,
        env = "OVERPASS_URL",
        default_value = "https://overpass-api.de/api/interpreter"
    )]
    overpass_url: String,

    /// OpenTopoData dataset endpoint
    #[arg(
        long,
        global = true,
        env = "OPENTOPO_URL",
        default_value = "https://api.opentopodata.org/v1/srtm30m"
    )]
    opentopo_url: String,

    /// OSM API base URL
    #[arg(
        long,
        global = true,
        env = "OSM_API_URL",
        default_value = "https://api.openstreetmap.org/api/0.6"
    )]
    osm_api_url: String,

    /// OAuth2 bearer token for the OSM API
    #[arg(long, global = true, env = "OSM_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Delay between remote calls, in milliseconds
    #[arg(long, global = true, env = "API_RATE_LIMIT_MS", default_value_t = 1000)]
    rate_limit_ms: u64,

    /// Locations per elevation lookup request (max 100)
    #[arg(long, global = true, env = "BATCH_SIZE", default_value_t = 100)]
    batch_size: usize,

    /// HTTP timeout in seconds
    #[arg(long, global = true, env = "API_TIMEOUT_SEC", default_value_t = 30)]
    timeout_sec: u64,

    /// Lowest accepted elevation in meters
    #[arg(long, global = true, default_value_t = 0.0)]
    min_elevation: f64,

    /// Highest accepted elevation in meters
    #[arg(long, global = true, default_value_t = 2600.0)]
    max_elevation: f64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query Overpass for elements missing elevation
    Extract,
    /// Keep enrichable elements and categorize them
    Filter,
    /// Fetch elevations from OpenTopoData
    Enrich,
    /// Range-check fetched elevations
    Validate,
    /// Write the CSV review file
    ExportCsv,
    /// Upload validated elements in area-bounded changesets
    Upload,
    /// Run every stage in order
    All,
    /// List all available admin_level=2 countries
    ListCountries,
}

impl Args {
    fn to_config(&self) -> Config {
        Config {
            country: self.country.clone(),
            output_dir: self.output_dir.clone(),
            overpass_url: self.overpass_url.clone(),
            opentopo_url: self.opentopo_url.clone(),
            osm_api_url: self.osm_api_url.clone(),
            access_token: self.access_token.clone(),
            rate_limit: Duration::from_millis(self.rate_limit_ms),
            batch_size: self.batch_size,
            timeout: Duration::from_secs(self.timeout_sec),
            min_elevation: self.min_elevation,
            max_elevation: self.max_elevation,
            max_diagonal: self.max_diagonal,
            limit: self.limit,
            dry_run: self.dry_run,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let pipeline = Pipeline::new(args.to_config());

    match args.command {
        Command::Extract => {
            pipeline.extract().context("Extract failed")?;
        }
        Command::Filter => {
            pipeline.filter().context("Filter failed")?;
        }
        Command::Enrich => {
            pipeline.enrich().context("Enrich failed")?;
        }
        Command::Validate => {
            pipeline.validate().context("Validate failed")?;
        }
        Command::ExportCsv => {
            let count = pipeline.export_csv().context("Export failed")?;
            println!("✓ Exported {count} elements");
        }
        Command::Upload => {
            let stats = pipeline.upload().context("Upload failed")?;
            println!(
                "✓ Upload complete: {}/{} successful, {} failed",
                stats.successful, stats.total, stats.failed
            );
        }
        Command::All => {
            log::info!(
                "Adding elevation to train stations and accommodations in {}",
                pipeline.config().country
            );
            pipeline.run_all().context("Pipeline failed")?;
            println!("✓ All stages completed");
        }
        Command::ListCountries => {
            let countries = pipeline
                .list_countries()
                .context("Failed to list countries")?;
            println!("Found {} countries:\n", countries.len());
            for country in countries {
                match country.int_name {
                    Some(int_name) if int_name != country.name => {
                        println!("  {:<40} (int_name: {int_name})", country.name)
                    }
                    _ => println!("  {}", country.name),
                }
            }
        }
    }

    Ok(())
}
