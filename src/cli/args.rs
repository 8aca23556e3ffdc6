use clap::Parser;
use std::path::PathBuf;

use s2harvest::Band;

#[derive(Parser)]
#[command(name = "s2harvest", version, about = "Sentinel-2 acquisition and clipping CLI")]
pub struct CliArgs {
    /// GeoJSON boundary of the area of interest
    #[arg(short, long)]
    pub mask: Option<PathBuf>,

    /// Acquisition years to search (repeatable)
    #[arg(short, long, num_args = 1..)]
    pub years: Vec<i32>,

    /// Maximum number of products to materialize per year
    #[arg(short = 'n', long)]
    pub max_candidates: Option<usize>,

    /// Cloud cover ceiling in percent (exclusive)
    #[arg(long)]
    pub cloud_cover: Option<f64>,

    /// Collection name used in the catalog query
    #[arg(long)]
    pub sensor: Option<String>,

    /// Two-line credential file (username, password)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Output root; clipped bands go to <output>/clipped/<year>/<product>/
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Working directory for archives and extractions
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// JSON file with run parameters; command-line flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Search and select only; no token, download, or cache purge
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Leave the cache in place when the run ends
    #[arg(long, default_value_t = false)]
    pub keep_cache: bool,

    /// Do not empty the year's cache after each product
    #[arg(long, default_value_t = false)]
    pub no_purge: bool,

    /// Also write bands resampled onto the reference band grid
    #[arg(long, default_value_t = false)]
    pub align: bool,

    /// Reference band for --align
    #[arg(long, value_enum, ignore_case = true)]
    pub reference_band: Option<Band>,

    /// EPSG code assumed for rasters without a projection authority
    #[arg(long)]
    pub fallback_epsg: Option<u32>,

    /// Extra attempts per catalog page before the year's search fails
    #[arg(long)]
    pub page_retries: Option<u32>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
