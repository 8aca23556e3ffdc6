use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::auth::DEFAULT_CLIENT_ID;
use crate::types::Band;

pub const DEFAULT_CATALOG_URL: &str =
    "https://catalogue.dataspace.copernicus.eu/odata/v1/Products";
pub const DEFAULT_TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://zipper.dataspace.copernicus.eu/odata/v1/Products";

/// Remote services used by a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub catalog_url: String,
    pub token_url: String,
    /// Base of `<base>(<id>)/$value`
    pub download_url: String,
    pub client_id: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// Run parameters suitable for config files; the CLI overlays its flags on top
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// GeoJSON boundary file
    pub mask: PathBuf,
    pub years: Vec<i32>,
    /// Products to materialize per year; required
    pub max_candidates: Option<usize>,
    /// Cloud cover ceiling in percent, exclusive
    pub cloud_cover: f64,
    pub sensor: String,
    pub credentials: PathBuf,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Search and select only; nothing is downloaded or purged
    pub dry_run: bool,
    /// Empty the year's cache after every candidate
    pub purge_each_candidate: bool,
    /// Leave the cache in place at the end of the run
    pub keep_cache: bool,
    /// Also write bands resampled onto the reference band grid
    pub align: bool,
    pub reference_band: Band,
    /// Projection assumed for rasters without an EPSG authority
    pub fallback_epsg: u32,
    /// Extra attempts per catalog page
    pub page_retries: u32,
    pub retry_delay_ms: u64,
    /// `$top` for catalog queries; server default when None
    pub page_size: Option<u32>,
    pub endpoints: Endpoints,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            mask: PathBuf::from("mask.geojson"),
            years: Vec::new(),
            max_candidates: None,
            cloud_cover: 20.0,
            sensor: "SENTINEL-2".to_string(),
            credentials: PathBuf::from("credentials.txt"),
            output_dir: PathBuf::from("output"),
            cache_dir: PathBuf::from("cache"),
            dry_run: false,
            purge_each_candidate: true,
            keep_cache: false,
            align: false,
            reference_band: Band::B02,
            fallback_epsg: 32631,
            page_retries: 3,
            retry_delay_ms: 2000,
            page_size: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl PipelineParams {
    /// Check required parameters and ranges before anything touches the network
    pub fn validate(&self) -> Result<()> {
        if self.years.is_empty() {
            return Err(Error::MissingArgument {
                arg: "years".to_string(),
            });
        }
        match self.max_candidates {
            None => {
                return Err(Error::MissingArgument {
                    arg: "max_candidates".to_string(),
                });
            }
            Some(0) => {
                return Err(Error::InvalidArgument {
                    arg: "max_candidates",
                    value: "0".to_string(),
                });
            }
            Some(_) => {}
        }
        if !(0.0..=100.0).contains(&self.cloud_cover) {
            return Err(Error::Configuration(format!(
                "cloud cover must be between 0 and 100, got {}",
                self.cloud_cover
            )));
        }
        if self.page_size == Some(0) {
            return Err(Error::InvalidArgument {
                arg: "page_size",
                value: "0".to_string(),
            });
        }
        if self.sensor.trim().is_empty() {
            return Err(Error::InvalidArgument {
                arg: "sensor",
                value: self.sensor.clone(),
            });
        }
        Ok(())
    }

    /// Validated candidate count
    pub fn candidate_limit(&self) -> Result<usize> {
        self.max_candidates.ok_or_else(|| Error::MissingArgument {
            arg: "max_candidates".to_string(),
        })
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Load from a JSON file; absent fields take their defaults
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read config file {:?}: {}", path, e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Configuration(format!("invalid config file {:?}: {}", path, e)))
    }
}
