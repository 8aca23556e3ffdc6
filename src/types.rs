//! Shared types and enums used across s2harvest.
//! Includes `Band`, `BandPathMap`, `AreaOfInterest`, `SearchCriteria`, `ProductRecord`,
//! and the credential/token pair used against the identity service.
use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use geo::Polygon;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Spectral bands of a Sentinel-2 MSI product
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Debug, Serialize, Deserialize)]
pub enum Band {
    B01,
    B02,
    B03,
    B04,
    B05,
    B06,
    B07,
    B08,
    #[value(name = "b8a")]
    B8A,
    B09,
    B10,
    B11,
    B12,
}

impl Band {
    pub const ALL: [Band; 13] = [
        Band::B01,
        Band::B02,
        Band::B03,
        Band::B04,
        Band::B05,
        Band::B06,
        Band::B07,
        Band::B08,
        Band::B8A,
        Band::B09,
        Band::B10,
        Band::B11,
        Band::B12,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Band::B01 => "B01",
            Band::B02 => "B02",
            Band::B03 => "B03",
            Band::B04 => "B04",
            Band::B05 => "B05",
            Band::B06 => "B06",
            Band::B07 => "B07",
            Band::B08 => "B08",
            Band::B8A => "B8A",
            Band::B09 => "B09",
            Band::B10 => "B10",
            Band::B11 => "B11",
            Band::B12 => "B12",
        }
    }

    /// Parse a band code such as `B8A` or `b02` (case-insensitive)
    pub fn from_code(code: &str) -> Option<Band> {
        Band::ALL
            .iter()
            .copied()
            .find(|b| b.code().eq_ignore_ascii_case(code))
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Band identifier → file on local storage. Only bands actually found are present.
pub type BandPathMap = BTreeMap<Band, PathBuf>;

/// The single polygon used for search and clipping, plus its reference system
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    pub polygon: Polygon<f64>,
    pub epsg: u32,
}

/// Parameters of one catalog query
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub year: i32,
    pub cloud_cover_ceiling: f64,
    pub sensor: String,
    pub geometry: AreaOfInterest,
}

impl SearchCriteria {
    /// Fails with `Error::Configuration` when the cloud cover ceiling is outside [0, 100]
    pub fn new(
        year: i32,
        cloud_cover_ceiling: f64,
        sensor: impl Into<String>,
        geometry: AreaOfInterest,
    ) -> Result<Self> {
        if !(0.0..=100.0).contains(&cloud_cover_ceiling) {
            return Err(Error::Configuration(format!(
                "cloud cover must be between 0 and 100, got {}",
                cloud_cover_ceiling
            )));
        }
        Ok(Self {
            year,
            cloud_cover_ceiling,
            sensor: sensor.into(),
            geometry,
        })
    }
}

/// A product returned by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    /// Archive and output folder name
    pub name: String,
    /// Footprint as plain WKT (SRID prefix removed)
    pub footprint: Option<String>,
    pub acquisition_timestamp: DateTime<Utc>,
    pub online: Option<bool>,
    pub content_length: Option<u64>,
}

/// Account identifier and secret read from the credential file
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Opaque bearer token; its expiry is decided by the identity service
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(***)")
    }
}
