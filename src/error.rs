//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, HTTP transport, and GDAL errors, and provides semantic
//! variants for each failure class of the acquisition pipeline.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::io::TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("Geometry source error: {0}")]
    GeometrySource(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Catalog fetch error: {0}")]
    CatalogFetch(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Shape mismatch: reference {reference:?}, target {target:?}")]
    ShapeMismatch {
        reference: (usize, usize),
        target: (usize, usize),
    },

    #[error("Area of interest does not overlap raster: {0}")]
    NoOverlap(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    /// True for failures that only abort the candidate being processed.
    /// Everything else (configuration, geometry, authentication, cache I/O) is fatal for the run.
    pub fn is_candidate_scoped(&self) -> bool {
        matches!(
            self,
            Error::Download(_)
                | Error::Extraction(_)
                | Error::Gdal(_)
                | Error::ShapeMismatch { .. }
                | Error::NoOverlap(_)
                | Error::Processing(_)
        )
    }
}
