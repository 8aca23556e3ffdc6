//! I/O layer: remote access to the catalog, identity, and download services,
//! area-of-interest loading, archive extraction, GDAL raster adapters, and
//! `writers` for GeoTIFF outputs and metadata embedding/sidecars.
pub mod http;
pub use http::{HttpTransport, Transport, TransportError};

pub mod auth;
pub mod catalog;
pub mod download;
pub mod geometry;

pub mod archive;

pub mod gdal;
pub use gdal::{GdalError, GdalMetadata, GdalRasterReader, PixelWindow};

pub mod writers;
