//! Output writers: single-band GeoTIFFs and product metadata.
pub mod metadata;
pub mod tiff;
