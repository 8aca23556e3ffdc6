use chrono::Utc;
use gdal::{Dataset, Metadata};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::io::GdalError;
use crate::types::{Band, ProductRecord};

pub const SIDECAR_FILE_NAME: &str = "product.json";

/// Extract the per-band metadata tags written into each clipped GeoTIFF
pub fn extract_metadata_fields(product: &ProductRecord, band: Band) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("PRODUCT_ID".to_string(), product.id.clone());
    metadata.insert("PRODUCT_NAME".to_string(), product.name.clone());
    metadata.insert("BAND".to_string(), band.code().to_string());
    metadata.insert(
        "ACQUISITION_START".to_string(),
        product.acquisition_timestamp.to_rfc3339(),
    );
    metadata.insert(
        "CONVERSION_TOOL".to_string(),
        format!("s2harvest {}", env!("CARGO_PKG_VERSION")),
    );
    metadata
}

/// Embed product metadata into a GeoTIFF dataset
pub fn embed_tiff_metadata(
    ds: &mut Dataset,
    product: &ProductRecord,
    band: Band,
) -> std::result::Result<(), GdalError> {
    for (key, value) in extract_metadata_fields(product, band) {
        ds.set_metadata_item(&key, &value, "")?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ProductSidecar<'a> {
    product: &'a ProductRecord,
    bands: HashMap<String, PathBuf>,
    processed_at: String,
    tool: String,
}

/// Write `product.json` describing the product and the band files produced for it
pub fn write_product_sidecar(
    product_dir: &Path,
    product: &ProductRecord,
    bands: &std::collections::BTreeMap<Band, PathBuf>,
) -> Result<PathBuf> {
    let sidecar = ProductSidecar {
        product,
        bands: bands
            .iter()
            .map(|(band, path)| {
                let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
                (band.code().to_string(), file)
            })
            .collect(),
        processed_at: Utc::now().to_rfc3339(),
        tool: format!("s2harvest {}", env!("CARGO_PKG_VERSION")),
    };
    let sidecar_path = product_dir.join(SIDECAR_FILE_NAME);
    let json_string = serde_json::to_string_pretty(&sidecar).map_err(crate::Error::external)?;
    std::fs::write(&sidecar_path, json_string)?;
    info!("Created product metadata sidecar: {:?}", sidecar_path);
    Ok(sidecar_path)
}
