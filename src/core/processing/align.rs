//! Aligned output: every clipped band on the reference band's grid, masked to its footprint.
use std::path::Path;

use tracing::{info, warn};

use crate::core::processing::clip::band_output_path;
use crate::core::processing::resample::{Resampled, clean, resample};
use crate::error::Result;
use crate::io::GdalRasterReader;
use crate::io::writers::metadata::embed_tiff_metadata;
use crate::io::writers::tiff::write_single_band;
use crate::types::{Band, BandPathMap, ProductRecord};

/// Write Float32 copies of `clipped` bands aligned to `reference` into `aligned_dir`.
/// Returns an empty map, with a warning, when the reference band is missing.
pub fn align_product(
    clipped: &BandPathMap,
    reference: Band,
    aligned_dir: &Path,
    product: &ProductRecord,
) -> Result<BandPathMap> {
    let mut aligned = BandPathMap::new();
    let Some(reference_path) = clipped.get(&reference) else {
        warn!(
            "Reference band {} missing for {}; skipping alignment",
            reference, product.name
        );
        return Ok(aligned);
    };
    std::fs::create_dir_all(aligned_dir)?;

    let reference_reader = GdalRasterReader::open(reference_path)?;
    let reference_data = reference_reader.read_band::<f64>(1)?;
    let projection = reference_reader.metadata.projection.clone();

    for (&band, path) in clipped {
        let Resampled { data, geotransform } = if band == reference {
            Resampled {
                data: reference_data.clone(),
                geotransform: reference_reader.metadata.geotransform,
            }
        } else {
            let reader = GdalRasterReader::open(path)?;
            if reader.shape() == reference_reader.shape() {
                Resampled {
                    data: reader.read_band::<f64>(1)?,
                    geotransform: reader.metadata.geotransform,
                }
            } else {
                resample(reference_path, path)?
            }
        };
        let cleaned = clean(&reference_data, &data)?.mapv(|v| v as f32);

        let output = band_output_path(aligned_dir, band);
        let mut ds = write_single_band(&output, &cleaned, &geotransform, &projection)?;
        embed_tiff_metadata(&mut ds, product, band)?;
        drop(ds);
        aligned.insert(band, output);
    }
    info!(
        "Aligned {} bands to {} grid in {:?}",
        aligned.len(),
        reference,
        aligned_dir
    );
    Ok(aligned)
}
