//! Bring bands of differing native resolution onto one pixel grid.
use std::path::Path;

use gdal::GeoTransform;
use gdal::raster::ResampleAlg;
use ndarray::{Array2, Zip};
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::GdalRasterReader;

/// Target band re-read on the reference band's grid
#[derive(Debug, Clone)]
pub struct Resampled {
    pub data: Array2<f64>,
    pub geotransform: GeoTransform,
}

/// Scale a geotransform for a raster whose pixel counts change from `old` to `new`
/// (both as rows, cols); the covered extent stays the same.
pub fn scale_geotransform(
    geotransform: &GeoTransform,
    old: (usize, usize),
    new: (usize, usize),
) -> GeoTransform {
    let sx = old.1 as f64 / new.1 as f64;
    let sy = old.0 as f64 / new.0 as f64;
    let mut gt = *geotransform;
    gt[1] *= sx;
    gt[4] *= sx;
    gt[2] *= sy;
    gt[5] *= sy;
    gt
}

/// Upsample `target` by its pixel-count ratio to `reference`, bilinearly
pub fn resample(reference: &Path, target: &Path) -> Result<Resampled> {
    let reference = GdalRasterReader::open(reference)?;
    let target = GdalRasterReader::open(target)?;
    let (ref_rows, ref_cols) = reference.shape();
    let (rows, cols) = target.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::Processing(format!("{:?} is empty", target.path)));
    }

    let ratio_x = ref_cols as f64 / cols as f64;
    let ratio_y = ref_rows as f64 / rows as f64;
    let out_shape = (
        (rows as f64 * ratio_y).round() as usize,
        (cols as f64 * ratio_x).round() as usize,
    );
    debug!(
        "Resampling {:?} from {}x{} to {}x{}",
        target.path, cols, rows, out_shape.1, out_shape.0
    );
    let data = target.read_band_resampled(1, out_shape, ResampleAlg::Bilinear)?;
    let geotransform = scale_geotransform(&target.metadata.geotransform, (rows, cols), out_shape);
    Ok(Resampled { data, geotransform })
}

/// Zero every target cell where the reference holds zero.
/// Both arrays must already share a shape; resample first when they don't.
pub fn clean<R, T>(reference: &Array2<R>, target: &Array2<T>) -> Result<Array2<T>>
where
    R: Copy + PartialEq + Default,
    T: Copy + Default,
{
    if reference.dim() != target.dim() {
        return Err(Error::ShapeMismatch {
            reference: reference.dim(),
            target: target.dim(),
        });
    }
    let mut cleaned = target.clone();
    Zip::from(&mut cleaned).and(reference).for_each(|t, &r| {
        if r == R::default() {
            *t = T::default();
        }
    });
    Ok(cleaned)
}
