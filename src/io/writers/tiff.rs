use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager, GeoTransform};
use ndarray::Array2;
use std::path::Path;

use crate::io::GdalError;

/// Write a single-band GeoTIFF of the array's pixel type.
/// No nodata value is set; the caller decides what zero means.
pub fn write_single_band<T: GdalType + Copy>(
    output: &Path,
    data: &Array2<T>,
    geotransform: &GeoTransform,
    projection: &str,
) -> Result<Dataset, GdalError> {
    let (rows, cols) = data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut ds = driver.create_with_band_type::<T, _>(output, cols, rows, 1)?;
    ds.set_geo_transform(geotransform)?;
    if !projection.is_empty() {
        ds.set_projection(projection)?;
    }
    let mut buf = Buffer::new((cols, rows), data.iter().copied().collect());
    let mut band = ds.rasterband(1)?;
    band.write((0, 0), (cols, rows), &mut buf)?;
    Ok(ds)
}
