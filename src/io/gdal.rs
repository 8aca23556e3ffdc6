use gdal::raster::{GdalDataType, GdalType, ResampleAlg};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, GeoTransform, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors encountered when using the GDAL reader
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Unsupported pixel type {0:?}")]
    UnsupportedPixelType(GdalDataType),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// Metadata extracted from a GDAL-supported raster
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: GeoTransform,
    /// Projection in WKT format (empty when the raster is not georeferenced)
    pub projection: String,
    /// EPSG code parsed from the projection authority, if any
    pub epsg: Option<u32>,
    /// Pixel type of band 1
    pub data_type: GdalDataType,
    /// Additional metadata key-value pairs
    pub metadata: HashMap<String, String>,
}

/// Pixel offset and size of a raster sub-window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub cols: usize,
    pub rows: usize,
}

/// Reader for band rasters (JPEG2000, GeoTIFF, ...) via GDAL
pub struct GdalRasterReader {
    pub path: PathBuf,
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

// Helper to extract EPSG code from WKT authority tag
pub(crate) fn parse_epsg(wkt: &str) -> Option<u32> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    const KEY2: &str = "ID[\"EPSG\",";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            return wkt[start..start + end].parse().ok();
        }
    }
    if let Some(idx) = wkt.rfind(KEY2) {
        let start = idx + KEY2.len();
        if let Some(end) = wkt[start..].find(']') {
            return wkt[start..start + end].trim().parse().ok();
        }
    }
    None
}

impl GdalRasterReader {
    /// Open a GDAL-supported raster
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat(format!(
                "No raster bands found in {:?}",
                path.as_ref()
            )));
        }
        let geotransform = match dataset.geo_transform() {
            Ok(gt) => gt,
            Err(_) => [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        let projection = dataset.projection();
        let epsg = parse_epsg(&projection);
        let data_type = dataset.rasterband(1)?.band_type();
        // Collect metadata entries (domain "")
        let mut metadata_map = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, val)) = entry.split_once('=') {
                    metadata_map.insert(key.to_string(), val.to_string());
                }
            }
        }
        Ok(GdalRasterReader {
            path: path.as_ref().to_path_buf(),
            dataset,
            metadata: GdalMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                projection,
                epsg,
                data_type,
                metadata: metadata_map,
            },
        })
    }

    /// Shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.metadata.size_y, self.metadata.size_x)
    }

    /// Spatial reference of the raster in authority axis order.
    /// Falls back to `fallback_epsg` when the projection carries no EPSG authority.
    pub fn spatial_ref(&self, fallback_epsg: u32) -> Result<SpatialRef, GdalError> {
        let srs = match self.metadata.epsg {
            Some(code) => SpatialRef::from_epsg(code)?,
            None if !self.metadata.projection.is_empty() => {
                SpatialRef::from_wkt(&self.metadata.projection)?
            }
            None => SpatialRef::from_epsg(fallback_epsg)?,
        };
        Ok(srs)
    }

    /// Read a window of a single band (1-based index) as an ndarray of shape (rows, cols)
    pub fn read_window<T: GdalType + Copy>(
        &self,
        index: usize,
        window: PixelWindow,
    ) -> Result<Array2<T>, GdalError> {
        self.check_index(index)?;
        let band = self.dataset.rasterband(index)?;
        let size = (window.cols, window.rows);
        let buf = band.read_as::<T>(
            (window.col_off as isize, window.row_off as isize),
            size,
            size,
            None,
        )?;
        let data_vec = buf.data().to_vec();
        Array2::from_shape_vec((window.rows, window.cols), data_vec).map_err(|_| {
            GdalError::DimensionMismatch(window.cols, window.rows, size.0, size.1)
        })
    }

    /// Read a full band (1-based index)
    pub fn read_band<T: GdalType + Copy>(&self, index: usize) -> Result<Array2<T>, GdalError> {
        self.read_window(
            index,
            PixelWindow {
                col_off: 0,
                row_off: 0,
                cols: self.metadata.size_x,
                rows: self.metadata.size_y,
            },
        )
    }

    /// Read a full band resampled to (rows, cols) with the given algorithm
    pub fn read_band_resampled(
        &self,
        index: usize,
        out_shape: (usize, usize),
        e_resample_alg: ResampleAlg,
    ) -> Result<Array2<f64>, GdalError> {
        self.check_index(index)?;
        let (rows, cols) = out_shape;
        let band = self.dataset.rasterband(index)?;
        let buf = band.read_as::<f64>(
            (0, 0),
            (self.metadata.size_x, self.metadata.size_y),
            (cols, rows),
            Some(e_resample_alg),
        )?;
        let data_vec = buf.data().to_vec();
        Array2::from_shape_vec((rows, cols), data_vec)
            .map_err(|_| GdalError::DimensionMismatch(cols, rows, cols, rows))
    }

    fn check_index(&self, index: usize) -> Result<(), GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        Ok(())
    }
}
