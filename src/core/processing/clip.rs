//! Clip band rasters of one product to the area of interest.
//!
//! The area of interest is reprojected once into the product's native projection,
//! then every band is cropped to the polygon's pixel envelope and masked. Pixels
//! outside the mask are written as zero in the input pixel type; no nodata value
//! is declared.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gdal::raster::{GdalDataType, GdalType};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{GeoTransform, GeoTransformEx};
use geo::{BoundingRect, Contains, Coord, Intersects, LineString, Point, Polygon};
use ndarray::{Array2, Zip};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::writers::metadata::embed_tiff_metadata;
use crate::io::writers::tiff::write_single_band;
use crate::io::{GdalError, GdalRasterReader, PixelWindow};
use crate::types::{AreaOfInterest, Band, BandPathMap, ProductRecord};

// pixel footprints are shrunk by this much so that edge-adjacent pixels don't count as touched
const FOOTPRINT_INSET: f64 = 1e-6;
// pixel coordinates closer than this to an integer are snapped before rounding outward
const SNAP: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct ClipOptions {
    /// Keep every pixel the polygon touches, not only those whose centre it contains
    pub all_touched: bool,
    /// Projection assumed when a raster carries no EPSG authority
    pub fallback_epsg: u32,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self {
            all_touched: true,
            fallback_epsg: 32631,
        }
    }
}

/// Area of interest expressed in a raster's native projection
#[derive(Debug, Clone)]
pub struct NativeAoi {
    pub polygon: Polygon<f64>,
    /// WKT of the native projection, written to every output
    pub projection: String,
}

/// Reproject `aoi` into the spatial reference of `reader`.
///
/// Geographic reference systems are used in authority axis order (lat, lon),
/// so coordinates are swapped on the way in and, for geographic targets, on the way out.
pub fn reproject_aoi(
    aoi: &AreaOfInterest,
    reader: &GdalRasterReader,
    fallback_epsg: u32,
) -> std::result::Result<NativeAoi, GdalError> {
    let source = SpatialRef::from_epsg(aoi.epsg)?;
    let target = reader.spatial_ref(fallback_epsg)?;
    let transform = CoordTransform::new(&source, &target)?;
    let swap_in = source.is_geographic();
    let swap_out = target.is_geographic();

    let ring = |line: &LineString<f64>| -> std::result::Result<LineString<f64>, GdalError> {
        let (mut xs, mut ys): (Vec<f64>, Vec<f64>) = line
            .coords()
            .map(|c| if swap_in { (c.y, c.x) } else { (c.x, c.y) })
            .unzip();
        transform.transform_coords(&mut xs, &mut ys, &mut [])?;
        Ok(xs
            .into_iter()
            .zip(ys)
            .map(|(a, b)| if swap_out { Coord { x: b, y: a } } else { Coord { x: a, y: b } })
            .collect())
    };

    let exterior = ring(aoi.polygon.exterior())?;
    let interiors = aoi
        .polygon
        .interiors()
        .iter()
        .map(ring)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let projection = if reader.metadata.projection.is_empty() {
        target.to_wkt()?
    } else {
        reader.metadata.projection.clone()
    };
    Ok(NativeAoi {
        polygon: Polygon::new(exterior, interiors),
        projection,
    })
}

fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP { r } else { v }
}

/// Pixel window covering the polygon's envelope, rounded outward and clamped to the raster.
/// `None` when the polygon lies entirely outside.
pub fn pixel_window(
    polygon: &Polygon<f64>,
    geotransform: &GeoTransform,
    size: (usize, usize),
) -> std::result::Result<Option<PixelWindow>, GdalError> {
    let (size_x, size_y) = size;
    let Some(rect) = polygon.bounding_rect() else {
        return Ok(None);
    };
    let inverse = geotransform.invert()?;
    let corners = [
        (rect.min().x, rect.min().y),
        (rect.max().x, rect.min().y),
        (rect.min().x, rect.max().y),
        (rect.max().x, rect.max().y),
    ];
    let (mut col_min, mut col_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut row_min, mut row_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let (col, row) = inverse.apply(x, y);
        col_min = col_min.min(col);
        col_max = col_max.max(col);
        row_min = row_min.min(row);
        row_max = row_max.max(row);
    }
    let col_start = snap(col_min).floor().max(0.0);
    let col_end = snap(col_max).ceil().min(size_x as f64);
    let row_start = snap(row_min).floor().max(0.0);
    let row_end = snap(row_max).ceil().min(size_y as f64);
    if !(col_start < col_end && row_start < row_end) {
        return Ok(None);
    }
    Ok(Some(PixelWindow {
        col_off: col_start as usize,
        row_off: row_start as usize,
        cols: (col_end - col_start) as usize,
        rows: (row_end - row_start) as usize,
    }))
}

/// Geotransform of a sub-window: same pixel size, origin moved to the window corner
pub fn window_geotransform(geotransform: &GeoTransform, window: PixelWindow) -> GeoTransform {
    let (x, y) = geotransform.apply(window.col_off as f64, window.row_off as f64);
    [
        x,
        geotransform[1],
        geotransform[2],
        y,
        geotransform[4],
        geotransform[5],
    ]
}

/// Which pixels of `window` are kept
pub fn pixel_mask(
    polygon: &Polygon<f64>,
    geotransform: &GeoTransform,
    window: PixelWindow,
    all_touched: bool,
) -> Array2<bool> {
    Array2::from_shape_fn((window.rows, window.cols), |(r, c)| {
        let col = (window.col_off + c) as f64;
        let row = (window.row_off + r) as f64;
        let (cx, cy) = geotransform.apply(col + 0.5, row + 0.5);
        if polygon.contains(&Point::new(cx, cy)) {
            return true;
        }
        if !all_touched {
            return false;
        }
        let lo = FOOTPRINT_INSET;
        let hi = 1.0 - FOOTPRINT_INSET;
        let footprint: LineString<f64> = [(lo, lo), (hi, lo), (hi, hi), (lo, hi), (lo, lo)]
            .into_iter()
            .map(|(dc, dr)| {
                let (x, y) = geotransform.apply(col + dc, row + dr);
                Coord { x, y }
            })
            .collect();
        polygon.intersects(&Polygon::new(footprint, Vec::new()))
    })
}

fn clip_typed<T: GdalType + Copy + Default>(
    reader: &GdalRasterReader,
    window: PixelWindow,
    mask: &Array2<bool>,
    output: &Path,
    geotransform: &GeoTransform,
    projection: &str,
) -> std::result::Result<gdal::Dataset, GdalError> {
    let mut data: Array2<T> = reader.read_window(1, window)?;
    Zip::from(&mut data).and(mask).for_each(|value, &keep| {
        if !keep {
            *value = T::default();
        }
    });
    write_single_band(output, &data, geotransform, projection)
}

type MaskKey = (PixelWindow, [u64; 6]);

/// Clip a single opened raster against a polygon already in its projection
pub fn clip_raster(
    reader: &GdalRasterReader,
    aoi: &NativeAoi,
    output: &Path,
    options: &ClipOptions,
) -> Result<gdal::Dataset> {
    let mut masks = HashMap::new();
    clip_with_cache(reader, aoi, output, options, &mut masks)
}

fn clip_with_cache(
    reader: &GdalRasterReader,
    aoi: &NativeAoi,
    output: &Path,
    options: &ClipOptions,
    masks: &mut HashMap<MaskKey, Array2<bool>>,
) -> Result<gdal::Dataset> {
    let meta = &reader.metadata;
    let window = pixel_window(&aoi.polygon, &meta.geotransform, (meta.size_x, meta.size_y))?
        .ok_or_else(|| Error::NoOverlap(format!("{:?}", reader.path)))?;
    let key = (window, meta.geotransform.map(f64::to_bits));
    let mask = masks.entry(key).or_insert_with(|| {
        pixel_mask(&aoi.polygon, &meta.geotransform, window, options.all_touched)
    });
    let out_gt = window_geotransform(&meta.geotransform, window);
    debug!(
        "Clipping {:?}: window {}x{} at ({}, {})",
        reader.path, window.cols, window.rows, window.col_off, window.row_off
    );

    let projection = aoi.projection.as_str();
    let ds = match meta.data_type {
        GdalDataType::UInt8 => clip_typed::<u8>(reader, window, mask, output, &out_gt, projection),
        GdalDataType::UInt16 => clip_typed::<u16>(reader, window, mask, output, &out_gt, projection),
        GdalDataType::Int16 => clip_typed::<i16>(reader, window, mask, output, &out_gt, projection),
        GdalDataType::UInt32 => clip_typed::<u32>(reader, window, mask, output, &out_gt, projection),
        GdalDataType::Int32 => clip_typed::<i32>(reader, window, mask, output, &out_gt, projection),
        GdalDataType::Float32 => clip_typed::<f32>(reader, window, mask, output, &out_gt, projection),
        GdalDataType::Float64 => clip_typed::<f64>(reader, window, mask, output, &out_gt, projection),
        other => Err(GdalError::UnsupportedPixelType(other)),
    }?;
    Ok(ds)
}

/// Clip every discovered band of a product into `product_dir/<BAND>.tif`.
///
/// The first band (in band order) fixes the native projection used for all of them.
pub fn clip(
    bands: &BandPathMap,
    product_dir: &Path,
    aoi: &AreaOfInterest,
    product: &ProductRecord,
    options: &ClipOptions,
) -> Result<BandPathMap> {
    let mut clipped = BandPathMap::new();
    let Some((_, first_path)) = bands.iter().next() else {
        return Ok(clipped);
    };
    std::fs::create_dir_all(product_dir)?;

    let first = GdalRasterReader::open(first_path)?;
    let native = reproject_aoi(aoi, &first, options.fallback_epsg)?;
    drop(first);

    let mut masks: HashMap<MaskKey, Array2<bool>> = HashMap::new();
    for (&band, path) in bands {
        let output = band_output_path(product_dir, band);
        let reader = GdalRasterReader::open(path)?;
        let mut ds = clip_with_cache(&reader, &native, &output, options, &mut masks)?;
        embed_tiff_metadata(&mut ds, product, band)?;
        drop(ds);
        clipped.insert(band, output);
    }
    info!("Clipped {} bands into {:?}", clipped.len(), product_dir);
    Ok(clipped)
}

pub fn band_output_path(dir: &Path, band: Band) -> PathBuf {
    dir.join(format!("{}.tif", band.code()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{product_record, write_raster};
    use geo::polygon;

    const UTM_GT: GeoTransform = [500000.0, 10.0, 0.0, 5000000.0, 0.0, -10.0];

    fn edge_polygon() -> NativeAoi {
        // covers columns 0..5 fully and 2 m of column 5
        NativeAoi {
            polygon: polygon![
                (x: 500000.0, y: 4999950.0),
                (x: 500052.0, y: 4999950.0),
                (x: 500052.0, y: 5000000.0),
                (x: 500000.0, y: 5000000.0),
                (x: 500000.0, y: 4999950.0),
            ],
            projection: String::new(),
        }
    }

    fn clip_edge(all_touched: bool) -> Array2<u16> {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.tif");
        write_raster(&src, &Array2::<u16>::from_elem((10, 10), 7), &UTM_GT, 32631);
        let reader = GdalRasterReader::open(&src).unwrap();
        let out = dir.path().join("out.tif");
        let options = ClipOptions {
            all_touched,
            ..Default::default()
        };
        drop(clip_raster(&reader, &edge_polygon(), &out, &options).unwrap());
        GdalRasterReader::open(&out).unwrap().read_band(1).unwrap()
    }

    #[test]
    fn all_touched_keeps_partially_covered_edge_pixel() {
        let data = clip_edge(true);
        assert_eq!(data.dim(), (5, 6));
        assert_eq!(data[[0, 4]], 7);
        assert_eq!(data[[0, 5]], 7);
        assert_eq!(data[[4, 5]], 7);
    }

    #[test]
    fn centre_rule_drops_partially_covered_edge_pixel() {
        let data = clip_edge(false);
        assert_eq!(data.dim(), (5, 6));
        assert_eq!(data[[0, 4]], 7);
        assert_eq!(data[[0, 5]], 0);
    }

    #[test]
    fn window_is_clamped_and_origin_shifted() {
        let poly = polygon![
            (x: 499900.0, y: 4999975.0),
            (x: 500025.0, y: 4999975.0),
            (x: 500025.0, y: 5000100.0),
            (x: 499900.0, y: 4999975.0),
        ];
        let window = pixel_window(&poly, &UTM_GT, (10, 10)).unwrap().unwrap();
        assert_eq!(
            window,
            PixelWindow { col_off: 0, row_off: 0, cols: 3, rows: 3 }
        );
        let shifted = window_geotransform(&UTM_GT, PixelWindow { col_off: 2, row_off: 3, cols: 1, rows: 1 });
        assert_eq!(shifted[0], 500020.0);
        assert_eq!(shifted[3], 4999970.0);
    }

    #[test]
    fn disjoint_polygon_is_no_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.tif");
        write_raster(&src, &Array2::<u8>::from_elem((4, 4), 1), &UTM_GT, 32631);
        let reader = GdalRasterReader::open(&src).unwrap();
        let far = NativeAoi {
            polygon: polygon![
                (x: 600000.0, y: 4000000.0),
                (x: 600100.0, y: 4000000.0),
                (x: 600100.0, y: 4000100.0),
                (x: 600000.0, y: 4000000.0),
            ],
            projection: String::new(),
        };
        let err = clip_raster(&reader, &far, &dir.path().join("o.tif"), &ClipOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NoOverlap(_)));
    }

    #[test]
    fn product_clip_reprojects_geographic_aoi() {
        let dir = tempfile::tempdir().unwrap();
        let gt: GeoTransform = [5.0, 0.01, 0.0, 46.0, 0.0, -0.01];
        let b02 = dir.path().join("T_B02.tif");
        let b11 = dir.path().join("T_B11.tif");
        write_raster(&b02, &Array2::<u16>::from_elem((100, 100), 900), &gt, 4326);
        write_raster(&b11, &Array2::<f32>::from_elem((100, 100), 0.5), &gt, 4326);
        let mut bands = BandPathMap::new();
        bands.insert(Band::B02, b02);
        bands.insert(Band::B11, b11);

        let aoi = AreaOfInterest {
            polygon: polygon![
                (x: 5.2, y: 45.5),
                (x: 5.3, y: 45.5),
                (x: 5.3, y: 45.6),
                (x: 5.2, y: 45.6),
                (x: 5.2, y: 45.5),
            ],
            epsg: 4326,
        };
        let out_dir = dir.path().join("P");
        let product = product_record("P", "2015-07-04T10:30:26Z");
        let clipped = clip(&bands, &out_dir, &aoi, &product, &ClipOptions::default()).unwrap();

        assert_eq!(clipped[&Band::B02], out_dir.join("B02.tif"));
        let reader = GdalRasterReader::open(out_dir.join("B11.tif")).unwrap();
        assert_eq!(reader.metadata.data_type, GdalDataType::Float32);
        let (rows, cols) = reader.shape();
        assert!((10..=11).contains(&rows) && (10..=11).contains(&cols), "{rows}x{cols}");
        assert!((reader.metadata.geotransform[0] - 5.2).abs() < 0.011);
        assert_eq!(reader.metadata.metadata.get("BAND").map(String::as_str), Some("B11"));
    }

    #[test]
    fn lon_lat_aoi_lands_on_utm_tile() {
        let dir = tempfile::tempdir().unwrap();
        // 2 km x 2 km tile in UTM zone 31N
        let gt: GeoTransform = [600000.0, 10.0, 0.0, 5050000.0, 0.0, -10.0];
        let b04 = dir.path().join("T31_B04.tif");
        write_raster(&b04, &Array2::<u16>::from_elem((200, 200), 1200), &gt, 32631);
        let mut bands = BandPathMap::new();
        bands.insert(Band::B04, b04);

        // corners of E 600500..601000, N 5049000..5049500
        let aoi = AreaOfInterest {
            polygon: polygon![
                (x: 4.288364, y: 45.587277),
                (x: 4.294773, y: 45.587205),
                (x: 4.294876, y: 45.591704),
                (x: 4.288467, y: 45.591776),
                (x: 4.288364, y: 45.587277),
            ],
            epsg: 4326,
        };
        let native = reproject_aoi(&aoi, &GdalRasterReader::open(&bands[&Band::B04]).unwrap(), 32631).unwrap();
        let rect = native.polygon.bounding_rect().unwrap();
        assert!((rect.min().x - 600500.0).abs() < 1.0, "{:?}", rect);
        assert!((rect.max().y - 5049500.0).abs() < 1.0, "{:?}", rect);

        let out_dir = dir.path().join("P");
        let product = product_record("P", "2016-06-10T10:40:22Z");
        let clipped = clip(&bands, &out_dir, &aoi, &product, &ClipOptions::default());
        assert!(!matches!(clipped, Err(Error::NoOverlap(_))));
        let clipped = clipped.unwrap();

        let reader = GdalRasterReader::open(&clipped[&Band::B04]).unwrap();
        let out_gt = reader.metadata.geotransform;
        assert!((out_gt[0] - 600500.0).abs() <= 10.0, "{:?}", out_gt);
        assert!((out_gt[3] - 5049500.0).abs() <= 10.0, "{:?}", out_gt);
        assert_eq!(out_gt[1], 10.0);
        let (rows, cols) = reader.shape();
        assert!((50..=52).contains(&rows) && (50..=52).contains(&cols), "{rows}x{cols}");
        let data: Array2<u16> = reader.read_band(1).unwrap();
        assert_eq!(data[[rows / 2, cols / 2]], 1200);
    }
}
