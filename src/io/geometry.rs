//! Area-of-interest loading: reads a GeoJSON boundary file, forces it to EPSG:4326,
//! explodes multi-part geometries, and keeps the first polygon by feature order.
use std::path::Path;

use geo::{Geometry, LineString, Polygon};
use geojson::GeoJson;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::AreaOfInterest;

/// Reference system every boundary file is coerced to
pub const AOI_EPSG: u32 = 4326;

/// Load the area of interest from a GeoJSON file
pub fn load(path: &Path) -> Result<AreaOfInterest> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::GeometrySource(format!("cannot read boundary file {:?}: {}", path, e))
    })?;
    let aoi = parse(&text).map_err(|e| match e {
        Error::GeometrySource(msg) => Error::GeometrySource(format!("{:?}: {}", path, msg)),
        other => other,
    })?;
    info!(
        "Loaded area of interest from {:?} ({} exterior vertices)",
        path,
        aoi.polygon.exterior().0.len()
    );
    Ok(aoi)
}

/// Parse GeoJSON text into the area of interest
pub fn parse(text: &str) -> Result<AreaOfInterest> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Error::GeometrySource(e.to_string()))?;

    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().filter_map(|f| f.geometry).collect(),
        GeoJson::Feature(f) => f.geometry.into_iter().collect(),
        GeoJson::Geometry(g) => vec![g],
    };
    if geometries.is_empty() {
        return Err(Error::GeometrySource("boundary file contains no features".into()));
    }

    // parts are grouped by feature; the first part of the first feature is authoritative
    let mut total_parts = 0usize;
    let mut first: Option<Polygon<f64>> = None;
    for geometry in geometries {
        let geometry = Geometry::<f64>::try_from(geometry)
            .map_err(|e| Error::GeometrySource(e.to_string()))?;
        let parts = explode(geometry);
        total_parts += parts.len();
        if first.is_none() {
            first = parts.into_iter().next();
        }
    }
    let polygon = first.ok_or_else(|| {
        Error::GeometrySource("boundary file contains no polygon".into())
    })?;
    if total_parts > 1 {
        warn!(
            "Boundary has {} polygon parts; using the first one only",
            total_parts
        );
    }
    Ok(AreaOfInterest {
        polygon,
        epsg: AOI_EPSG,
    })
}

/// Split a geometry into its single-part polygons, preserving order
fn explode(geometry: Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0,
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.0.into_iter().flat_map(explode).collect(),
        _ => Vec::new(),
    }
}

fn write_ring(out: &mut String, ring: &LineString<f64>) {
    out.push('(');
    for (i, c) in ring.coords().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{} {}", c.x, c.y));
    }
    out.push(')');
}

/// WKT form of the area of interest, as embedded in the catalog's spatial predicate
pub fn to_search_string(aoi: &AreaOfInterest) -> String {
    let mut out = String::from("POLYGON (");
    write_ring(&mut out, aoi.polygon.exterior());
    for interior in aoi.polygon.interiors() {
        out.push_str(", ");
        write_ring(&mut out, interior);
    }
    out.push(')');
    out
}
