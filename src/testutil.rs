//! Test doubles and fixtures shared by unit tests.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use gdal::GeoTransform;
use gdal::raster::GdalType;
use gdal::spatial_ref::SpatialRef;
use geo::polygon;
use ndarray::Array2;
use serde_json::{Value, json};

use crate::io::http::{Transport, TransportError};
use crate::io::writers::tiff::write_single_band;
use crate::types::{AreaOfInterest, ProductRecord};

/// Scripted transport: replays queued responses and records every request
#[derive(Default)]
pub struct FakeTransport {
    pages: RefCell<VecDeque<Result<Value, u16>>>,
    tokens: RefCell<VecDeque<Value>>,
    archives: RefCell<VecDeque<Vec<u8>>>,
    get_urls: RefCell<Vec<String>>,
    download_urls: RefCell<Vec<String>>,
    forms: RefCell<Vec<Vec<(String, String)>>>,
    bearers: RefCell<Vec<String>>,
}

impl FakeTransport {
    pub fn push_json(&self, page: Value) {
        self.pages.borrow_mut().push_back(Ok(page));
    }

    pub fn push_failure(&self, status: u16) {
        self.pages.borrow_mut().push_back(Err(status));
    }

    pub fn push_token(&self, body: Value) {
        self.tokens.borrow_mut().push_back(body);
    }

    pub fn push_archive(&self, bytes: Vec<u8>) {
        self.archives.borrow_mut().push_back(bytes);
    }

    /// URLs of JSON GET requests, in order
    pub fn requested_urls(&self) -> Vec<String> {
        self.get_urls.borrow().clone()
    }

    pub fn download_urls(&self) -> Vec<String> {
        self.download_urls.borrow().clone()
    }

    pub fn posted_forms(&self) -> Vec<Vec<(String, String)>> {
        self.forms.borrow().clone()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.borrow().clone()
    }

    /// Total number of requests of any kind
    pub fn request_count(&self) -> usize {
        self.get_urls.borrow().len() + self.download_urls.borrow().len() + self.forms.borrow().len()
    }
}

impl Transport for FakeTransport {
    fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        self.get_urls.borrow_mut().push(url.to_string());
        match self.pages.borrow_mut().pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(status)) => Err(TransportError::Status {
                status,
                url: url.to_string(),
            }),
            None => Err(TransportError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, TransportError> {
        self.forms.borrow_mut().push(
            form.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self.tokens
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TransportError::Status {
                status: 401,
                url: url.to_string(),
            })
    }

    fn download(
        &self,
        url: &str,
        bearer: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        self.download_urls.borrow_mut().push(url.to_string());
        self.bearers.borrow_mut().push(bearer.to_string());
        let bytes = self
            .archives
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| TransportError::Status {
                status: 404,
                url: url.to_string(),
            })?;
        sink.write_all(&bytes)?;
        sink.flush()?;
        Ok(bytes.len() as u64)
    }
}

fn timestamp(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
}

/// A catalog record as the OData service returns it
pub fn product_json(id: &str, start: &str) -> Value {
    json!({
        "Id": id,
        "Name": id,
        "Footprint": "geography'SRID=4326;POLYGON ((5 45, 6 45, 6 46, 5 46, 5 45))'",
        "ContentDate": { "Start": start, "End": start },
        "Online": true,
        "ContentLength": 1024
    })
}

pub fn product_record(id: &str, start: &str) -> ProductRecord {
    ProductRecord {
        id: id.to_string(),
        name: id.to_string(),
        footprint: None,
        acquisition_timestamp: timestamp(start),
        online: Some(true),
        content_length: None,
    }
}

/// Square of 0.1 degree inside the synthetic tile used by raster tests
pub fn test_aoi() -> AreaOfInterest {
    AreaOfInterest {
        polygon: polygon![
            (x: 5.2, y: 45.5),
            (x: 5.3, y: 45.5),
            (x: 5.3, y: 45.6),
            (x: 5.2, y: 45.6),
            (x: 5.2, y: 45.5),
        ],
        epsg: 4326,
    }
}

/// Write a georeferenced single-band GeoTIFF
pub fn write_raster<T: GdalType + Copy>(
    path: &Path,
    data: &Array2<T>,
    geotransform: &GeoTransform,
    epsg: u32,
) {
    let wkt = SpatialRef::from_epsg(epsg).unwrap().to_wkt().unwrap();
    drop(write_single_band(path, data, geotransform, &wkt).unwrap());
}

/// In-memory zip archive holding the given entries
pub fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
