//! Catalog search against the OData product index.
//!
//! A search is one filter query followed by every continuation page the server
//! announces through `@odata.nextLink`. Each page request is retried before the
//! whole search is abandoned; a failed search never returns a partial result.
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::io::geometry::to_search_string;
use crate::io::http::Transport;
use crate::types::{ProductRecord, SearchCriteria};

const NEXT_LINK: &str = "@odata.nextLink";

/// Retry policy for individual page requests
#[derive(Debug, Clone, Copy)]
pub struct PageRetry {
    /// Extra attempts after the first failure
    pub retries: u32,
    pub delay: Duration,
}

impl Default for PageRetry {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// One decoded page of search results
#[derive(Debug)]
pub struct CatalogPage {
    pub records: Vec<ProductRecord>,
    /// Continuation link; `None` means this was the last page
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ODataContentDate {
    #[serde(rename = "Start")]
    start: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ODataProduct {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Footprint", default)]
    footprint: Option<String>,
    #[serde(rename = "ContentDate")]
    content_date: ODataContentDate,
    #[serde(rename = "Online", default)]
    online: Option<bool>,
    #[serde(rename = "ContentLength", default)]
    content_length: Option<u64>,
}

impl From<ODataProduct> for ProductRecord {
    fn from(p: ODataProduct) -> Self {
        ProductRecord {
            id: p.id,
            name: p.name,
            footprint: p.footprint.map(|f| strip_geography_prefix(&f)),
            acquisition_timestamp: p.content_date.start,
            online: p.online,
            content_length: p.content_length,
        }
    }
}

/// `geography'SRID=4326;POLYGON ((...))'` → `POLYGON ((...))`
fn strip_geography_prefix(footprint: &str) -> String {
    let s = footprint.trim();
    let s = s.strip_prefix("geography'").unwrap_or(s);
    let s = s.strip_suffix('\'').unwrap_or(s);
    match s.split_once(';') {
        Some((srid, wkt)) if srid.starts_with("SRID=") => wkt.to_string(),
        _ => s.to_string(),
    }
}

/// OData filter expression for one year of acquisitions.
/// The end bound is December 1, not December 31.
pub fn build_filter(criteria: &SearchCriteria) -> String {
    format!(
        "OData.CSC.Intersects(area=geography'SRID=4326;{wkt}') \
         and Collection/Name eq '{sensor}' \
         and ContentDate/Start ge {year}-01-01T00:00:00.000Z \
         and ContentDate/Start lt {year}-12-01T00:00:00.000Z \
         and Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' \
         and att/OData.CSC.DoubleAttribute/Value lt {cloud})",
        wkt = to_search_string(&criteria.geometry),
        sensor = criteria.sensor,
        year = criteria.year,
        cloud = criteria.cloud_cover_ceiling,
    )
}

/// Decode one page; a body without a `value` array is a parse failure, not an empty page
pub fn parse_page(body: Value) -> std::result::Result<CatalogPage, String> {
    let Value::Object(mut obj) = body else {
        return Err("response is not a JSON object".into());
    };
    let next = match obj.remove(NEXT_LINK) {
        Some(Value::String(link)) if !link.is_empty() => Some(link),
        Some(Value::Null) | None => None,
        Some(Value::String(_)) => None,
        Some(other) => return Err(format!("unexpected {} value: {}", NEXT_LINK, other)),
    };
    let values = match obj.remove("value") {
        Some(v @ Value::Array(_)) => v,
        Some(_) => return Err("`value` is not an array".into()),
        None => return Err("response has no `value` array".into()),
    };
    let products: Vec<ODataProduct> =
        serde_json::from_value(values).map_err(|e| format!("bad product record: {}", e))?;
    Ok(CatalogPage {
        records: products.into_iter().map(ProductRecord::from).collect(),
        next,
    })
}

/// Paginated client for the product catalog
pub struct CatalogClient<'a, T: Transport> {
    transport: &'a T,
    base_url: String,
    page_size: Option<u32>,
    retry: PageRetry,
}

impl<'a, T: Transport> CatalogClient<'a, T> {
    pub fn new(transport: &'a T, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            page_size: None,
            retry: PageRetry::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_retry(mut self, retry: PageRetry) -> Self {
        self.retry = retry;
        self
    }

    /// URL of the first page
    pub fn search_url(&self, criteria: &SearchCriteria) -> Result<String> {
        let filter = build_filter(criteria);
        let mut params: Vec<(&str, String)> = vec![("$filter", filter)];
        if let Some(top) = self.page_size {
            params.push(("$top", top.to_string()));
        }
        let url = Url::parse_with_params(&self.base_url, &params).map_err(|e| {
            Error::Configuration(format!("invalid catalog url {}: {}", self.base_url, e))
        })?;
        Ok(url.to_string())
    }

    /// Run the query and accumulate every page, in page order
    pub fn search(&self, criteria: &SearchCriteria) -> Result<Vec<ProductRecord>> {
        let mut url = self.search_url(criteria)?;
        let mut records = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = self.fetch_page(&url)?;
            pages += 1;
            debug!("Catalog page {} returned {} records", pages, page.records.len());
            records.extend(page.records);
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }
        info!(
            "Catalog search for {} returned {} products over {} pages",
            criteria.year,
            records.len(),
            pages
        );
        Ok(records)
    }

    fn fetch_page(&self, url: &str) -> Result<CatalogPage> {
        let attempts = self.retry.retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let outcome = self
                .transport
                .get_json(url)
                .map_err(|e| e.to_string())
                .and_then(parse_page);
            match outcome {
                Ok(page) => return Ok(page),
                Err(e) => {
                    last_error = e;
                    if attempt < attempts {
                        warn!(
                            "Catalog page attempt {} of {} failed: {}; retrying",
                            attempt, attempts, last_error
                        );
                        if !self.retry.delay.is_zero() {
                            thread::sleep(self.retry.delay);
                        }
                    }
                }
            }
        }
        Err(Error::CatalogFetch(format!(
            "page {} failed after {} attempts: {}",
            url, attempts, last_error
        )))
    }
}
