//! Per-candidate fetch, extract, and clip state machine, and the per-year /
//! per-run orchestration around it.
//!
//! A candidate moves through
//! `Pending → Downloading → Downloaded → Extracting → Extracted → BandsDiscovered → Clipped → Done`,
//! or straight to `Skipped` when its output directory already exists. Failures
//! in download, extraction, or raster processing only end the current candidate;
//! authentication and filesystem failures end the run.
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::cache::{CacheManager, report_step};
use crate::core::params::PipelineParams;
use crate::core::processing::align::align_product;
use crate::core::processing::clip::{ClipOptions, clip};
use crate::core::selection::select;
use crate::error::{Error, Result};
use crate::io::archive::{discover_bands, extract_archive};
use crate::io::auth::{TokenManager, read_credentials};
use crate::io::catalog::{CatalogClient, PageRetry};
use crate::io::download::download_product;
use crate::io::http::Transport;
use crate::io::writers::metadata::write_product_sidecar;
use crate::types::{AreaOfInterest, ProductRecord, SearchCriteria};

/// Where a candidate is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CandidateState {
    Pending,
    Downloading,
    Downloaded,
    Extracting,
    Extracted,
    BandsDiscovered,
    Clipped,
    Done,
    Skipped,
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Final result for one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Done { output: PathBuf, bands: usize },
    Skipped { output: PathBuf },
    Failed { stage: CandidateState, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub id: String,
    pub name: String,
    pub outcome: CandidateOutcome,
}

/// Summary of one year's search and materialization
#[derive(Debug, Clone, Default, Serialize)]
pub struct YearReport {
    pub year: i32,
    pub found: usize,
    pub selected: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub candidates: Vec<CandidateReport>,
    /// Set when the catalog search for this year failed
    pub search_error: Option<String>,
}

impl YearReport {
    fn record(&mut self, product: &ProductRecord, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::Done { .. } => self.processed += 1,
            CandidateOutcome::Skipped { .. } => self.skipped += 1,
            CandidateOutcome::Failed { .. } => self.failed += 1,
        }
        self.candidates.push(CandidateReport {
            id: product.id.clone(),
            name: product.name.clone(),
            outcome,
        });
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub years: Vec<YearReport>,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.years.iter().map(|y| y.processed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.years.iter().map(|y| y.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.years.iter().map(|y| y.failed).sum()
    }
}

/// `<output>/clipped/<year>/<name>`
pub fn clipped_dir(output: &Path, year: i32, name: &str) -> PathBuf {
    output.join("clipped").join(year.to_string()).join(name)
}

/// `<output>/aligned/<year>/<name>`
pub fn aligned_dir(output: &Path, year: i32, name: &str) -> PathBuf {
    output.join("aligned").join(year.to_string()).join(name)
}

fn transition(product: &ProductRecord, state: &mut CandidateState, next: CandidateState) {
    debug!("{}: {} -> {}", product.name, state, next);
    *state = next;
}

/// Drives search, selection, and materialization for a whole run
pub struct Pipeline<'a, T: Transport> {
    transport: &'a T,
    params: &'a PipelineParams,
    aoi: &'a AreaOfInterest,
    tokens: Option<TokenManager<'a, T>>,
    cache: CacheManager,
}

impl<'a, T: Transport> Pipeline<'a, T> {
    /// Credentials are only read when the run will download
    pub fn new(transport: &'a T, params: &'a PipelineParams, aoi: &'a AreaOfInterest) -> Result<Self> {
        params.validate()?;
        let tokens = if params.dry_run {
            None
        } else {
            let credentials = read_credentials(&params.credentials)?;
            Some(TokenManager::new(
                transport,
                params.endpoints.token_url.clone(),
                params.endpoints.client_id.clone(),
                credentials,
            ))
        };
        Ok(Self {
            transport,
            params,
            aoi,
            tokens,
            cache: CacheManager::new(params.cache_dir.clone()),
        })
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Search the catalog for one year
    pub fn search(&self, year: i32) -> Result<Vec<ProductRecord>> {
        let criteria = SearchCriteria::new(
            year,
            self.params.cloud_cover,
            self.params.sensor.clone(),
            self.aoi.clone(),
        )?;
        CatalogClient::new(self.transport, self.params.endpoints.catalog_url.clone())
            .with_page_size(self.params.page_size)
            .with_retry(PageRetry {
                retries: self.params.page_retries,
                delay: self.params.retry_delay(),
            })
            .search(&criteria)
    }

    /// Run every configured year; the cache is reset first and purged at the end
    pub fn run(&self) -> Result<RunReport> {
        if !self.params.dry_run {
            self.cache.reset()?;
        }
        let mut report = RunReport::default();
        for &year in &self.params.years {
            report.years.push(self.run_year(year)?);
        }
        if !self.params.dry_run && !self.params.keep_cache {
            let result = self.cache.purge();
            report_step(&format!("purge cache {:?}", self.cache.root()), &result);
            result?;
        }
        Ok(report)
    }

    /// Search, select, and materialize one year.
    /// A failed search is recorded in the report and does not stop other years.
    pub fn run_year(&self, year: i32) -> Result<YearReport> {
        let mut report = YearReport {
            year,
            ..Default::default()
        };
        let records = match self.search(year) {
            Ok(records) => records,
            Err(Error::CatalogFetch(reason)) => {
                error!("✗ catalog search for {}: {}", year, reason);
                report.search_error = Some(reason);
                return Ok(report);
            }
            Err(e) => return Err(e),
        };
        info!("✓ catalog search for {}: {} products", year, records.len());
        report.found = records.len();

        let selected = select(records, self.params.candidate_limit()?);
        report.selected = selected.len();
        for product in &selected {
            info!(
                "Selected {} acquired {}",
                product.name, product.acquisition_timestamp
            );
        }
        if self.params.dry_run {
            info!("Dry run: {} candidates for {} not materialized", selected.len(), year);
            return Ok(report);
        }

        self.cache.prepare_year(year)?;
        for product in &selected {
            let outcome = self.process_candidate(year, product)?;
            report.record(product, outcome);
            if self.params.purge_each_candidate {
                self.cache.regenerate_year(year)?;
            }
        }
        info!(
            "Year {}: {} processed, {} skipped, {} failed",
            year, report.processed, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Materialize one candidate. Candidate-scoped failures become
    /// `CandidateOutcome::Failed`; everything else is returned as an error.
    pub fn process_candidate(&self, year: i32, product: &ProductRecord) -> Result<CandidateOutcome> {
        let output = clipped_dir(&self.params.output_dir, year, &product.name);
        if output.exists() {
            debug!("{}: {} -> {}", product.name, CandidateState::Pending, CandidateState::Skipped);
            info!("Skipping {}: output {:?} already exists", product.name, output);
            return Ok(CandidateOutcome::Skipped { output });
        }

        let mut state = CandidateState::Pending;
        match self.materialize(year, product, &output, &mut state) {
            Ok(outcome) => {
                info!("✓ install {}", product.name);
                Ok(outcome)
            }
            Err(e) if e.is_candidate_scoped() => {
                error!("✗ {} failed while {}: {}", product.name, state, e);
                self.discard_partial_output(year, product, &output);
                Ok(CandidateOutcome::Failed {
                    stage: state,
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                self.discard_partial_output(year, product, &output);
                Err(e)
            }
        }
    }

    fn materialize(
        &self,
        year: i32,
        product: &ProductRecord,
        output: &Path,
        state: &mut CandidateState,
    ) -> Result<CandidateOutcome> {
        let tokens = self.tokens.as_ref().ok_or_else(|| {
            Error::Configuration("downloads are disabled in a dry run".into())
        })?;
        // tokens expire silently, so each download gets a fresh one
        let token = tokens.acquire();
        report_step("fetch access token", &token);
        let token = token?;

        let year_dir = self.cache.year_dir(year);
        std::fs::create_dir_all(&year_dir)?;

        transition(product, state, CandidateState::Downloading);
        let archive = download_product(
            self.transport,
            &self.params.endpoints.download_url,
            product,
            &token,
            &year_dir,
        )?;
        transition(product, state, CandidateState::Downloaded);

        transition(product, state, CandidateState::Extracting);
        let extracted = extract_archive(&archive, &year_dir.join(&product.name))?;
        transition(product, state, CandidateState::Extracted);

        let bands = discover_bands(&extracted)?;
        if bands.is_empty() {
            return Err(Error::Extraction(format!(
                "no band images found in {}",
                product.name
            )));
        }
        transition(product, state, CandidateState::BandsDiscovered);

        let options = ClipOptions {
            all_touched: true,
            fallback_epsg: self.params.fallback_epsg,
        };
        let clipped = clip(&bands, output, self.aoi, product, &options)?;
        write_product_sidecar(output, product, &clipped)?;
        transition(product, state, CandidateState::Clipped);

        if self.params.align {
            let dir = aligned_dir(&self.params.output_dir, year, &product.name);
            align_product(&clipped, self.params.reference_band, &dir, product)?;
        }

        transition(product, state, CandidateState::Done);
        Ok(CandidateOutcome::Done {
            output: output.to_path_buf(),
            bands: clipped.len(),
        })
    }

    fn discard_partial_output(&self, year: i32, product: &ProductRecord, output: &Path) {
        for dir in [output.to_path_buf(), aligned_dir(&self.params.output_dir, year, &product.name)] {
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    warn!("Could not remove partial output {:?}: {}", dir, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeTransport, product_json, product_record, test_aoi, write_raster, zip_bytes};
    use crate::types::Band;
    use gdal::GeoTransform;
    use ndarray::Array2;
    use serde_json::json;

    struct Fixture {
        dir: tempfile::TempDir,
        params: PipelineParams,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let credentials = dir.path().join("credentials.txt");
        std::fs::write(&credentials, "me@example.org\nhunter2\n").unwrap();
        let params = PipelineParams {
            years: vec![2015],
            max_candidates: Some(1),
            credentials,
            output_dir: dir.path().join("output"),
            cache_dir: dir.path().join("cache"),
            retry_delay_ms: 0,
            page_retries: 0,
            endpoints: crate::core::params::Endpoints {
                catalog_url: "https://catalog.test/Products".into(),
                token_url: "https://id.test/token".into(),
                download_url: "https://dl.test/Products".into(),
                client_id: "cdse-public".into(),
            },
            ..Default::default()
        };
        Fixture { dir, params }
    }

    /// Zipped SAFE product with GeoTIFF content under band image names
    fn synthetic_archive(scratch: &Path) -> Vec<u8> {
        let gt: GeoTransform = [5.0, 0.01, 0.0, 46.0, 0.0, -0.01];
        let mut entries = Vec::new();
        for band in ["B02", "B04"] {
            let tif = scratch.join(format!("{band}.tif"));
            write_raster(&tif, &Array2::<u16>::from_elem((100, 100), 1200), &gt, 4326);
            entries.push((
                format!("S2A_TEST.SAFE/GRANULE/L1C_T31TGL/IMG_DATA/T31TGL_20150704T103026_{band}.jp2"),
                std::fs::read(&tif).unwrap(),
            ));
        }
        let refs: Vec<(&str, Vec<u8>)> = entries.iter().map(|(n, b)| (n.as_str(), b.clone())).collect();
        zip_bytes(&refs)
    }

    #[test]
    fn existing_output_is_skipped_without_network() {
        let fx = fixture();
        let aoi = test_aoi();
        let transport = FakeTransport::default();
        let pipeline = Pipeline::new(&transport, &fx.params, &aoi).unwrap();
        let product = product_record("S2A_DONE", "2015-05-01T10:00:00Z");
        let output = clipped_dir(&fx.params.output_dir, 2015, &product.name);
        std::fs::create_dir_all(&output).unwrap();

        let outcome = pipeline.process_candidate(2015, &product).unwrap();
        assert_eq!(outcome, CandidateOutcome::Skipped { output });
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn end_to_end_single_candidate() {
        let fx = fixture();
        let aoi = test_aoi();
        let transport = FakeTransport::default();
        transport.push_json(json!({ "value": [
            { "Id": "uuid-1", "Name": "S2A_TEST", "ContentDate": { "Start": "2015-07-04T10:30:26Z" } }
        ]}));
        transport.push_token(json!({ "access_token": "tok" }));
        transport.push_archive(synthetic_archive(fx.dir.path()));

        let pipeline = Pipeline::new(&transport, &fx.params, &aoi).unwrap();
        let report = pipeline.run().unwrap();

        assert_eq!(report.years.len(), 1);
        let year = &report.years[0];
        assert_eq!((year.found, year.selected, year.processed, year.failed), (1, 1, 1, 0));
        assert_eq!(transport.download_urls(), vec!["https://dl.test/Products(uuid-1)/$value".to_string()]);

        let out = fx.params.output_dir.join("clipped/2015/S2A_TEST");
        assert!(out.join("B02.tif").is_file());
        assert!(out.join("B04.tif").is_file());
        assert!(out.join("product.json").is_file());
        assert!(!fx.params.cache_dir.exists());
    }

    #[test]
    fn broken_archive_fails_only_that_candidate() {
        let mut fx = fixture();
        fx.params.max_candidates = Some(2);
        fx.params.keep_cache = true;
        let aoi = test_aoi();
        let transport = FakeTransport::default();
        transport.push_json(json!({ "value": [
            product_json("bad", "2015-03-01T00:00:00Z"),
            product_json("good", "2015-04-01T00:00:00Z")
        ]}));
        transport.push_token(json!({ "access_token": "t1" }));
        transport.push_archive(b"garbage".to_vec());
        transport.push_token(json!({ "access_token": "t2" }));
        transport.push_archive(synthetic_archive(fx.dir.path()));

        let pipeline = Pipeline::new(&transport, &fx.params, &aoi).unwrap();
        let report = pipeline.run().unwrap();
        let year = &report.years[0];
        assert_eq!((year.processed, year.failed), (1, 1));
        assert!(matches!(
            year.candidates[0].outcome,
            CandidateOutcome::Failed { stage: CandidateState::Extracting, .. }
        ));
        assert!(!clipped_dir(&fx.params.output_dir, 2015, "bad").exists());
        assert!(clipped_dir(&fx.params.output_dir, 2015, "good").join("B04.tif").is_file());
        // one fresh token per download
        assert_eq!(transport.bearers(), vec!["t1".to_string(), "t2".to_string()]);
        // purged after every candidate, kept at the end
        assert_eq!(std::fs::read_dir(fx.params.cache_dir.join("2015")).unwrap().count(), 0);
    }

    #[test]
    fn authentication_failure_is_fatal() {
        let fx = fixture();
        let aoi = test_aoi();
        let transport = FakeTransport::default();
        transport.push_json(json!({ "value": [product_json("p", "2015-03-01T00:00:00Z")] }));
        transport.push_token(json!({ "error": "invalid_grant" }));

        let pipeline = Pipeline::new(&transport, &fx.params, &aoi).unwrap();
        assert!(matches!(pipeline.run(), Err(Error::Authentication(_))));
        assert!(transport.download_urls().is_empty());
    }

    #[test]
    fn failed_search_does_not_stop_later_years() {
        let mut fx = fixture();
        fx.params.years = vec![2015, 2016];
        fx.params.dry_run = true;
        let aoi = test_aoi();
        let transport = FakeTransport::default();
        transport.push_failure(500);
        transport.push_json(json!({ "value": [
            product_json("b", "2016-06-01T00:00:00Z"),
            product_json("a", "2016-02-01T00:00:00Z")
        ]}));

        let pipeline = Pipeline::new(&transport, &fx.params, &aoi).unwrap();
        let report = pipeline.run().unwrap();
        assert!(report.years[0].search_error.is_some());
        assert_eq!(report.years[1].found, 2);
        assert_eq!(report.years[1].selected, 1);
        assert!(transport.posted_forms().is_empty());
        assert!(!fx.params.cache_dir.exists());
    }

    #[test]
    fn missing_parameters_fail_before_any_request() {
        let mut fx = fixture();
        fx.params.max_candidates = None;
        let aoi = test_aoi();
        let transport = FakeTransport::default();
        assert!(matches!(
            Pipeline::new(&transport, &fx.params, &aoi),
            Err(Error::MissingArgument { .. })
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn align_writes_reference_grid_outputs() {
        let mut fx = fixture();
        fx.params.align = true;
        fx.params.reference_band = Band::B02;
        let aoi = test_aoi();
        let transport = FakeTransport::default();
        transport.push_json(json!({ "value": [product_json("S2A_ALIGN", "2015-07-04T10:30:26Z")] }));
        transport.push_token(json!({ "access_token": "tok" }));
        transport.push_archive(synthetic_archive(fx.dir.path()));

        let pipeline = Pipeline::new(&transport, &fx.params, &aoi).unwrap();
        pipeline.run().unwrap();
        let aligned = aligned_dir(&fx.params.output_dir, 2015, "S2A_ALIGN");
        assert!(aligned.join("B02.tif").is_file());
        assert!(aligned.join("B04.tif").is_file());
    }
}
