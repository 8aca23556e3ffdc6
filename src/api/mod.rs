//! High-level, ergonomic library API: run the whole acquisition pipeline, search a
//! single year, or materialize a single product. Prefer these entrypoints over the
//! low-level `core` and `io` modules when integrating s2harvest.
use tracing::info;

use crate::core::params::PipelineParams;
use crate::core::pipeline::{CandidateOutcome, Pipeline, RunReport};
use crate::core::selection::select;
use crate::error::Result;
use crate::io::geometry;
use crate::io::http::{HttpTransport, Transport};
use crate::types::{AreaOfInterest, ProductRecord};

/// Validate `params`, load the area of interest, and run every configured year
/// against the live services.
pub fn run_pipeline(params: &PipelineParams) -> Result<RunReport> {
    params.validate()?;
    let aoi = geometry::load(&params.mask)?;
    let transport = HttpTransport::new()?;
    run_with_transport(&transport, params, &aoi)
}

/// Run the pipeline over any `Transport`
pub fn run_with_transport<T: Transport>(
    transport: &T,
    params: &PipelineParams,
    aoi: &AreaOfInterest,
) -> Result<RunReport> {
    let pipeline = Pipeline::new(transport, params, aoi)?;
    let report = pipeline.run()?;
    info!(
        "Run complete: {} processed, {} skipped, {} failed",
        report.processed(),
        report.skipped(),
        report.failed()
    );
    Ok(report)
}

/// Catalog search and candidate selection for one year, without downloading
pub fn search_year(params: &PipelineParams, year: i32) -> Result<Vec<ProductRecord>> {
    params.validate()?;
    let aoi = geometry::load(&params.mask)?;
    let transport = HttpTransport::new()?;
    let search_params = PipelineParams {
        dry_run: true,
        ..params.clone()
    };
    let pipeline = Pipeline::new(&transport, &search_params, &aoi)?;
    let records = pipeline.search(year)?;
    Ok(select(records, params.candidate_limit()?))
}

/// Download, extract, and clip a single product into the output tree.
/// The year's cache directory is left in place.
pub fn process_candidate(
    params: &PipelineParams,
    year: i32,
    product: &ProductRecord,
) -> Result<CandidateOutcome> {
    params.validate()?;
    let aoi = geometry::load(&params.mask)?;
    let transport = HttpTransport::new()?;
    let pipeline = Pipeline::new(&transport, params, &aoi)?;
    pipeline.cache().prepare_year(year)?;
    pipeline.process_candidate(year, product)
}
