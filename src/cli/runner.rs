use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use s2harvest::api::run_pipeline;
use s2harvest::{CandidateOutcome, PipelineParams, RunReport};

use super::args::CliArgs;
use super::errors::AppError;

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Config file first, then every flag the user actually passed
fn build_params(args: CliArgs) -> Result<PipelineParams, AppError> {
    let mut params = match &args.config {
        Some(path) => PipelineParams::from_json_file(path)?,
        None => PipelineParams::default(),
    };
    if let Some(mask) = args.mask {
        params.mask = mask;
    }
    if !args.years.is_empty() {
        params.years = args.years;
    }
    if args.max_candidates.is_some() {
        params.max_candidates = args.max_candidates;
    }
    if let Some(cc) = args.cloud_cover {
        params.cloud_cover = cc;
    }
    if let Some(sensor) = args.sensor {
        params.sensor = sensor;
    }
    if let Some(credentials) = args.credentials {
        params.credentials = credentials;
    }
    if let Some(output) = args.output {
        params.output_dir = output;
    }
    if let Some(cache_dir) = args.cache_dir {
        params.cache_dir = cache_dir;
    }
    if let Some(band) = args.reference_band {
        params.reference_band = band;
    }
    if let Some(epsg) = args.fallback_epsg {
        params.fallback_epsg = epsg;
    }
    if let Some(retries) = args.page_retries {
        params.page_retries = retries;
    }
    params.dry_run |= args.dry_run;
    params.keep_cache |= args.keep_cache;
    params.align |= args.align;
    if args.no_purge {
        params.purge_each_candidate = false;
    }
    Ok(params)
}

fn log_summary(report: &RunReport) {
    for year in &report.years {
        match &year.search_error {
            Some(reason) => warn!("{}: search failed: {}", year.year, reason),
            None => info!(
                "{}: found {}, selected {}, processed {}, skipped {}, failed {}",
                year.year, year.found, year.selected, year.processed, year.skipped, year.failed
            ),
        }
        for candidate in &year.candidates {
            if let CandidateOutcome::Failed { stage, reason } = &candidate.outcome {
                error!("{}: {} failed at {}: {}", year.year, candidate.name, stage, reason);
            }
        }
    }
    info!("Processing complete!");
    info!("Processed: {}", report.processed());
    info!("Skipped: {}", report.skipped());
    info!("Errors: {}", report.failed());
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);

    let params = build_params(args)?;
    info!("Area of interest: {:?}", params.mask);
    info!("Years: {:?}", params.years);
    info!("Output directory: {:?}", params.output_dir);

    let report = run_pipeline(&params).map_err(AppError::from)?;
    finish(&report)?;
    Ok(())
}

/// Failed searches and candidates are reported, not turned into a failed exit
fn finish(report: &RunReport) -> Result<(), AppError> {
    log_summary(report);
    Ok(())
}
