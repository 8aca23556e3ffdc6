#![doc = r#"
s2harvest: a Sentinel-2 acquisition pipeline.

This crate finds Sentinel-2 products that intersect an area of interest, filters them
by year and cloud cover, downloads and unpacks the earliest acquisitions, and clips
every spectral band to the area of interest. Optionally, lower-resolution bands are
resampled onto a reference band's pixel grid. It powers the s2harvest CLI and can be
embedded in your own Rust applications.

Stability
---------
The public library API is experimental in initial releases and may evolve as the
crate stabilizes. Breaking changes can occur.

Requirements
------------
- GDAL development headers and runtime available on your system (JPEG2000 support
  through OpenJPEG for the band images).
- Rust 2024 edition toolchain.
- An account on the Copernicus Data Space Ecosystem for downloads.

Quick start: run the whole pipeline
-----------------------------------
```rust,no_run
use std::path::PathBuf;
use s2harvest::{api::run_pipeline, PipelineParams};

fn main() -> s2harvest::Result<()> {
    let params = PipelineParams {
        mask: PathBuf::from("boundary.geojson"),
        years: vec![2016, 2017],
        max_candidates: Some(2),
        cloud_cover: 20.0,
        credentials: PathBuf::from("credentials.txt"),
        output_dir: PathBuf::from("output"),
        ..Default::default()
    };

    let report = run_pipeline(&params)?;
    println!(
        "processed={} skipped={} failed={}",
        report.processed(),
        report.skipped(),
        report.failed()
    );
    Ok(())
}
```

Clipped bands are written to `<output>/clipped/<year>/<product>/<BAND>.tif` next to a
`product.json` sidecar. Products whose output directory already exists are skipped
without any network traffic.

Search only
-----------
```rust,no_run
use std::path::PathBuf;
use s2harvest::{api::search_year, PipelineParams};

fn main() -> s2harvest::Result<()> {
    let params = PipelineParams {
        mask: PathBuf::from("boundary.geojson"),
        years: vec![2018],
        max_candidates: Some(5),
        ..Default::default()
    };
    for product in search_year(&params, 2018)? {
        println!("{} {}", product.acquisition_timestamp, product.name);
    }
    Ok(())
}
```

Aligning bands
--------------
```rust,no_run
use std::path::Path;
use s2harvest::{clean, resample};

fn main() -> s2harvest::Result<()> {
    let b02 = Path::new("output/clipped/2016/P/B02.tif");
    let b11 = Path::new("output/clipped/2016/P/B11.tif");
    let reference = s2harvest::GdalRasterReader::open(b02)?.read_band::<u16>(1)?;
    let upsampled = resample(b02, b11)?;
    let masked = clean(&reference, &upsampled.data)?;
    println!("{:?} on {:?}", masked.dim(), upsampled.geotransform);
    Ok(())
}
```

Error handling
--------------
All public functions return `s2harvest::Result<T>`; match on `s2harvest::Error` to
handle specific cases.

```rust,no_run
use s2harvest::{api::run_pipeline, Error, PipelineParams};

fn main() {
    match run_pipeline(&PipelineParams::default()) {
        Ok(report) => println!("{} products", report.processed()),
        Err(Error::MissingArgument { arg }) => eprintln!("missing {arg}"),
        Err(Error::Authentication(e)) => eprintln!("login failed: {e}"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level, ergonomic entry points.
- [`core`]: parameters, selection, cache lifecycle, the candidate state machine, raster processing.
- [`io`]: catalog, identity and download clients, archive handling, GDAL readers/writers.
- [`types`]: domain types (`Band`, `ProductRecord`, `AreaOfInterest`, ...).
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

#[cfg(test)]
mod testutil;

// Curated public API surface
// Types
pub use crate::core::params::{Endpoints, PipelineParams};
pub use crate::core::pipeline::{CandidateOutcome, CandidateState, RunReport, YearReport};
pub use error::{Error, Result};
pub use types::{AccessToken, AreaOfInterest, Band, BandPathMap, Credentials, ProductRecord, SearchCriteria};

// Readers and remote access
pub use io::gdal::{GdalError, GdalMetadata, GdalRasterReader};
pub use io::http::{HttpTransport, Transport, TransportError};

// Selected writer helpers
pub use io::writers::metadata::{embed_tiff_metadata, extract_metadata_fields, write_product_sidecar};

// Raster operations
pub use crate::core::processing::clip::{ClipOptions, clip};
pub use crate::core::processing::resample::{Resampled, clean, resample};
pub use crate::core::selection::select;

// High-level API re-exports
pub use api::{process_candidate, run_with_transport, run_pipeline, search_year};
