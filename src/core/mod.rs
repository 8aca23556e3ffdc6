//! Core building blocks: run parameters, candidate selection, cache lifecycle,
//! the per-candidate fetch/extract/clip state machine, and raster processing
//! (clip, resample, align). These are consumed by the high-level `api` module.
pub mod cache;
pub mod params;
pub mod pipeline;
pub mod processing;
pub mod selection;
