//! Candidate selection: earliest acquisitions first, bounded per year.
use crate::types::ProductRecord;

/// Order `records` by acquisition time and keep at most `max_count`.
///
/// The sort is stable, so products acquired at the same instant keep their
/// catalog order. Footprint coverage of the area of interest is not checked.
pub fn select(mut records: Vec<ProductRecord>, max_count: usize) -> Vec<ProductRecord> {
    records.sort_by_key(|r| r.acquisition_timestamp);
    records.truncate(max_count);
    records
}
