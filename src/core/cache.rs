//! Working-directory cache: one staging directory per year, purged between
//! candidates and at the end of a run to bound disk usage.
use std::fmt::Display;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::Result;

/// Log a step outcome with a success or failure marker
pub fn report_step<T, E: Display>(step: &str, result: &std::result::Result<T, E>) {
    match result {
        Ok(_) => info!("✓ {}", step),
        Err(e) => error!("✗ {}: {}", step, e),
    }
}

/// Owns the cache root and its per-year partitions
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn year_dir(&self, year: i32) -> PathBuf {
        self.root.join(year.to_string())
    }

    /// Remove whatever a previous run left and recreate an empty root
    pub fn reset(&self) -> Result<()> {
        let result = self.purge().and_then(|_| {
            std::fs::create_dir_all(&self.root)?;
            Ok(())
        });
        report_step(&format!("reset cache {:?}", self.root), &result);
        result
    }

    /// Create the staging directory for `year`
    pub fn prepare_year(&self, year: i32) -> Result<PathBuf> {
        let dir = self.year_dir(year);
        let result = std::fs::create_dir_all(&dir).map(|_| dir.clone());
        report_step(&format!("create cache {:?}", dir), &result);
        Ok(result?)
    }

    /// Empty the year's staging directory and recreate it
    pub fn regenerate_year(&self, year: i32) -> Result<PathBuf> {
        let dir = self.year_dir(year);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        debug!("Regenerated cache {:?}", dir);
        Ok(dir)
    }

    /// Delete the whole cache tree; a missing root is not an error
    pub fn purge(&self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
            debug!("Purged cache {:?}", self.root);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_partitions_live_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("cache"));
        cache.reset().unwrap();
        let year = cache.prepare_year(2015).unwrap();
        assert_eq!(year, dir.path().join("cache").join("2015"));
        assert!(year.is_dir());
    }

    #[test]
    fn regenerate_empties_the_year() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path());
        let year = cache.prepare_year(2016).unwrap();
        std::fs::write(year.join("leftover.zip"), b"x").unwrap();
        cache.regenerate_year(2016).unwrap();
        assert!(year.is_dir());
        assert_eq!(std::fs::read_dir(&year).unwrap().count(), 0);
    }

    #[test]
    fn purge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("c"));
        cache.prepare_year(2017).unwrap();
        cache.purge().unwrap();
        assert!(!cache.root().exists());
        cache.purge().unwrap();
    }
}
