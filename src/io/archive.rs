//! Archive extraction and band file discovery for SAFE products.
use std::fs::File;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Band, BandPathMap};

/// Directory layouts in which band images are searched, relative to the extraction root.
/// Older products keep all bands directly in IMG_DATA; newer ones split them by resolution.
const BAND_GLOBS: [&str; 2] = [
    "**/GRANULE/*/IMG_DATA/*.jp2",
    "**/GRANULE/*/IMG_DATA/R*m/*.jp2",
];

/// Extract `archive` into `dest`, then delete the archive whether or not extraction succeeded.
/// Any earlier content of `dest` is removed first.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let result = unpack(archive, dest);
    if let Err(e) = std::fs::remove_file(archive) {
        warn!("Could not remove archive {:?}: {}", archive, e);
    }
    if result.is_err() && dest.exists() {
        if let Err(e) = std::fs::remove_dir_all(dest) {
            warn!("Could not remove partial extraction {:?}: {}", dest, e);
        }
    }
    result.map(|_| dest.to_path_buf())
}

fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        debug!("Removing stale extraction {:?}", dest);
        std::fs::remove_dir_all(dest)?;
    }
    let file = File::open(archive)
        .map_err(|e| Error::Extraction(format!("cannot open {:?}: {}", archive, e)))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::Extraction(format!("{:?} is not a valid archive: {}", archive, e)))?;
    std::fs::create_dir_all(dest)?;
    zip.extract(dest)
        .map_err(|e| Error::Extraction(format!("cannot extract {:?}: {}", archive, e)))?;
    info!("Extracted {} entries from {:?}", zip.len(), archive);
    Ok(())
}

/// Band token of an image file name, e.g. `T31TGL_20150704T103026_B8A_20m.jp2` → `B8A`
pub fn band_from_file_name(path: &Path) -> Option<Band> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('_').find_map(Band::from_code)
}

/// Locate band images below an extracted product.
///
/// Paths are visited in sorted order and the first file seen for a band wins,
/// which prefers the finest resolution folder (`R10m` < `R20m` < `R60m`).
/// Files without a recognizable band token (TCI, AOT, WVP, ...) are ignored.
pub fn discover_bands(root: &Path) -> Result<BandPathMap> {
    let base = Pattern::escape(&root.to_string_lossy());
    let mut files: Vec<PathBuf> = Vec::new();
    for pattern in BAND_GLOBS {
        let full = format!("{}/{}", base, pattern);
        let entries = glob::glob(&full)
            .map_err(|e| Error::Extraction(format!("bad band pattern {}: {}", full, e)))?;
        files.extend(entries.filter_map(|entry| entry.ok()));
    }
    files.sort();
    files.dedup();

    let mut bands = BandPathMap::new();
    for file in files {
        match band_from_file_name(&file) {
            Some(band) => {
                bands.entry(band).or_insert(file);
            }
            None => debug!("Skipping non-band image {:?}", file),
        }
    }
    if bands.is_empty() {
        warn!("No band images found below {:?}", root);
    } else {
        debug!(
            "Discovered bands: {}",
            bands.keys().map(|b| b.code()).collect::<Vec<_>>().join(", ")
        );
    }
    Ok(bands)
}
