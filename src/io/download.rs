//! Product archive download into the cache.
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Error, Result};
use crate::io::http::Transport;
use crate::types::{AccessToken, ProductRecord};

/// `<base>(<id>)/$value`
pub fn product_url(download_base: &str, product_id: &str) -> String {
    format!("{}({})/$value", download_base.trim_end_matches('/'), product_id)
}

/// Archive location for a product inside a year's cache directory
pub fn archive_path(year_dir: &Path, product: &ProductRecord) -> PathBuf {
    year_dir.join(format!("{}.zip", product.name))
}

/// Stream the product archive to `<year_dir>/<name>.zip`.
///
/// The body is written to a temporary file in the same directory and only
/// renamed into place once the transfer completes, so a failed download
/// never leaves a truncated archive behind.
pub fn download_product<T: Transport>(
    transport: &T,
    download_base: &str,
    product: &ProductRecord,
    token: &AccessToken,
    year_dir: &Path,
) -> Result<PathBuf> {
    let url = product_url(download_base, &product.id);
    let target = archive_path(year_dir, product);
    let tmp = NamedTempFile::new_in(year_dir)?;

    let bytes = {
        let mut writer = BufWriter::new(tmp.as_file());
        transport
            .download(&url, token.secret(), &mut writer)
            .map_err(|e| Error::Download(format!("{}: {}", product.name, e)))?
    };
    if bytes == 0 {
        return Err(Error::Download(format!("{}: empty response body", product.name)));
    }
    tmp.persist(&target).map_err(|e| Error::Io(e.error))?;
    info!("Downloaded {} ({} bytes) to {:?}", product.name, bytes, target);
    Ok(target)
}
