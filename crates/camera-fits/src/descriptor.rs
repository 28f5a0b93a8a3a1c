//! Mosaic descriptors: line-oriented lists of the camera files to combine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// File paths listed in descriptor `text`, in order.
///
/// Blank lines and lines starting with `#` are skipped. Relative paths are
/// resolved against `base`, the directory holding the descriptor.
pub fn parse_lines(text: &str, base: &Path) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| base.join(l))
        .collect()
}

/// Read and parse the descriptor at `path`.
pub async fn read_descriptor(path: &Path) -> Result<Arc<[PathBuf]>> {
    let text = tokio::fs::read_to_string(path).await?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parse_lines(&text, base).into())
}
