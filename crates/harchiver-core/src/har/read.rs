//! Read an archive back from disk.

use anyhow::{Context, Result};
use std::path::Path;

use super::model::Har;

/// Parses a HAR file. Fails if the file is missing or not a valid HAR document.
pub fn read_archive(path: &Path) -> Result<Har> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read HAR file: {}", path.display()))?;
    let har: Har = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse HAR JSON: {}", path.display()))?;
    Ok(har)
}
