//! Batch artifact: every enriched record of a run as one JSON array.

use std::path::Path;

use tracing::info;

use tenderwatch_shared::{EnrichmentResult, Result, TenderError};

/// Write `results` as an indented JSON array. Parent directories are created.
pub fn write_batch(path: &Path, results: &[EnrichmentResult]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TenderError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(results)
        .map_err(|e| TenderError::parse(format!("failed to serialize batch: {e}")))?;
    std::fs::write(path, json).map_err(|e| TenderError::io(path, e))?;

    info!(path = %path.display(), count = results.len(), "batch written");
    Ok(())
}

/// Read a batch artifact written by [`write_batch`].
pub fn read_batch(path: &Path) -> Result<Vec<EnrichmentResult>> {
    let raw = std::fs::read_to_string(path).map_err(|e| TenderError::io(path, e))?;
    serde_json::from_str(&raw)
        .map_err(|e| TenderError::parse(format!("invalid batch file {}: {e}", path.display())))
}
