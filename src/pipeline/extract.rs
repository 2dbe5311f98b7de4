use crate::constants::{DOCUMENTATION_MARKERS, DOCUMENT_EXTENSIONS, TABULAR_EXTENSIONS};
use crate::error::{PipelineError, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Whether an archive entry is a data file worth keeping: tabular extension, and
/// neither a layout/manual document nor a document format.
pub fn is_tabular_entry(name: &str) -> bool {
    let lower = name.to_lowercase();
    let extension = Path::new(&lower)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();

    let tabular = TABULAR_EXTENSIONS.contains(&extension.as_str());
    let documentation = DOCUMENTATION_MARKERS.iter().any(|m| lower.contains(m))
        || DOCUMENT_EXTENSIONS.contains(&extension.as_str());
    tabular && !documentation
}

/// Unpack the tabular entries of `archive` under `dest_dir`, keeping their relative
/// paths. Entries are streamed one at a time; nothing is held whole in memory.
///
/// Blocking; run it on a blocking thread.
pub fn extract_tabular_entries(archive: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let failed = |message: String| PipelineError::ArchiveExtraction {
        path: archive.to_path_buf(),
        message,
    };

    let file = File::open(archive).map_err(|e| failed(format!("open: {e}")))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| failed(format!("not a valid archive: {e}")))?;
    info!("Extracting {} ({} entries)", archive.display(), zip.len());

    let mut extracted = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| failed(format!("entry {i}: {e}")))?;
        if entry.is_dir() || !is_tabular_entry(entry.name()) {
            debug!("Skipping entry {}", entry.name());
            continue;
        }
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!("Skipping entry with unsafe path: {}", entry.name());
            continue;
        };

        let target = dest_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| failed(format!("create {}: {e}", parent.display())))?;
        }
        let mut out = File::create(&target).map_err(|e| failed(format!("create {}: {e}", target.display())))?;
        io::copy(&mut entry, &mut out).map_err(|e| failed(format!("write {}: {e}", target.display())))?;

        info!("Extracted {}", relative.display());
        crate::metrics::retrieval::file_extracted();
        extracted.push(target);
    }
    Ok(extracted)
}
