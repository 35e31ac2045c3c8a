use std::io::Read;

use super::budget::{ExtractionBudget, is_image_name, normalize_entry_path};
use super::{ArchiveError, ArchiveLimits};
use crate::TRACING_TARGET_ARCHIVE;
use crate::entry::ImageEntry;

/// Reads a tar stream, compressed or not, without touching the filesystem.
pub(super) fn extract(reader: impl Read, limits: &ArchiveLimits) -> Result<Vec<ImageEntry>, ArchiveError> {
    let mut archive = tar::Archive::new(reader);
    let mut budget = ExtractionBudget::new(limits);
    let mut entries = Vec::new();

    for entry in archive.entries().map_err(ArchiveError::decode)? {
        let mut entry = entry.map_err(ArchiveError::decode)?;
        let raw_name = entry
            .path()
            .map_err(ArchiveError::decode)?
            .to_string_lossy()
            .into_owned();

        let Some(name) = normalize_entry_path(&raw_name)? else {
            continue;
        };

        // Skipping still decompresses the entry, so it counts against the total.
        let size = entry.size();
        if !entry.header().entry_type().is_file() || !is_image_name(&name) {
            tracing::trace!(target: TRACING_TARGET_ARCHIVE, entry = %name, "skipping tar entry");
            budget.charge_skipped(size)?;
            continue;
        }

        budget.admit()?;
        let data = budget.read_entry(&name, Some(size), &mut entry)?;
        entries.push(ImageEntry::from_archive(name, data));
    }

    Ok(entries)
}
