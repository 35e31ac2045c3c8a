use std::io::Cursor;

use zip::ZipArchive;

use super::budget::{ExtractionBudget, is_image_name, normalize_entry_path};
use super::{ArchiveError, ArchiveLimits};
use crate::TRACING_TARGET_ARCHIVE;
use crate::entry::ImageEntry;

pub(super) fn extract(bytes: &[u8], limits: &ArchiveLimits) -> Result<Vec<ImageEntry>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(ArchiveError::decode)?;
    let mut budget = ExtractionBudget::new(limits);
    let mut entries = Vec::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(ArchiveError::decode)?;
        let Some(name) = normalize_entry_path(file.name())? else {
            continue;
        };

        if !file.is_file() || !is_image_name(&name) {
            tracing::trace!(target: TRACING_TARGET_ARCHIVE, entry = %name, "skipping zip entry");
            continue;
        }

        budget.admit()?;
        let declared = file.size();
        let data = budget.read_entry(&name, Some(declared), &mut file)?;
        entries.push(ImageEntry::from_archive(name, data));
    }

    Ok(entries)
}
