//! Per-archive resource accounting and entry path normalization.

use std::io::Read;

use super::{ArchiveError, ArchiveLimits, UnsafeReason};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Normalizes an archive entry path relative to the extraction root.
///
/// Returns `Ok(None)` for paths that name the root itself (`""`, `"./"`).
/// Absolute paths, drive prefixes and `..` segments that climb above the
/// root are rejected.
pub(crate) fn normalize_entry_path(raw: &str) -> Result<Option<String>, UnsafeReason> {
    let traversal = || UnsafeReason::PathTraversal {
        name: raw.to_owned(),
    };

    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(traversal());
    }

    let mut segments: Vec<&str> = Vec::new();
    for (position, segment) in unified.split('/').enumerate() {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(traversal());
                }
            }
            drive if position == 0 && drive.ends_with(':') => return Err(traversal()),
            normal => segments.push(normal),
        }
    }

    if segments.is_empty() {
        Ok(None)
    } else {
        Ok(Some(segments.join("/")))
    }
}

/// Returns whether the entry name carries a supported image extension.
pub(crate) fn is_image_name(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, extension)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|known| extension.eq_ignore_ascii_case(known))
    })
}

/// Tracks decompressed bytes and accepted entries for one extraction.
pub(crate) struct ExtractionBudget<'a> {
    limits: &'a ArchiveLimits,
    total: u64,
    accepted: usize,
}

impl<'a> ExtractionBudget<'a> {
    pub fn new(limits: &'a ArchiveLimits) -> Self {
        Self {
            limits,
            total: 0,
            accepted: 0,
        }
    }

    /// Counts one more image entry against the entry ceiling.
    pub fn admit(&mut self) -> Result<(), ArchiveError> {
        self.accepted += 1;
        if self.accepted > self.limits.max_entries {
            return Err(UnsafeReason::TooManyEntries {
                max: self.limits.max_entries,
            }
            .into());
        }
        Ok(())
    }

    /// Charges bytes that had to be decompressed to skip past an entry.
    pub fn charge_skipped(&mut self, size: u64) -> Result<(), ArchiveError> {
        self.total = self.total.saturating_add(size);
        if self.total > self.limits.max_total_uncompressed {
            return Err(self.total_too_large());
        }
        Ok(())
    }

    /// Charges an entry by its declared size without reading it.
    pub fn reserve_entry(&mut self, name: &str, size: u64) -> Result<(), ArchiveError> {
        if size > self.limits.max_entry_size {
            return Err(self.entry_too_large(name));
        }
        self.charge_skipped(size)
    }

    /// Reads one entry, enforcing the per-entry and cumulative caps.
    ///
    /// The declared size is only used to fail early; the real size is
    /// measured by never reading more than one byte past the allowance.
    pub fn read_entry(
        &mut self,
        name: &str,
        declared: Option<u64>,
        reader: impl Read,
    ) -> Result<Vec<u8>, ArchiveError> {
        let remaining = self
            .limits
            .max_total_uncompressed
            .saturating_sub(self.total);

        if let Some(declared) = declared {
            if declared > self.limits.max_entry_size {
                return Err(self.entry_too_large(name));
            }
            if declared > remaining {
                return Err(self.total_too_large());
            }
        }

        let allowance = self.limits.max_entry_size.min(remaining);
        let mut data = Vec::new();
        reader
            .take(allowance.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|err| ArchiveError::Decode(format!("failed to read entry '{name}': {err}")))?;

        let read = data.len() as u64;
        if read > allowance {
            return Err(if read > self.limits.max_entry_size {
                self.entry_too_large(name)
            } else {
                self.total_too_large()
            });
        }

        self.total += read;
        Ok(data)
    }

    fn entry_too_large(&self, name: &str) -> ArchiveError {
        UnsafeReason::EntryTooLarge {
            name: name.to_owned(),
            max: self.limits.max_entry_size,
        }
        .into()
    }

    fn total_too_large(&self) -> ArchiveError {
        UnsafeReason::TotalTooLarge {
            max: self.limits.max_total_uncompressed,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ArchiveLimits {
        ArchiveLimits {
            max_archive_size: 1024,
            max_entry_size: 10,
            max_total_uncompressed: 15,
            max_entries: 2,
        }
    }

    #[test]
    fn normalizes_relative_paths() {
        assert_eq!(
            normalize_entry_path("scans/./page.png").unwrap(),
            Some("scans/page.png".to_string())
        );
        assert_eq!(
            normalize_entry_path("scans/tmp/../page.png").unwrap(),
            Some("scans/page.png".to_string())
        );
        assert_eq!(
            normalize_entry_path("scans\\page.png").unwrap(),
            Some("scans/page.png".to_string())
        );
        assert_eq!(normalize_entry_path("./").unwrap(), None);
    }

    #[test]
    fn rejects_paths_escaping_the_root() {
        for raw in [
            "../../etc/passwd",
            "scans/../../x.png",
            "/etc/passwd",
            "\\windows\\x.png",
            "C:/x.png",
        ] {
            assert!(
                matches!(
                    normalize_entry_path(raw),
                    Err(UnsafeReason::PathTraversal { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn recognizes_image_extensions() {
        assert!(is_image_name("a/b/page.PNG"));
        assert!(is_image_name("photo.jpeg"));
        assert!(is_image_name("photo.Jpg"));
        assert!(!is_image_name("notes.txt"));
        assert!(!is_image_name("png"));
    }

    #[test]
    fn measures_real_entry_size() {
        let limits = limits();
        let mut budget = ExtractionBudget::new(&limits);

        // A lying header does not get past the bounded read.
        let err = budget
            .read_entry("big.png", Some(1), &[0u8; 11][..])
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsafeContent(UnsafeReason::EntryTooLarge { .. })
        ));
    }

    #[test]
    fn enforces_cumulative_cap() {
        let limits = limits();
        let mut budget = ExtractionBudget::new(&limits);

        assert_eq!(budget.read_entry("a.png", None, &[1u8; 10][..]).unwrap().len(), 10);
        let err = budget.read_entry("b.png", None, &[1u8; 6][..]).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsafeContent(UnsafeReason::TotalTooLarge { max: 15 })
        ));
    }

    #[test]
    fn enforces_entry_count() {
        let limits = limits();
        let mut budget = ExtractionBudget::new(&limits);
        budget.admit().unwrap();
        budget.admit().unwrap();
        assert!(matches!(
            budget.admit(),
            Err(ArchiveError::UnsafeContent(UnsafeReason::TooManyEntries { max: 2 }))
        ));
    }
}
