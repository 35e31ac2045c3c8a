//! Safe unpacking of uploaded archives into candidate image entries.
//!
//! Every extraction runs against an [`ArchiveLimits`] budget: the compressed
//! size is checked before any decoding, each entry is read through a bounded
//! reader and the decompressed total is tracked across entries. Entry names
//! are normalized relative to the archive root and anything that would land
//! outside it aborts the extraction.
//!
//! ZIP and TAR variants are decoded in-process from memory. RAR is delegated
//! to a [`SolidArchiveDecoder`]: its listing is checked against the budget
//! before anything is unpacked into a scoped scratch directory.

mod budget;
mod format;
mod unrar;
mod untar;
mod unzip;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fmt, io};

use strum::IntoStaticStr;

pub use self::format::ArchiveFormat;
pub use self::unrar::{SolidArchiveDecoder, SolidEntry, UnarDecoder};
use crate::entry::ImageEntry;
use crate::error::ErrorCategory;
use crate::TRACING_TARGET_ARCHIVE;

/// Resource ceilings applied to one archive extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Maximum compressed archive size, in bytes.
    pub max_archive_size: u64,
    /// Maximum decompressed size of one entry, in bytes.
    pub max_entry_size: u64,
    /// Maximum decompressed size of all entries, in bytes.
    pub max_total_uncompressed: u64,
    /// Maximum number of image entries.
    pub max_entries: usize,
}

/// Why an archive was judged unsafe to unpack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsafeReason {
    #[error("entry '{name}' expands beyond {max} bytes")]
    EntryTooLarge { name: String, max: u64 },

    #[error("archive expands beyond {max} bytes in total")]
    TotalTooLarge { max: u64 },

    #[error("archive contains more than {max} images")]
    TooManyEntries { max: usize },

    #[error("entry '{name}' resolves outside the archive root")]
    PathTraversal { name: String },
}

/// Errors raised while detecting or unpacking an archive.
#[derive(Debug, thiserror::Error, IntoStaticStr)]
pub enum ArchiveError {
    /// Neither the declared extension nor the content names a supported format.
    #[error("unsupported archive format: {filename}")]
    #[strum(serialize = "unsupported_format")]
    UnsupportedFormat { filename: String },

    /// The compressed archive exceeds the configured ceiling.
    #[error("archive is {size} bytes, the limit is {max}")]
    #[strum(serialize = "archive_too_large")]
    TooLarge { size: u64, max: u64 },

    /// Unpacking would exceed a resource limit or escape the archive root.
    #[error("unsafe archive content: {0}")]
    #[strum(serialize = "unsafe_content")]
    UnsafeContent(#[from] UnsafeReason),

    /// The archive unpacked cleanly but held no supported images.
    #[error("archive contains no supported images")]
    #[strum(serialize = "no_images_found")]
    NoImagesFound,

    /// The archive is corrupt, encrypted or otherwise undecodable.
    #[error("failed to decode archive: {0}")]
    #[strum(serialize = "archive_decode_failed")]
    Decode(String),

    /// The external decoder for this format is not installed.
    #[error("archive decoder '{program}' is not available")]
    #[strum(serialize = "decoder_unavailable")]
    DecoderUnavailable { program: String },

    /// Scratch storage could not be prepared or read.
    #[error("archive scratch storage failed: {0}")]
    #[strum(serialize = "archive_io_failed")]
    Io(#[from] io::Error),
}

impl ArchiveError {
    /// Returns the machine-readable reason code.
    pub fn code(&self) -> &'static str {
        self.into()
    }

    /// Returns whether the failure is the request's fault or the service's.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedFormat { .. } | Self::TooLarge { .. } => ErrorCategory::Intake,
            Self::UnsafeContent(_) | Self::NoImagesFound | Self::Decode(_) => {
                ErrorCategory::Extraction
            }
            Self::DecoderUnavailable { .. } | Self::Io(_) => ErrorCategory::Internal,
        }
    }

    pub(crate) fn decode(err: impl fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Unpacks archives into in-memory [`ImageEntry`] values.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    temp_root: PathBuf,
    rar_decoder: Arc<dyn SolidArchiveDecoder>,
}

impl ArchiveExtractor {
    /// Creates an extractor that uses `temp_root` for scratch directories.
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
            rar_decoder: Arc::new(UnarDecoder::default()),
        }
    }

    /// Replaces the decoder used for RAR archives.
    pub fn with_rar_decoder(mut self, decoder: impl SolidArchiveDecoder + 'static) -> Self {
        self.rar_decoder = Arc::new(decoder);
        self
    }

    /// Returns the scratch root.
    #[inline]
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Unpacks `bytes` as `format` and returns every supported image entry.
    ///
    /// Entries are returned in archive order. Directories, links and files
    /// without a PNG or JPEG extension are skipped. This is blocking work and
    /// belongs on a blocking thread.
    pub fn extract(
        &self,
        bytes: &[u8],
        format: ArchiveFormat,
        limits: &ArchiveLimits,
    ) -> Result<Vec<ImageEntry>, ArchiveError> {
        let size = bytes.len() as u64;
        if size > limits.max_archive_size {
            return Err(ArchiveError::TooLarge {
                size,
                max: limits.max_archive_size,
            });
        }

        tracing::debug!(
            target: TRACING_TARGET_ARCHIVE,
            format = format.extension(),
            size,
            "extracting archive"
        );

        let result = match format {
            ArchiveFormat::Zip => unzip::extract(bytes, limits),
            ArchiveFormat::Tar => untar::extract(bytes, limits),
            ArchiveFormat::TarGz => untar::extract(flate2::read::GzDecoder::new(bytes), limits),
            ArchiveFormat::TarBz2 => untar::extract(bzip2::read::BzDecoder::new(bytes), limits),
            ArchiveFormat::Rar => {
                unrar::extract(bytes, limits, &self.temp_root, self.rar_decoder.as_ref())
            }
        };

        let entries = match result {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_ARCHIVE,
                    format = format.extension(),
                    code = err.code(),
                    error = %err,
                    "archive extraction failed"
                );
                return Err(err);
            }
        };

        if entries.is_empty() {
            return Err(ArchiveError::NoImagesFound);
        }

        tracing::info!(
            target: TRACING_TARGET_ARCHIVE,
            format = format.extension(),
            images = entries.len(),
            "archive extracted"
        );

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntrySource;
    use crate::fixtures;

    fn limits() -> ArchiveLimits {
        ArchiveLimits {
            max_archive_size: 10 * 1024 * 1024,
            max_entry_size: 1024 * 1024,
            max_total_uncompressed: 4 * 1024 * 1024,
            max_entries: 50,
        }
    }

    fn extractor() -> (tempfile::TempDir, ArchiveExtractor) {
        let root = tempfile::tempdir().unwrap();
        let extractor = ArchiveExtractor::new(root.path());
        (root, extractor)
    }

    fn names(entries: &[ImageEntry]) -> Vec<&str> {
        entries.iter().map(ImageEntry::filename).collect()
    }

    #[test]
    fn zip_yields_images_in_archive_order() {
        let png = fixtures::png(8, 8);
        let jpeg = fixtures::jpeg(8, 8);
        let archive = fixtures::zip_archive(&[
            ("scans/b.png", &png),
            ("readme.txt", b"not an image"),
            ("scans/a.JPG", &jpeg),
        ]);

        let (_root, extractor) = extractor();
        let entries = extractor
            .extract(&archive, ArchiveFormat::Zip, &limits())
            .unwrap();

        assert_eq!(names(&entries), ["scans/b.png", "scans/a.JPG"]);
        assert!(entries.iter().all(|e| e.source() == EntrySource::FromArchive));
        assert_eq!(entries[0].bytes().as_ref(), png.as_slice());
    }

    #[test]
    fn tar_variants_extract_the_same_entries() {
        let png = fixtures::png(4, 4);
        let files: &[(&str, &[u8])] = &[("one.png", &png), ("notes.md", b"# notes")];
        let (_root, extractor) = extractor();

        for (bytes, format) in [
            (fixtures::tar_archive(files), ArchiveFormat::Tar),
            (fixtures::tar_gz(files), ArchiveFormat::TarGz),
            (fixtures::tar_bz2(files), ArchiveFormat::TarBz2),
        ] {
            let entries = extractor.extract(&bytes, format, &limits()).unwrap();
            assert_eq!(names(&entries), ["one.png"], "{format:?}");
        }
    }

    #[test]
    fn rejects_oversized_archive_before_decoding() {
        let limits = ArchiveLimits {
            max_archive_size: 4,
            ..limits()
        };
        let (_root, extractor) = extractor();
        let err = extractor
            .extract(b"garbage-but-large", ArchiveFormat::Zip, &limits)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::TooLarge { size: 17, max: 4 }));
    }

    #[test]
    fn rejects_zip_path_traversal() {
        let png = fixtures::png(4, 4);
        let archive = fixtures::zip_archive(&[("ok.png", &png), ("../../etc/passwd.png", &png)]);

        let (root, extractor) = extractor();
        let err = extractor
            .extract(&archive, ArchiveFormat::Zip, &limits())
            .unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::UnsafeContent(UnsafeReason::PathTraversal { .. })
        ));
        assert!(!root.path().join("../etc/passwd.png").exists());
    }

    #[test]
    fn rejects_tar_path_traversal() {
        let archive = fixtures::tar_with_raw_name("../escape.png", &fixtures::png(2, 2));
        let (_root, extractor) = extractor();
        let err = extractor
            .extract(&archive, ArchiveFormat::Tar, &limits())
            .unwrap_err();
        assert_eq!(err.code(), "unsafe_content");
    }

    #[test]
    fn rejects_decompression_bomb() {
        let zeros = vec![0u8; 10 * 1024];
        let archive = fixtures::zip_archive(&[
            ("a.png", &zeros),
            ("b.png", &zeros),
            ("c.png", &zeros),
        ]);
        let limits = ArchiveLimits {
            max_entry_size: 16 * 1024,
            max_total_uncompressed: 16 * 1024,
            ..limits()
        };

        let (_root, extractor) = extractor();
        let err = extractor
            .extract(&archive, ArchiveFormat::Zip, &limits)
            .unwrap_err();

        // The compressed payload is tiny, the expanded one is not.
        assert!(archive.len() < 2048);
        assert!(matches!(
            err,
            ArchiveError::UnsafeContent(UnsafeReason::TotalTooLarge { .. })
        ));
    }

    #[test]
    fn rejects_oversized_entry() {
        let big = vec![7u8; 4096];
        let archive = fixtures::tar_gz(&[("big.png", &big)]);
        let limits = ArchiveLimits {
            max_entry_size: 1024,
            ..limits()
        };

        let (_root, extractor) = extractor();
        let err = extractor
            .extract(&archive, ArchiveFormat::TarGz, &limits)
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsafeContent(UnsafeReason::EntryTooLarge { max: 1024, .. })
        ));
    }

    #[test]
    fn rejects_too_many_images() {
        let png = fixtures::png(2, 2);
        let archive = fixtures::zip_archive(&[("1.png", &png), ("2.png", &png), ("3.png", &png)]);
        let limits = ArchiveLimits {
            max_entries: 2,
            ..limits()
        };

        let (_root, extractor) = extractor();
        let err = extractor
            .extract(&archive, ArchiveFormat::Zip, &limits)
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsafeContent(UnsafeReason::TooManyEntries { max: 2 })
        ));
    }

    #[test]
    fn skipped_tar_entries_charge_bytes_but_not_the_entry_ceiling() {
        let png = fixtures::png(2, 2);
        let notes = vec![b'x'; 600];
        let archive = fixtures::tar_archive(&[
            ("a.txt", &notes),
            ("b.txt", &notes),
            ("page.png", &png),
        ]);
        let (_root, extractor) = extractor();

        let one_image = ArchiveLimits {
            max_entries: 1,
            ..limits()
        };
        let entries = extractor
            .extract(&archive, ArchiveFormat::Tar, &one_image)
            .unwrap();
        assert_eq!(names(&entries), ["page.png"]);

        let small_total = ArchiveLimits {
            max_total_uncompressed: 1000,
            ..limits()
        };
        let err = extractor
            .extract(&archive, ArchiveFormat::Tar, &small_total)
            .unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UnsafeContent(UnsafeReason::TotalTooLarge { max: 1000 })
        ));
    }

    #[test]
    fn archive_without_images_is_an_error() {
        let archive = fixtures::zip_archive(&[("notes.txt", b"hello")]);
        let (_root, extractor) = extractor();
        let err = extractor
            .extract(&archive, ArchiveFormat::Zip, &limits())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::NoImagesFound));
        assert_eq!(err.category(), ErrorCategory::Extraction);
    }

    #[test]
    fn corrupt_archive_is_a_decode_error() {
        let (_root, extractor) = extractor();
        let err = extractor
            .extract(b"PK\x03\x04 definitely not a zip", ArchiveFormat::Zip, &limits())
            .unwrap_err();
        assert_eq!(err.code(), "archive_decode_failed");
    }
}
