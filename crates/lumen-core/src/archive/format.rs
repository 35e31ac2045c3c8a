use serde::{Deserialize, Serialize};

use super::ArchiveError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;

/// Archive extensions that are recognized but never unpacked.
const UNSUPPORTED_EXTENSIONS: [&str; 6] = [".7z", ".xz", ".lzma", ".zst", ".cab", ".iso"];

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// ZIP archive.
    Zip,
    /// Uncompressed TAR archive.
    Tar,
    /// TAR archive compressed with gzip.
    TarGz,
    /// TAR archive compressed with bzip2.
    TarBz2,
    /// RAR archive, unpacked by an external decoder.
    Rar,
}

impl ArchiveFormat {
    /// Returns the canonical file extension for this format.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::Rar => "rar",
        }
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::Tar => "application/x-tar",
            Self::TarGz => "application/gzip",
            Self::TarBz2 => "application/x-bzip2",
            Self::Rar => "application/vnd.rar",
        }
    }

    /// Resolves the declared format from a filename extension.
    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        let name = filename.to_ascii_lowercase();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.bz2")
            || name.ends_with(".tbz2")
            || name.ends_with(".tbz")
            || name.ends_with(".bz2")
        {
            Some(Self::TarBz2)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".rar") {
            Some(Self::Rar)
        } else {
            None
        }
    }

    /// Identifies the format from leading magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
            Some(Self::Zip)
        } else if bytes.starts_with(GZIP_MAGIC) {
            Some(Self::TarGz)
        } else if bytes.starts_with(BZIP2_MAGIC) {
            Some(Self::TarBz2)
        } else if bytes.starts_with(RAR_MAGIC) {
            Some(Self::Rar)
        } else if bytes
            .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
            .is_some_and(|magic| magic == USTAR_MAGIC)
        {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Resolves the format of an uploaded archive.
    ///
    /// The filename extension is the declared format; content is sniffed only
    /// when the name carries no recognizable archive extension. Names that
    /// declare a known but unsupported archive type are rejected outright.
    pub fn detect(filename: &str, bytes: &[u8]) -> Result<Self, ArchiveError> {
        let unsupported = || ArchiveError::UnsupportedFormat {
            filename: filename.to_owned(),
        };

        if let Some(format) = Self::from_filename(filename) {
            return Ok(format);
        }

        let lowercase = filename.to_ascii_lowercase();
        if UNSUPPORTED_EXTENSIONS
            .iter()
            .any(|extension| lowercase.ends_with(extension))
        {
            return Err(unsupported());
        }

        Self::sniff(bytes).ok_or_else(unsupported)
    }
}
