use std::collections::HashSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

/// Where an [`ImageEntry`] came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntrySource {
    /// Uploaded directly with the request.
    Direct,
    /// Unpacked from the request archive.
    FromArchive,
}

/// A candidate image travelling through the pipeline.
///
/// Entries are immutable; each stage takes ownership and hands the entry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    filename: String,
    bytes: Bytes,
    source: EntrySource,
}

impl ImageEntry {
    /// Creates an entry for a directly uploaded image.
    pub fn direct(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            source: EntrySource::Direct,
        }
    }

    /// Creates an entry for an image unpacked from an archive.
    pub fn from_archive(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            source: EntrySource::FromArchive,
        }
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[inline]
    pub fn source(&self) -> EntrySource {
        self.source
    }

    /// Returns the payload size in bytes.
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Consumes the entry and returns the payload.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    fn renamed(self, filename: String) -> Self {
        Self { filename, ..self }
    }
}

/// Renames repeated filenames so every entry is addressable by name.
///
/// The first occurrence keeps its name; later ones become `scan (2).png`,
/// `scan (3).png` and so on, in input order, skipping names already taken.
pub(crate) fn unique_filenames(entries: Vec<ImageEntry>) -> Vec<ImageEntry> {
    let mut taken: HashSet<String> = HashSet::with_capacity(entries.len());
    let originals: HashSet<String> = entries.iter().map(|e| e.filename.clone()).collect();

    entries
        .into_iter()
        .map(|entry| {
            if taken.insert(entry.filename.clone()) {
                return entry;
            }

            let mut copy = 2usize;
            let filename = loop {
                let candidate = numbered(&entry.filename, copy);
                if !taken.contains(&candidate) && !originals.contains(&candidate) {
                    break candidate;
                }
                copy += 1;
            };
            taken.insert(filename.clone());
            entry.renamed(filename)
        })
        .collect()
}

/// Inserts ` (n)` before the extension of the last path segment.
fn numbered(filename: &str, copy: usize) -> String {
    let base_start = filename.rfind('/').map_or(0, |slash| slash + 1);
    match filename[base_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = base_start + dot;
            format!("{} ({copy}){}", &filename[..split], &filename[split..])
        }
        _ => format!("{filename} ({copy})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[ImageEntry]) -> Vec<&str> {
        entries.iter().map(ImageEntry::filename).collect()
    }

    #[test]
    fn repeated_names_get_numbered_in_input_order() {
        let entries = unique_filenames(vec![
            ImageEntry::direct("scan.png", Vec::new()),
            ImageEntry::from_archive("scan.png", Vec::new()),
            ImageEntry::direct("scan.png", Vec::new()),
            ImageEntry::direct("other.jpg", Vec::new()),
        ]);

        assert_eq!(
            names(&entries),
            ["scan.png", "scan (2).png", "scan (3).png", "other.jpg"]
        );
        assert_eq!(entries[1].source(), EntrySource::FromArchive);
    }

    #[test]
    fn generated_names_never_shadow_uploaded_ones() {
        let entries = unique_filenames(vec![
            ImageEntry::direct("scan.png", Vec::new()),
            ImageEntry::direct("scan.png", Vec::new()),
            ImageEntry::direct("scan (2).png", Vec::new()),
        ]);

        assert_eq!(names(&entries), ["scan.png", "scan (3).png", "scan (2).png"]);
    }

    #[test]
    fn numbering_respects_directories_and_missing_extensions() {
        assert_eq!(numbered("pages.v1/page", 2), "pages.v1/page (2)");
        assert_eq!(numbered("dir/.hidden", 2), "dir/.hidden (2)");
        assert_eq!(numbered("dir/a.b.png", 4), "dir/a.b (4).png");
    }
}
