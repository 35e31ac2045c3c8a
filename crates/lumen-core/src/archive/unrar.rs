use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Deserializer};

use super::budget::{ExtractionBudget, is_image_name, normalize_entry_path};
use super::{ArchiveError, ArchiveLimits};
use crate::TRACING_TARGET_ARCHIVE;
use crate::entry::ImageEntry;
use crate::scratch::scratch_dir;

/// One entry as reported by [`SolidArchiveDecoder::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolidEntry {
    /// Path inside the archive, as stored.
    pub name: String,
    /// Uncompressed size, if the decoder reports one.
    pub size: Option<u64>,
    pub is_dir: bool,
}

impl SolidEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
            is_dir: false,
        }
    }
}

/// Decoder for formats that cannot be streamed entry by entry.
///
/// The extractor lists the archive first and checks every entry against the
/// limits; only then is the whole archive unpacked into an empty directory
/// and walked with bounded reads.
pub trait SolidArchiveDecoder: Send + Sync + fmt::Debug {
    /// Lists the entries of `archive` without writing them anywhere.
    fn list(&self, archive: &Path) -> Result<Vec<SolidEntry>, ArchiveError>;

    /// Unpacks `archive` into `destination`.
    fn unpack(&self, archive: &Path, destination: &Path) -> Result<(), ArchiveError>;
}

/// Runs the `lsar` and `unar` command line tools.
#[derive(Debug, Clone)]
pub struct UnarDecoder {
    program: PathBuf,
    lister: PathBuf,
}

impl UnarDecoder {
    /// Creates a decoder that invokes `program` instead of `unar` on `PATH`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            lister: PathBuf::from("lsar"),
        }
    }

    /// Invokes `lister` instead of `lsar` on `PATH` for listings.
    pub fn with_lister(mut self, lister: impl Into<PathBuf>) -> Self {
        self.lister = lister.into();
        self
    }
}

impl Default for UnarDecoder {
    fn default() -> Self {
        Self::new("unar")
    }
}

impl SolidArchiveDecoder for UnarDecoder {
    fn list(&self, archive: &Path) -> Result<Vec<SolidEntry>, ArchiveError> {
        let mut command = Command::new(&self.lister);
        command.arg("-j").arg(archive);
        let stdout = run(&self.lister, command)?;

        let listing: LsarListing = serde_json::from_slice(&stdout)
            .map_err(|err| ArchiveError::Decode(format!("unreadable archive listing: {err}")))?;

        Ok(listing
            .contents
            .into_iter()
            .map(|entry| SolidEntry {
                is_dir: entry.is_directory || entry.file_type.as_deref() == Some("Directory"),
                name: entry.name,
                size: entry.size,
            })
            .collect())
    }

    fn unpack(&self, archive: &Path, destination: &Path) -> Result<(), ArchiveError> {
        let mut command = Command::new(&self.program);
        command
            .arg("-q")
            .arg("-o")
            .arg(destination)
            .arg("-D")
            .arg("-f")
            .arg(archive);
        run(&self.program, command).map(drop)
    }
}

/// Runs `command` and returns its stdout, classifying failures.
fn run(program: &Path, mut command: Command) -> Result<Vec<u8>, ArchiveError> {
    let program = program.display().to_string();
    let output = command.output().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => ArchiveError::DecoderUnavailable {
            program: program.clone(),
        },
        _ => ArchiveError::Io(err),
    })?;

    if output.status.success() {
        return Ok(output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };

    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("password") || lowered.contains("encrypted") {
        return Err(ArchiveError::Decode("archive is password protected".into()));
    }

    Err(ArchiveError::Decode(format!(
        "{program} exited with {}: {detail}",
        output.status
    )))
}

#[derive(Deserialize)]
struct LsarListing {
    #[serde(rename = "lsarContents", default)]
    contents: Vec<LsarEntry>,
}

#[derive(Deserialize)]
struct LsarEntry {
    #[serde(rename = "XADFileName")]
    name: String,
    #[serde(rename = "XADFileSize")]
    size: Option<u64>,
    #[serde(rename = "XADIsDirectory", default, deserialize_with = "flag")]
    is_directory: bool,
    #[serde(rename = "XADFileType")]
    file_type: Option<String>,
}

/// `lsar` writes booleans either as JSON booleans or as 0/1.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(value) => value,
        serde_json::Value::Number(value) => value.as_u64().is_some_and(|n| n != 0),
        _ => false,
    })
}

pub(super) fn extract(
    bytes: &[u8],
    limits: &ArchiveLimits,
    temp_root: &Path,
    decoder: &dyn SolidArchiveDecoder,
) -> Result<Vec<ImageEntry>, ArchiveError> {
    let scratch = scratch_dir(temp_root)?;
    let archive_path = scratch.path().join("upload.rar");
    let output_dir = scratch.path().join("unpacked");
    fs::write(&archive_path, bytes)?;

    let listing = decoder.list(&archive_path)?;
    preflight(&listing, limits)?;

    fs::create_dir(&output_dir)?;
    tracing::debug!(
        target: TRACING_TARGET_ARCHIVE,
        scratch = %scratch.path().display(),
        listed = listing.len(),
        "unpacking rar archive"
    );
    decoder.unpack(&archive_path, &output_dir)?;

    let mut budget = ExtractionBudget::new(limits);
    let mut entries = Vec::new();
    collect(&output_dir, "", &mut budget, &mut entries)?;
    Ok(entries)
}

/// Checks a listing against the limits before anything is written to disk.
///
/// Every listed file lands on disk when unpacked, so all of them count
/// toward the cumulative cap; only images count toward the entry ceiling.
fn preflight(listing: &[SolidEntry], limits: &ArchiveLimits) -> Result<(), ArchiveError> {
    let mut budget = ExtractionBudget::new(limits);

    for entry in listing {
        let Some(name) = normalize_entry_path(&entry.name)? else {
            continue;
        };
        if entry.is_dir {
            continue;
        }

        let Some(size) = entry.size else {
            return Err(ArchiveError::Decode(format!(
                "archive listing has no size for entry '{name}'"
            )));
        };

        if is_image_name(&name) {
            budget.admit()?;
            budget.reserve_entry(&name, size)?;
        } else {
            budget.charge_skipped(size)?;
        }
    }

    Ok(())
}

/// Walks an unpacked tree in name order, reading image files under budget.
fn collect(
    dir: &Path,
    prefix: &str,
    budget: &mut ExtractionBudget<'_>,
    entries: &mut Vec<ImageEntry>,
) -> Result<(), ArchiveError> {
    let mut children = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|child| child.file_name());

    for child in children {
        let file_name = child.file_name().to_string_lossy().into_owned();
        let raw_name = if prefix.is_empty() {
            file_name
        } else {
            format!("{prefix}/{file_name}")
        };
        let Some(name) = normalize_entry_path(&raw_name)? else {
            continue;
        };

        // Symlinks are never followed.
        let file_type = child.file_type()?;
        if file_type.is_dir() {
            collect(&child.path(), &name, budget, entries)?;
            continue;
        }
        if !file_type.is_file() || !is_image_name(&name) {
            continue;
        }

        budget.admit()?;
        let declared = child.metadata()?.len();
        let file = fs::File::open(child.path())?;
        let data = budget.read_entry(&name, Some(declared), file)?;
        entries.push(ImageEntry::from_archive(name, data));
    }

    Ok(())
}
