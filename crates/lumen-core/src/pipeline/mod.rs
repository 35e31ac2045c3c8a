//! Request-level orchestration.
//!
//! A [`Pipeline`] is built once at startup and shared by every request. For
//! each [`BatchRequest`] it runs intake, extraction, merge, validation,
//! recognition and aggregation, in that order. Extraction and validation run
//! on the blocking pool and finish before any recognition starts.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::spawn_blocking;
use tokio::time::Instant;

use crate::TRACING_TARGET_PIPELINE;
use crate::archive::{ArchiveExtractor, ArchiveFormat, SolidArchiveDecoder};
use crate::batch::BatchExecutor;
use crate::config::PipelineConfig;
use crate::entry::{ImageEntry, unique_filenames};
use crate::error::{Error, Result};
use crate::recognize::Recognizer;
use crate::report::{BatchReport, aggregate};
use crate::validate::ImageValidator;

/// An uploaded archive.
#[derive(Debug, Clone)]
pub struct ArchiveUpload {
    pub filename: String,
    pub bytes: Bytes,
}

impl ArchiveUpload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// A directly uploaded image.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Bytes,
}

impl ImageUpload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Everything a client submitted in one request.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub archive: Option<ArchiveUpload>,
    pub images: Vec<ImageUpload>,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, archive: ArchiveUpload) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_image(mut self, image: ImageUpload) -> Self {
        self.images.push(image);
        self
    }

    /// Returns whether the request carries no input at all.
    pub fn is_empty(&self) -> bool {
        self.archive.is_none() && self.images.is_empty()
    }
}

/// The OCR batch pipeline.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    extractor: ArchiveExtractor,
    validator: ImageValidator,
    executor: BatchExecutor,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline around `recognizer`.
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn Recognizer>) -> Self {
        let extractor = ArchiveExtractor::new(config.temp_dir.clone());
        let validator = ImageValidator::new(config.image_limits());
        let executor = BatchExecutor::new(
            recognizer,
            config.max_concurrent_recognition,
            config.recognition_timeout(),
        );

        Self {
            config: Arc::new(config),
            extractor,
            validator,
            executor,
        }
    }

    /// Replaces the decoder used for RAR archives.
    pub fn with_rar_decoder(mut self, decoder: impl SolidArchiveDecoder + 'static) -> Self {
        self.extractor = self.extractor.with_rar_decoder(decoder);
        self
    }

    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    pub fn recognizer(&self) -> &Arc<dyn Recognizer> {
        self.executor.recognizer()
    }

    #[inline]
    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    /// Processes one request into a report.
    ///
    /// Only batch-fatal problems are errors; per-image failures are part of
    /// the report. If the returned future is dropped, recognition calls that
    /// already started run to completion in the background.
    #[tracing::instrument(
        target = TRACING_TARGET_PIPELINE,
        skip_all,
        fields(
            archive = request.archive.as_ref().map(|a| a.filename.as_str()),
            images = request.images.len(),
        )
    )]
    pub async fn process(&self, request: BatchRequest) -> Result<BatchReport> {
        let started = Instant::now();

        if request.is_empty() {
            return Err(Error::NoInputProvided);
        }

        let BatchRequest { archive, images } = request;

        let mut entries = match archive {
            Some(upload) => self.extract(upload).await?,
            None => Vec::new(),
        };
        entries.extend(
            images
                .into_iter()
                .map(|image| ImageEntry::direct(image.filename, image.bytes)),
        );

        let entries = unique_filenames(entries);

        let max = self.config.max_images_per_request;
        if entries.len() > max {
            return Err(Error::TooManyImages {
                count: entries.len(),
                max,
            });
        }

        let validator = self.validator.clone();
        let verdicts = spawn_blocking(move || validator.validate_all(entries)).await?;

        let accepted: Vec<ImageEntry> = verdicts
            .iter()
            .filter(|verdict| verdict.is_accepted())
            .map(|verdict| verdict.entry.clone())
            .collect();

        let outcomes = self.executor.execute(accepted).await;
        let report = aggregate(verdicts, outcomes, started.elapsed());

        tracing::info!(
            target: TRACING_TARGET_PIPELINE,
            status = report.status.as_ref(),
            total = report.total_images,
            successful = report.successful,
            failed = report.failed,
            processing_time = report.processing_time,
            "batch processed"
        );

        Ok(report)
    }

    async fn extract(&self, upload: ArchiveUpload) -> Result<Vec<ImageEntry>> {
        let extractor = self.extractor.clone();
        let limits = self.config.archive_limits();

        let entries = spawn_blocking(move || {
            let format = ArchiveFormat::detect(&upload.filename, &upload.bytes)?;
            extractor.extract(&upload.bytes, format, &limits)
        })
        .await??;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::archive::{ArchiveError, UnsafeReason};
    use crate::error::ErrorCategory;
    use crate::fixtures;
    use crate::recognize::MockRecognizer;
    use crate::report::BatchStatus;

    fn pipeline(mock: &MockRecognizer, root: &tempfile::TempDir) -> Pipeline {
        let config = PipelineConfig::builder()
            .with_temp_dir(root.path())
            .with_max_images_per_request(5usize)
            .build()
            .unwrap();
        Pipeline::new(config, Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn empty_request_is_rejected_without_report() {
        let mock = MockRecognizer::new();
        let root = tempfile::tempdir().unwrap();
        let err = pipeline(&mock, &root)
            .process(BatchRequest::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoInputProvided));
        assert_eq!(err.category(), ErrorCategory::Intake);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn one_corrupt_one_valid_is_partial() {
        let mock = MockRecognizer::new().with_text("hello");
        let root = tempfile::tempdir().unwrap();
        let png = fixtures::png(16, 16);
        let corrupt = fixtures::corrupt_png();
        let archive = fixtures::zip_archive(&[("good.png", &png), ("bad.png", &corrupt)]);

        let report = pipeline(&mock, &root)
            .process(BatchRequest::new().with_archive(ArchiveUpload::new("scans.zip", archive)))
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::Partial);
        assert_eq!((report.successful, report.failed), (1, 1));
        assert_eq!(report.results[0].filename, "good.png");
        assert_eq!(report.results[0].text, "hello");
        assert_eq!(report.errors[0].filename, "bad.png");
        assert_eq!(report.errors[0].reason, "corrupt");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn archive_entries_come_before_direct_images() {
        let mock = MockRecognizer::new();
        let root = tempfile::tempdir().unwrap();
        let png = fixtures::png(8, 8);
        let archive = fixtures::tar_gz(&[("inner/a.png", &png), ("inner/b.jpg", &fixtures::jpeg(8, 8))]);

        let request = BatchRequest::new()
            .with_image(ImageUpload::new("direct-1.png", png.clone()))
            .with_archive(ArchiveUpload::new("bundle.tgz", archive))
            .with_image(ImageUpload::new("direct-2.gif", b"GIF89a".to_vec()));

        let report = pipeline(&mock, &root).process(request).await.unwrap();

        let ok: Vec<_> = report.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(ok, ["inner/a.png", "inner/b.jpg", "direct-1.png"]);
        assert_eq!(report.errors[0].filename, "direct-2.gif");
        assert_eq!(report.errors[0].reason, "unsupported_format");
        assert_eq!(report.total_images, 4);
        assert_eq!(report.total_images, report.successful + report.failed);
    }

    #[tokio::test]
    async fn bomb_is_rejected_before_validation() {
        let mock = MockRecognizer::new();
        let root = tempfile::tempdir().unwrap();
        let zeros = vec![0u8; 64 * 1024];
        let archive = fixtures::zip_archive(&[("a.png", &zeros), ("b.png", &zeros)]);

        let config = PipelineConfig::builder()
            .with_temp_dir(root.path())
            .with_max_entry_size(12 * 1024u64)
            .with_max_total_uncompressed(12 * 1024u64)
            .build()
            .unwrap();
        let err = Pipeline::new(config, Arc::new(mock.clone()))
            .process(BatchRequest::new().with_archive(ArchiveUpload::new("bomb.zip", archive)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Archive(ArchiveError::UnsafeContent(_))
        ));
        assert_eq!(err.category(), ErrorCategory::Extraction);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn traversal_extracts_nothing() {
        let mock = MockRecognizer::new();
        let root = tempfile::tempdir().unwrap();
        let archive = fixtures::zip_archive(&[("../../etc/passwd", b"root:x:0:0")]);

        let err = pipeline(&mock, &root)
            .process(BatchRequest::new().with_archive(ArchiveUpload::new("evil.zip", archive)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Archive(ArchiveError::UnsafeContent(UnsafeReason::PathTraversal { .. }))
        ));
        assert_eq!(mock.calls(), 0);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn merged_count_is_limited() {
        let mock = MockRecognizer::new();
        let root = tempfile::tempdir().unwrap();
        let png = fixtures::png(2, 2);
        let archive = fixtures::zip_archive(&[("1.png", &png), ("2.png", &png), ("3.png", &png)]);

        let request = (0..3).fold(
            BatchRequest::new().with_archive(ArchiveUpload::new("a.zip", archive)),
            |request, i| request.with_image(ImageUpload::new(format!("{i}.png"), png.clone())),
        );

        let err = pipeline(&mock, &root).process(request).await.unwrap_err();
        assert!(matches!(err, Error::TooManyImages { count: 6, max: 5 }));
        assert_eq!(err.code(), "too_many_images");
    }

    #[tokio::test]
    async fn unsupported_archive_is_an_intake_error() {
        let mock = MockRecognizer::new();
        let root = tempfile::tempdir().unwrap();
        let err = pipeline(&mock, &root)
            .process(BatchRequest::new().with_archive(ArchiveUpload::new("a.7z", b"7z".to_vec())))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "unsupported_format");
        assert_eq!(err.category(), ErrorCategory::Intake);
    }

    #[tokio::test]
    async fn colliding_filenames_stay_disjoint_across_results_and_errors() {
        let mock = MockRecognizer::new();
        let root = tempfile::tempdir().unwrap();
        let png = fixtures::png(8, 8);
        let archive = fixtures::zip_archive(&[("scan.png", &fixtures::corrupt_png())]);

        let request = BatchRequest::new()
            .with_archive(ArchiveUpload::new("pages.zip", archive))
            .with_image(ImageUpload::new("scan.png", png.clone()))
            .with_image(ImageUpload::new("scan.png", fixtures::corrupt_png()))
            .with_image(ImageUpload::new("scan.png", png));

        let report = pipeline(&mock, &root).process(request).await.unwrap();

        let ok: Vec<_> = report.results.iter().map(|r| r.filename.as_str()).collect();
        let failed: Vec<_> = report.errors.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(ok, ["scan (2).png", "scan (4).png"]);
        assert_eq!(failed, ["scan.png", "scan (3).png"]);
        assert!(ok.iter().all(|name| !failed.contains(name)));

        let mut union: Vec<_> = ok.iter().chain(&failed).copied().collect();
        union.sort_unstable();
        assert_eq!(union, ["scan (2).png", "scan (3).png", "scan (4).png", "scan.png"]);
        assert_eq!(report.total_images, 4);
    }

    #[tokio::test]
    async fn all_failures_is_failure_status() {
        let mock = MockRecognizer::new().with_delay(Duration::from_millis(1));
        let root = tempfile::tempdir().unwrap();
        let request = BatchRequest::new()
            .with_image(ImageUpload::new("empty.png", Vec::new()))
            .with_image(ImageUpload::new("text.png", b"plain text".to_vec()));

        let report = pipeline(&mock, &root).process(request).await.unwrap();
        assert_eq!(report.status, BatchStatus::Failure);
        assert_eq!(report.errors[0].reason, "empty_payload");
        assert_eq!(report.errors[1].reason, "unsupported_format");
        assert_eq!(mock.calls(), 0);
    }
}
