//! Batch text extraction from uploaded archives and images.

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use lumen_core::{ArchiveUpload, BatchReport, BatchRequest, ImageUpload, Pipeline, PipelineConfig};

use crate::TRACING_TARGET_HANDLER;
use crate::handler::{Error, ErrorKind, Result};
use crate::service::ServiceState;

/// Room for multipart boundaries and part headers on top of the payload caps.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Form field carrying the archive.
const ARCHIVE_FIELD: &str = "archive";

/// Form fields accepted for direct image uploads.
const IMAGE_FIELDS: [&str; 3] = ["images", "images[]", "image"];

/// Runs one OCR batch over a multipart upload.
///
/// Returns `200` with the report whenever the batch ran, even if every image
/// failed. Only batch-fatal problems produce an error status.
#[tracing::instrument(target = TRACING_TARGET_HANDLER, skip_all)]
async fn extract_text(
    State(pipeline): State<Pipeline>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchReport>> {
    let mut multipart = multipart.map_err(|rejection| {
        ErrorKind::BadRequest
            .with_message("Expected a multipart/form-data body")
            .with_context(rejection.body_text())
    })?;

    let request = read_batch_request(&mut multipart, pipeline.config()).await?;
    let report = pipeline.process(request).await?;

    tracing::info!(
        target: TRACING_TARGET_HANDLER,
        status = ?report.status,
        total = report.total_images,
        successful = report.successful,
        failed = report.failed,
        processing_time = report.processing_time,
        "batch completed"
    );

    Ok(Json(report))
}

/// Collects the archive and direct images of one form, enforcing upload caps.
async fn read_batch_request(
    multipart: &mut Multipart,
    config: &PipelineConfig,
) -> Result<BatchRequest> {
    let mut request = BatchRequest::new();
    let mut direct_bytes: u64 = 0;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            tracing::debug!(target: TRACING_TARGET_HANDLER, "skipping unnamed field");
            continue;
        };

        if name == ARCHIVE_FIELD {
            if request.archive.is_some() {
                return Err(ErrorKind::BadRequest
                    .with_message("Only one archive may be uploaded per request"));
            }

            let filename = field.file_name().unwrap_or_default().to_owned();
            let bytes = read_capped(field, config.max_archive_size, ErrorKind::ArchiveTooLarge)
                .await
                .map_err(|error| error.with_resource(filename.clone()))?;

            tracing::debug!(
                target: TRACING_TARGET_HANDLER,
                filename = %filename,
                size = bytes.len(),
                "received archive"
            );
            request = request.with_archive(ArchiveUpload::new(filename, bytes));
        } else if IMAGE_FIELDS.contains(&name.as_str()) {
            let filename = match field.file_name() {
                Some(filename) if !filename.is_empty() => filename.to_owned(),
                _ => format!("image_{}", request.images.len() + 1),
            };

            let remaining = config.max_upload_size.saturating_sub(direct_bytes);
            let cap = config.max_image_bytes.min(remaining);
            let bytes = read_capped(field, cap, ErrorKind::PayloadTooLarge)
                .await
                .map_err(|error| error.with_resource(filename.clone()))?;

            direct_bytes += bytes.len() as u64;
            tracing::debug!(
                target: TRACING_TARGET_HANDLER,
                filename = %filename,
                size = bytes.len(),
                "received image"
            );
            request = request.with_image(ImageUpload::new(filename, bytes));
        } else {
            tracing::debug!(
                target: TRACING_TARGET_HANDLER,
                field = %name,
                "skipping unknown field"
            );
        }
    }

    Ok(request)
}

/// Reads a field chunk by chunk, failing as soon as it grows past `cap` bytes.
async fn read_capped(mut field: Field<'_>, cap: u64, exceeded: ErrorKind) -> Result<Vec<u8>> {
    let mut data = Vec::new();

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if (data.len() + chunk.len()) as u64 > cap {
            return Err(exceeded.with_message(format!("The limit is {cap} bytes")));
        }
        data.extend_from_slice(&chunk);
    }

    Ok(data)
}

fn multipart_error(error: MultipartError) -> Error<'static> {
    let kind = match error.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ErrorKind::PayloadTooLarge,
        _ => ErrorKind::BadRequest,
    };

    tracing::warn!(
        target: TRACING_TARGET_HANDLER,
        error = %error,
        "failed to read multipart body"
    );
    kind.with_context(error.body_text())
}

/// Upper bound for a whole request body: one archive plus direct images.
fn body_limit(config: &PipelineConfig) -> usize {
    let limit = config
        .max_archive_size
        .saturating_add(config.max_upload_size)
        .saturating_add(MULTIPART_OVERHEAD);
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// Returns a [`Router`] with the extraction route.
pub fn routes(config: &PipelineConfig) -> Router<ServiceState> {
    Router::new().route(
        "/api/v1/ocr/extract",
        post(extract_text).layer(DefaultBodyLimit::max(body_limit(config))),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use lumen_core::fixtures;
    use lumen_core::recognize::MockRecognizer;
    use lumen_core::{BatchStatus, PipelineConfig};

    use crate::handler::ErrorResponse;
    use crate::handler::test::{create_test_server, create_test_server_with_config};

    const EXTRACT: &str = "/api/v1/ocr/extract";

    fn image_part(filename: &str, bytes: Vec<u8>) -> Part {
        Part::bytes(bytes).file_name(filename).mime_type("image/png")
    }

    fn archive_part(filename: &str, bytes: Vec<u8>) -> Part {
        Part::bytes(bytes)
            .file_name(filename)
            .mime_type("application/octet-stream")
    }

    #[tokio::test]
    async fn direct_images_are_recognized_in_order() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new().with_text("hello"))?;

        let form = MultipartForm::new()
            .add_part("images", image_part("b.png", fixtures::png(8, 8)))
            .add_part("images", image_part("a.jpg", fixtures::jpeg(8, 8)));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status_ok();

        let report = response.json::<lumen_core::BatchReport>();
        assert_eq!(report.status, BatchStatus::Success);
        assert_eq!(report.total_images, 2);
        let names: Vec<_> = report.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["b.png", "a.jpg"]);
        assert!(report.results.iter().all(|r| r.text == "hello"));
        Ok(())
    }

    #[tokio::test]
    async fn archive_with_corrupt_entry_is_partial() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new())?;

        let png = fixtures::png(4, 4);
        let corrupt = fixtures::corrupt_png();
        let archive = fixtures::zip_archive(&[("ok.png", &png), ("bad.png", &corrupt)]);
        let form = MultipartForm::new().add_part("archive", archive_part("scans.zip", archive));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status_ok();

        let report = response.json::<lumen_core::BatchReport>();
        assert_eq!(report.status, BatchStatus::Partial);
        assert_eq!((report.successful, report.failed), (1, 1));
        assert_eq!(report.errors[0].filename, "bad.png");
        assert_eq!(report.errors[0].reason, "corrupt");
        Ok(())
    }

    #[tokio::test]
    async fn failed_batch_still_returns_report() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new())?;

        let form = MultipartForm::new()
            .add_part("images[]", image_part("broken.png", fixtures::corrupt_png()));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status_ok();

        let report = response.json::<lumen_core::BatchReport>();
        assert_eq!(report.status, BatchStatus::Failure);
        assert_eq!(report.failed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn empty_form_is_rejected() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new())?;

        let form = MultipartForm::new().add_text("note", "nothing attached");
        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let error = response.json::<ErrorResponse<'static>>();
        assert_eq!(error.name, "no_input_provided");
        Ok(())
    }

    #[tokio::test]
    async fn non_multipart_body_is_bad_request() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new())?;

        let response = server.post(EXTRACT).text("plain text").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorResponse<'static>>().name, "bad_request");
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_archive_is_rejected() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new())?;

        let form =
            MultipartForm::new().add_part("archive", archive_part("scans.7z", b"7z\xbc\xaf".to_vec()));
        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let error = response.json::<ErrorResponse<'static>>();
        assert_eq!(error.name, "unsupported_format");
        assert_eq!(error.resource.as_deref(), Some("scans.7z"));
        Ok(())
    }

    #[tokio::test]
    async fn traversal_entry_is_unprocessable() -> anyhow::Result<()> {
        let recognizer = MockRecognizer::new();
        let server = create_test_server(recognizer.clone())?;

        let archive = fixtures::tar_with_raw_name("../../etc/passwd", b"root:x:0:0");
        let form = MultipartForm::new().add_part("archive", archive_part("evil.tar", archive));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<ErrorResponse<'static>>().name, "unsafe_content");
        assert_eq!(recognizer.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn archive_without_images_is_unprocessable() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new())?;

        let archive = fixtures::zip_archive(&[("readme.txt", b"no scans here")]);
        let form = MultipartForm::new().add_part("archive", archive_part("docs.zip", archive));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<ErrorResponse<'static>>().name, "no_images_found");
        Ok(())
    }

    #[tokio::test]
    async fn oversized_archive_is_rejected_while_uploading() -> anyhow::Result<()> {
        let config = PipelineConfig::builder()
            .with_max_archive_size(1024u64)
            .with_max_entry_size(1024u64)
            .build()?;
        let server = create_test_server_with_config(config, MockRecognizer::new())?;

        let form = MultipartForm::new().add_part("archive", archive_part("big.zip", vec![0; 4096]));
        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);

        let error = response.json::<ErrorResponse<'static>>();
        assert_eq!(error.name, "archive_too_large");
        assert_eq!(error.resource.as_deref(), Some("big.zip"));
        Ok(())
    }

    #[tokio::test]
    async fn direct_uploads_share_one_budget() -> anyhow::Result<()> {
        let png = fixtures::png(16, 16);
        let config = PipelineConfig::builder()
            .with_max_upload_size(png.len() as u64 + 10)
            .build()?;
        let server = create_test_server_with_config(config, MockRecognizer::new())?;

        let form = MultipartForm::new()
            .add_part("images", image_part("one.png", png.clone()))
            .add_part("images", image_part("two.png", png));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);

        let error = response.json::<ErrorResponse<'static>>();
        assert_eq!(error.name, "payload_too_large");
        assert_eq!(error.resource.as_deref(), Some("two.png"));
        Ok(())
    }

    #[tokio::test]
    async fn too_many_images_is_rejected() -> anyhow::Result<()> {
        let config = PipelineConfig::builder()
            .with_max_images_per_request(1usize)
            .build()?;
        let server = create_test_server_with_config(config, MockRecognizer::new())?;

        let form = MultipartForm::new()
            .add_part("image", image_part("one.png", fixtures::png(2, 2)))
            .add_part("image", image_part("two.png", fixtures::png(2, 2)));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorResponse<'static>>().name, "too_many_images");
        Ok(())
    }

    #[tokio::test]
    async fn second_archive_is_rejected() -> anyhow::Result<()> {
        let server = create_test_server(MockRecognizer::new())?;

        let png = fixtures::png(2, 2);
        let archive = fixtures::zip_archive(&[("a.png", &png)]);
        let form = MultipartForm::new()
            .add_part("archive", archive_part("a.zip", archive.clone()))
            .add_part("archive", archive_part("b.zip", archive));

        let response = server.post(EXTRACT).multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        Ok(())
    }
}
