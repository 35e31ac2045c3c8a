use lumen_core::recognize::TextLine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Request body for the `/ocr` endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OcrRequest<'a> {
    pub file: String,
    /// `1` marks the payload as an image, `0` would be a PDF.
    pub file_type: u8,
    pub lang: &'a str,
    pub use_gpu: bool,
}

/// Envelope returned by PaddleX serving pipelines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    #[serde(default)]
    pub log_id: Option<String>,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub result: Option<OcrPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrPayload {
    #[serde(default)]
    pub ocr_results: Vec<PageResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    #[serde(default)]
    pub pruned_result: PrunedResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrunedResult {
    #[serde(default)]
    pub rec_texts: Vec<String>,
    #[serde(default)]
    pub rec_scores: Vec<f32>,
}

impl OcrResponse {
    /// Flattens every page into recognized lines, in reading order.
    ///
    /// A non-zero `errorCode` or a missing `result` is an error. Texts and
    /// scores must pair up one to one.
    pub fn into_lines(self, status: u16) -> Result<Vec<TextLine>> {
        if self.error_code != 0 {
            let message = self
                .error_msg
                .unwrap_or_else(|| format!("error code {}", self.error_code));
            return Err(Error::api(status, message));
        }

        let payload = self
            .result
            .ok_or_else(|| Error::invalid_response("response has no result"))?;

        let mut lines = Vec::new();
        for (page, result) in payload.ocr_results.into_iter().enumerate() {
            let PrunedResult {
                rec_texts,
                rec_scores,
            } = result.pruned_result;

            if rec_texts.len() != rec_scores.len() {
                return Err(Error::invalid_response(format!(
                    "page {page} has {} texts but {} scores",
                    rec_texts.len(),
                    rec_scores.len()
                )));
            }

            lines.extend(
                rec_texts
                    .into_iter()
                    .zip(rec_scores)
                    .map(|(text, score)| TextLine::new(text, score)),
            );
        }

        Ok(lines)
    }
}
