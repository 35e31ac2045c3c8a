//! Aggregation of per-item outcomes into the batch report.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

use crate::batch::{FailureReason, RecognitionOutcome};
use crate::validate::{ValidationOutcome, ValidationVerdict};

/// Overall status of a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    /// Every image produced text.
    Success,
    /// Some images failed.
    Partial,
    /// No image produced text.
    Failure,
}

impl BatchStatus {
    /// Derives the status from the success and failure counts.
    pub fn from_counts(successful: usize, failed: usize) -> Self {
        if successful == 0 && failed > 0 {
            Self::Failure
        } else if failed > 0 {
            Self::Partial
        } else {
            Self::Success
        }
    }
}

/// Text recognized in one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub filename: String,
    pub text: String,
    pub confidence: f64,
}

/// An image that produced no text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFailure {
    pub filename: String,
    /// Per-item reason code.
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The response for one batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub total_images: usize,
    pub successful: usize,
    pub failed: usize,
    /// Wall-clock seconds from intake to aggregation.
    pub processing_time: f64,
    pub results: Vec<ImageResult>,
    pub errors: Vec<ImageFailure>,
}

/// Combines validation verdicts and recognition outcomes in input order.
///
/// `outcomes` must hold one entry per accepted verdict, in the same order;
/// accepted verdicts left without an outcome are reported as engine errors.
pub fn aggregate(
    verdicts: Vec<ValidationVerdict>,
    outcomes: Vec<RecognitionOutcome>,
    elapsed: Duration,
) -> BatchReport {
    let mut outcomes = outcomes.into_iter();
    let mut results = Vec::new();
    let mut errors = Vec::new();

    for verdict in verdicts {
        let filename = verdict.entry.filename().to_owned();
        let result = match verdict.outcome {
            ValidationOutcome::Rejected(reason) => Err(FailureReason::ValidationRejected(reason)),
            ValidationOutcome::Accepted { .. } => match outcomes.next() {
                Some(outcome) => outcome.result,
                None => Err(FailureReason::EngineError(
                    "no recognition outcome for accepted image".into(),
                )),
            },
        };

        match result {
            Ok(recognition) => results.push(ImageResult {
                filename,
                text: recognition.text,
                confidence: round(f64::from(recognition.confidence), 4),
            }),
            Err(reason) => errors.push(ImageFailure {
                filename,
                reason: reason.code().to_owned(),
                detail: reason.detail(),
            }),
        }
    }

    let successful = results.len();
    let failed = errors.len();

    BatchReport {
        status: BatchStatus::from_counts(successful, failed),
        total_images: successful + failed,
        successful,
        failed,
        processing_time: round(elapsed.as_secs_f64(), 2),
        results,
        errors,
    }
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
