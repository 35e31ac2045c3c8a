//! Bounded-concurrency recognition over a batch of accepted images.
//!
//! A single [`Semaphore`] gates every call made through one executor, so the
//! bound holds across all requests that share it. Each call runs in its own
//! task that owns its permit; the permit is released when that task ends,
//! whatever the outcome. Waiting for a call may time out, the call itself is
//! never interrupted.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use crate::TRACING_TARGET_BATCH;
use crate::entry::ImageEntry;
use crate::recognize::{Recognition, RecognizeError, Recognizer};
use crate::validate::RejectReason;

/// Why one image produced no text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("recognition failed: {0}")]
    EngineError(String),

    #[error("recognition timed out")]
    Timeout,

    #[error(transparent)]
    ValidationRejected(RejectReason),
}

impl FailureReason {
    /// Returns the per-item reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EngineError(_) => "engine_error",
            Self::Timeout => "timeout",
            Self::ValidationRejected(reason) => reason.code(),
        }
    }

    /// Returns a human readable detail, if there is one.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::EngineError(detail) => Some(detail.clone()),
            Self::Timeout => None,
            Self::ValidationRejected(reason) => Some(reason.to_string()),
        }
    }
}

/// Recognition outcome for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOutcome {
    pub filename: String,
    pub result: Result<Recognition, FailureReason>,
}

impl RecognitionOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs a [`Recognizer`] across images with a process-wide concurrency bound.
#[derive(Clone)]
pub struct BatchExecutor {
    recognizer: Arc<dyn Recognizer>,
    gate: Arc<Semaphore>,
    limit: NonZeroUsize,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("limit", &self.limit)
            .field("available", &self.gate.available_permits())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    /// Creates an executor with `limit` permits and an optional per-item timeout.
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        limit: NonZeroUsize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            recognizer,
            gate: Arc::new(Semaphore::new(limit.get())),
            limit,
            timeout,
        }
    }

    #[inline]
    pub fn recognizer(&self) -> &Arc<dyn Recognizer> {
        &self.recognizer
    }

    #[inline]
    pub fn concurrency_limit(&self) -> usize {
        self.limit.get()
    }

    /// Permits not currently held by a running call.
    #[inline]
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Recognizes every entry and returns outcomes in input order.
    ///
    /// One item failing, panicking or timing out never affects the others.
    pub async fn execute(&self, entries: Vec<ImageEntry>) -> Vec<RecognitionOutcome> {
        if entries.is_empty() {
            return Vec::new();
        }

        let total = entries.len();
        let filenames: Vec<String> = entries.iter().map(|e| e.filename().to_owned()).collect();
        let mut slots: Vec<Option<Result<Recognition, FailureReason>>> =
            (0..total).map(|_| None).collect();
        let mut waiters = JoinSet::new();

        tracing::debug!(
            target: TRACING_TARGET_BATCH,
            total,
            limit = self.limit.get(),
            "starting batch"
        );

        for (index, entry) in entries.into_iter().enumerate() {
            let permit = match Arc::clone(&self.gate).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    slots[index] = Some(Err(FailureReason::EngineError(
                        "concurrency gate is closed".into(),
                    )));
                    continue;
                }
            };

            let recognizer = Arc::clone(&self.recognizer);
            let call = tokio::spawn(async move {
                let _permit = permit;
                recognizer.recognize(entry.into_bytes()).await
            });

            let timeout = self.timeout;
            waiters.spawn(async move { (index, await_call(call, timeout).await) });
        }

        while let Some(joined) = waiters.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => {
                    tracing::error!(
                        target: TRACING_TARGET_BATCH,
                        error = %err,
                        "recognition waiter failed"
                    );
                }
            }
        }

        let outcomes: Vec<_> = slots
            .into_iter()
            .zip(filenames)
            .map(|(slot, filename)| {
                let result = slot.unwrap_or_else(|| {
                    Err(FailureReason::EngineError(
                        "recognition produced no result".into(),
                    ))
                });
                if let Err(reason) = &result {
                    tracing::warn!(
                        target: TRACING_TARGET_BATCH,
                        filename = %filename,
                        reason = reason.code(),
                        "recognition failed"
                    );
                }
                RecognitionOutcome { filename, result }
            })
            .collect();

        tracing::debug!(
            target: TRACING_TARGET_BATCH,
            total,
            successful = outcomes.iter().filter(|o| o.is_success()).count(),
            "batch finished"
        );

        outcomes
    }
}

async fn await_call(
    call: JoinHandle<Result<Recognition, RecognizeError>>,
    timeout: Option<Duration>,
) -> Result<Recognition, FailureReason> {
    // Dropping the handle on timeout detaches the call, it keeps its permit.
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(joined) => joined,
            Err(_) => return Err(FailureReason::Timeout),
        },
        None => call.await,
    };

    match joined {
        Ok(Ok(recognition)) => Ok(clamp_confidence(recognition)),
        Ok(Err(err)) => Err(FailureReason::EngineError(err.to_string())),
        Err(err) if err.is_panic() => Err(FailureReason::EngineError(
            "recognizer panicked".into(),
        )),
        Err(err) => Err(FailureReason::EngineError(err.to_string())),
    }
}

fn clamp_confidence(mut recognition: Recognition) -> Recognition {
    recognition.confidence = if recognition.confidence.is_nan() {
        0.0
    } else {
        recognition.confidence.clamp(0.0, 1.0)
    };
    recognition
}
