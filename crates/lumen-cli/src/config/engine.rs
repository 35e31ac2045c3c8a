//! Recognition engine configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{ArgAction, Args};
use lumen_core::recognize::{MockRecognizer, Recognizer, TextCleanup};
use lumen_paddle::{PdClient, PdConfig};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// PaddleOCR client settings, or the mock engine.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the PaddleOCR serving endpoint.
    #[arg(long = "ocr-endpoint", env = "OCR_ENDPOINT", default_value = "http://127.0.0.1:8080")]
    pub endpoint: String,

    /// Recognition languages; the first one is sent to the engine.
    #[arg(
        long = "ocr-languages",
        env = "OCR_LANGUAGES",
        value_delimiter = ',',
        default_value = "en"
    )]
    pub languages: Vec<String>,

    /// Asks the engine to run on GPU.
    #[arg(
        long = "ocr-gpu-enabled",
        env = "OCR_GPU_ENABLED",
        default_value_t = false,
        action = ArgAction::Set
    )]
    pub gpu_enabled: bool,

    /// HTTP timeout for a single engine call, in seconds.
    #[arg(long = "ocr-client-timeout", env = "OCR_CLIENT_TIMEOUT", default_value_t = 30)]
    pub client_timeout: u64,

    /// Retries for transient engine failures.
    #[arg(long = "ocr-max-retries", env = "OCR_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Serves requests with the deterministic mock recognizer instead of PaddleOCR.
    #[arg(long = "mock-engine", env = "OCR_MOCK")]
    #[serde(default)]
    pub mock_engine: bool,

    /// Post-processing of recognized lines.
    #[clap(flatten)]
    pub cleanup: TextCleanup,
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mock_engine {
            return Ok(());
        }

        if self.languages.iter().all(|lang| lang.trim().is_empty()) {
            return Err(anyhow!("at least one OCR language is required"));
        }

        if self.client_timeout == 0 {
            return Err(anyhow!("OCR client timeout must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.cleanup.min_confidence) {
            return Err(anyhow!(
                "OCR minimum confidence {} must be between 0.0 and 1.0",
                self.cleanup.min_confidence
            ));
        }

        Ok(())
    }

    /// Builds the recognizer shared by every request.
    pub fn create_recognizer(&self) -> anyhow::Result<Arc<dyn Recognizer>> {
        if self.mock_engine {
            tracing::warn!(
                target: TRACING_TARGET_CONFIG,
                "mock OCR engine enabled, results are synthetic"
            );
            return Ok(Arc::new(MockRecognizer::new()));
        }

        let config = PdConfig::new(&self.endpoint)
            .with_context(|| format!("invalid OCR endpoint '{}'", self.endpoint))?
            .with_timeout(Duration::from_secs(self.client_timeout))
            .with_max_retries(self.max_retries)
            .with_languages(self.languages.iter().map(String::as_str))
            .with_gpu(self.gpu_enabled)
            .with_cleanup(self.cleanup.clone());

        let client = PdClient::new(config).context("failed to build PaddleOCR client")?;
        Ok(Arc::new(client))
    }

    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            endpoint = %self.endpoint,
            languages = ?self.languages,
            gpu_enabled = self.gpu_enabled,
            max_retries = self.max_retries,
            mock_engine = self.mock_engine,
            paragraph_mode = self.cleanup.paragraph_mode,
            min_confidence = self.cleanup.min_confidence,
            "OCR engine configuration"
        );
    }
}
