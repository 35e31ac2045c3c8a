//! Application state and dependency injection.

use std::sync::Arc;

use lumen_core::recognize::Recognizer;
use lumen_core::{Pipeline, PipelineConfig};

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection). Cloning is cheap
/// and every clone shares the same recognition gate, so the concurrency limit
/// holds across all in-flight requests.
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Debug, Clone)]
pub struct ServiceState {
    pipeline: Pipeline,
}

impl ServiceState {
    /// Wraps an already configured pipeline.
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Builds the pipeline from `config` around `recognizer`.
    pub fn from_config(config: PipelineConfig, recognizer: Arc<dyn Recognizer>) -> Self {
        Self::new(Pipeline::new(config, recognizer))
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(pipeline: Pipeline);
