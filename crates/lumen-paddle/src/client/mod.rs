//! PaddleOCR serving client.

mod pd_client;
mod pd_config;
mod response;

pub use pd_client::PdClient;
pub use pd_config::PdConfig;
pub use response::OcrResponse;
