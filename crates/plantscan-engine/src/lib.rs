pub mod gemini;
pub mod image_prep;
pub mod pipeline;
pub mod rate_gate;
pub mod settings;

use std::sync::Arc;

use anyhow::Result;
use plantscan_contracts::history::HistoryStore;

pub use gemini::{AnalysisClient, GeminiConfig, HttpTransport, Transport, TransportResponse};
pub use image_prep::{normalize, normalize_with, ImagePayload, NormalizeOptions};
pub use pipeline::Pipeline;
pub use rate_gate::{Clock, ManualClock, RateGate, SystemClock, MIN_INTERVAL};
pub use settings::Settings;

/// Wires the production pipeline from settings: system clock, HTTP transport
/// and the configured history file.
pub fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let gate = Arc::new(RateGate::with_interval(
        Arc::new(SystemClock),
        settings.min_interval,
    ));
    let client = AnalysisClient::new(settings.gemini_config()?, gate, settings.request_timeout);
    Ok(Pipeline::new(
        client,
        HistoryStore::new(&settings.history_path),
    ))
}
