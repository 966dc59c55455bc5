use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use plantscan_contracts::analysis::{AnalysisError, AnalysisOutcome};
use plantscan_contracts::report::{normalize_markup, parse_sections};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::image_prep::ImagePayload;
use crate::rate_gate::RateGate;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const TEMPERATURE: f64 = 0.4;
pub const MAX_OUTPUT_TOKENS: u64 = 800;

pub const ANALYSIS_PROMPT: &str = "Analyze this plant for the Philippines.
Format the output using '### ' as a header prefix for each section.
Do not use numbered lists (1. 2. 3.) for the section titles.

Required Sections:
### Common Name (Philippine)
### Scientific Name
### Brief Description
### Uses
### Health Benefits
### Safety Notes";

// Toxicity and medicinal-use answers trip these categories at default thresholds.
const RELAXED_SAFETY_CATEGORIES: &[&str] =
    &["HARM_CATEGORY_HARASSMENT", "HARM_CATEGORY_DANGEROUS_CONTENT"];

const SAFETY_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

const ERROR_REASON_MAX_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one JSON POST. Implementations report transport-level failures as
/// errors and hand back any HTTP status, successful or not.
pub trait Transport: Send + Sync {
    fn post_json(&self, endpoint: &str, api_key: &str, payload: &Value) -> Result<TransportResponse>;
}

pub struct HttpTransport {
    http: HttpClient,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(),
            timeout,
        }
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, endpoint: &str, api_key: &str, payload: &Value) -> Result<TransportResponse> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            // The URL carries the API key; keep it out of messages.
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(reqwest::Error::without_url)
            .context("Gemini response body read failed")?;
        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.api_base.trim().trim_end_matches('/'),
            model_path
        )
    }
}

/// Turns one prepared image into one `AnalysisOutcome`. Nothing is retried;
/// every failure is returned to the caller.
pub struct AnalysisClient {
    config: GeminiConfig,
    gate: Arc<RateGate>,
    transport: Box<dyn Transport>,
}

impl AnalysisClient {
    pub fn new(config: GeminiConfig, gate: Arc<RateGate>, timeout: Duration) -> Self {
        Self::with_transport(config, gate, HttpTransport::new(timeout))
    }

    pub fn with_transport<T: Transport + 'static>(
        config: GeminiConfig,
        gate: Arc<RateGate>,
        transport: T,
    ) -> Self {
        Self {
            config,
            gate,
            transport: Box::new(transport),
        }
    }

    pub fn analyze(&self, payload: ImagePayload) -> AnalysisOutcome {
        if let Err(err) = self.gate.admit() {
            info!(error = %err, "analysis rejected by rate gate");
            return AnalysisOutcome::failure(err);
        }
        match self.request(payload) {
            Ok((raw_text, tokens_used)) => {
                let sections = parse_sections(&raw_text);
                info!(
                    sections = sections.len(),
                    tokens_used = tokens_used.unwrap_or_default(),
                    "analysis succeeded"
                );
                AnalysisOutcome::success(raw_text, sections, tokens_used)
            }
            Err(err) => {
                info!(kind = err.kind(), error = %err, "analysis failed");
                AnalysisOutcome::failure(err)
            }
        }
    }

    fn request(&self, payload: ImagePayload) -> Result<(String, Option<u64>), AnalysisError> {
        let endpoint = self.config.endpoint();
        let body = build_request_payload(&payload);
        debug!(
            endpoint = %endpoint,
            width = payload.width,
            height = payload.height,
            bytes = payload.bytes.len(),
            "sending analysis request"
        );
        let response = self
            .transport
            .post_json(&endpoint, &self.config.api_key, &body)
            .map_err(|err| AnalysisError::Network {
                reason: error_chain_text(&err, ERROR_REASON_MAX_CHARS),
            })?;
        interpret_response(response.status, &response.body)
    }
}

pub fn build_request_payload(payload: &ImagePayload) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": ANALYSIS_PROMPT },
                {
                    "inline_data": {
                        "mime_type": payload.mime_type,
                        "data": payload.base64(),
                    }
                }
            ]
        }],
        "generationConfig": {
            "temperature": TEMPERATURE,
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
        },
        "safetySettings": relaxed_safety_settings(),
    })
}

fn relaxed_safety_settings() -> Vec<Value> {
    RELAXED_SAFETY_CATEGORIES
        .iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": "BLOCK_NONE",
            })
        })
        .collect()
}

/// Maps an HTTP status and body onto the cleaned answer text and token usage.
pub fn interpret_response(status: u16, body: &str) -> Result<(String, Option<u64>), AnalysisError> {
    if !(200..300).contains(&status) {
        return Err(AnalysisError::Api {
            status_code: status,
            reason: api_error_reason(status, body),
        });
    }
    let parsed: Value =
        serde_json::from_str(body).map_err(|err| AnalysisError::MalformedResponse {
            reason: format!("invalid JSON payload: {err}"),
        })?;

    if parsed
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
        .is_some()
    {
        return Err(AnalysisError::SafetyBlocked);
    }

    let Some(candidate) = parsed.pointer("/candidates/0") else {
        return Err(AnalysisError::MalformedResponse {
            reason: "response has no candidates".to_string(),
        });
    };
    let finish_reason = candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if SAFETY_FINISH_REASONS.contains(&finish_reason) {
        return Err(AnalysisError::SafetyBlocked);
    }

    let text = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<&str>>()
                .join("")
        })
        .unwrap_or_default();
    let cleaned = normalize_markup(&text);
    if cleaned.is_empty() {
        return Err(AnalysisError::MalformedResponse {
            reason: format!(
                "candidate has no text (finishReason: {})",
                if finish_reason.is_empty() { "none" } else { finish_reason }
            ),
        });
    }

    let tokens_used = parsed
        .pointer("/usageMetadata/totalTokenCount")
        .and_then(Value::as_u64);
    Ok((cleaned, tokens_used))
}

fn api_error_reason(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(|message| truncate_text(message, ERROR_REASON_MAX_CHARS))
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(|last| last == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
