use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way an analysis call can fail.
///
/// Each variant carries enough detail (wait time, status code, reason) for a
/// caller to render a specific message instead of a generic error.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    #[error("Image encoding failed for {path}: {reason}")]
    ImageEncoding { path: String, reason: String },

    #[error("Please wait {wait_seconds:.1} seconds before analyzing again.")]
    RateLimitExceeded { wait_seconds: f64 },

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("API error ({status_code}): {reason}")]
    Api { status_code: u16, reason: String },

    #[error("The model blocked this content for safety reasons.")]
    SafetyBlocked,

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("History persistence failed: {reason}")]
    Persistence { reason: String },
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageEncoding { .. } => "image_encoding",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::Network { .. } => "network",
            Self::Api { .. } => "api",
            Self::SafetyBlocked => "safety_blocked",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Persistence { .. } => "persistence",
        }
    }

    /// True for failures raised before any request left the process.
    pub fn rejected_before_call(&self) -> bool {
        matches!(
            self,
            Self::ImageEncoding { .. } | Self::RateLimitExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::AnalysisError;

    #[test]
    fn messages_carry_actionable_detail() {
        let wait = AnalysisError::RateLimitExceeded { wait_seconds: 3.0 };
        assert_eq!(
            wait.to_string(),
            "Please wait 3.0 seconds before analyzing again."
        );

        let api = AnalysisError::Api {
            status_code: 503,
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(api.to_string(), "API error (503): HTTP 503");

        let image = AnalysisError::ImageEncoding {
            path: "/tmp/leaf.png".to_string(),
            reason: "unsupported format".to_string(),
        };
        assert!(image.to_string().contains("/tmp/leaf.png"));
    }

    #[test]
    fn serializes_with_kind_tag() -> anyhow::Result<()> {
        let err = AnalysisError::Api {
            status_code: 429,
            reason: "quota".to_string(),
        };
        let value = serde_json::to_value(&err)?;
        assert_eq!(
            value,
            json!({"kind": "api", "status_code": 429, "reason": "quota"})
        );

        let blocked: AnalysisError = serde_json::from_value(json!({"kind": "safety_blocked"}))?;
        assert_eq!(blocked, AnalysisError::SafetyBlocked);
        assert_eq!(
            serde_json::to_value(&blocked)?.get("kind"),
            Some(&Value::String("safety_blocked".to_string()))
        );
        Ok(())
    }

    #[test]
    fn only_local_rejections_skip_the_remote_call() {
        assert!(AnalysisError::RateLimitExceeded { wait_seconds: 1.0 }.rejected_before_call());
        assert!(AnalysisError::ImageEncoding {
            path: "x".to_string(),
            reason: "y".to_string(),
        }
        .rejected_before_call());
        assert!(!AnalysisError::SafetyBlocked.rejected_before_call());
        assert!(!AnalysisError::Network {
            reason: "reset".to_string()
        }
        .rejected_before_call());
    }
}
