use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::AnalysisError;
use crate::report::Section;

/// Result of one analysis call. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success {
        raw_text: String,
        sections: Vec<Section>,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens_used: Option<u64>,
    },
    Failure {
        error: AnalysisError,
        timestamp: DateTime<Utc>,
    },
}

impl AnalysisOutcome {
    pub fn success(raw_text: String, sections: Vec<Section>, tokens_used: Option<u64>) -> Self {
        Self::Success {
            raw_text,
            sections,
            timestamp: Utc::now(),
            tokens_used,
        }
    }

    pub fn failure(error: AnalysisError) -> Self {
        Self::Failure {
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Success { timestamp, .. } | Self::Failure { timestamp, .. } => *timestamp,
        }
    }

    pub fn timestamp_iso(&self) -> String {
        self.timestamp()
            .to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        match self {
            Self::Failure { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }

    pub fn sections(&self) -> &[Section] {
        match self {
            Self::Success { sections, .. } => sections,
            Self::Failure { .. } => &[],
        }
    }

    pub fn tokens_used(&self) -> Option<u64> {
        match self {
            Self::Success { tokens_used, .. } => *tokens_used,
            Self::Failure { .. } => None,
        }
    }

    /// Text kept in history: the model answer, or the failure message.
    pub fn response_text(&self) -> String {
        match self {
            Self::Success { raw_text, .. } => raw_text.clone(),
            Self::Failure { error, .. } => error.to_string(),
        }
    }
}
