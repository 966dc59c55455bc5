use std::path::Path;

use plantscan_contracts::analysis::AnalysisOutcome;
use plantscan_contracts::history::{HistoryEntry, HistoryStore};
use tracing::{info, warn};

use crate::gemini::AnalysisClient;
use crate::image_prep::{normalize_with, NormalizeOptions};

/// normalize → admit → analyze → parse → record.
///
/// Every call that passes the rate gate is recorded in history, failed or
/// not. Calls rejected locally (unreadable image, rate limit) are not.
pub struct Pipeline {
    client: AnalysisClient,
    history: HistoryStore,
    normalize_options: NormalizeOptions,
}

impl Pipeline {
    pub fn new(client: AnalysisClient, history: HistoryStore) -> Self {
        Self {
            client,
            history,
            normalize_options: NormalizeOptions::default(),
        }
    }

    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize_options = options;
        self
    }

    pub fn analyze_image(&self, image_path: &Path) -> AnalysisOutcome {
        let payload = match normalize_with(image_path, self.normalize_options) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(path = %image_path.display(), error = %err, "image preparation failed");
                return AnalysisOutcome::failure(err);
            }
        };
        info!(
            path = %image_path.display(),
            width = payload.width,
            height = payload.height,
            "image prepared"
        );

        let outcome = self.client.analyze(payload);
        if outcome
            .error()
            .map(|err| err.rejected_before_call())
            .unwrap_or(false)
        {
            return outcome;
        }
        let entry = HistoryEntry::from_outcome(image_path, &outcome);
        if let Err(err) = self.history.append(entry) {
            warn!(error = %err, "analysis finished but history was not updated");
        }
        outcome
    }
}
