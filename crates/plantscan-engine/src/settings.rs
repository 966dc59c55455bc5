use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::gemini::{GeminiConfig, DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::rate_gate::MIN_INTERVAL;

pub const DEFAULT_HISTORY_FILE: &str = "scan_history.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 60.0;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub history_path: PathBuf,
    pub request_timeout: Duration,
    pub min_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            history_path: PathBuf::from(DEFAULT_HISTORY_FILE),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
            min_interval: MIN_INTERVAL,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_key: lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY")),
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            model: lookup("PLANTSCAN_MODEL").unwrap_or(defaults.model),
            history_path: lookup("PLANTSCAN_HISTORY")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_path),
            request_timeout: Duration::from_secs_f64(seconds_or(
                lookup("PLANTSCAN_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
                5.0,
                300.0,
            )),
            min_interval: Duration::from_secs_f64(seconds_or(
                lookup("PLANTSCAN_MIN_INTERVAL_SECS"),
                MIN_INTERVAL.as_secs_f64(),
                0.0,
                3600.0,
            )),
        }
    }

    pub fn gemini_config(&self) -> Result<GeminiConfig> {
        let Some(api_key) = self.api_key.clone() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        Ok(GeminiConfig {
            api_base: self.api_base.clone(),
            api_key,
            model: self.model.clone(),
        })
    }
}

fn seconds_or(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(min, max))
        .unwrap_or(default)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::Settings;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.min_interval, Duration::from_secs(4));
        assert_eq!(settings.history_path, PathBuf::from("scan_history.json"));
        assert!(settings.gemini_config().is_err());
    }

    #[test]
    fn overrides_are_read_and_clamped() -> anyhow::Result<()> {
        let settings = Settings::from_lookup(lookup(&[
            ("GOOGLE_API_KEY", "fallback"),
            ("GEMINI_API_BASE", "https://proxy.test/v1beta/"),
            ("PLANTSCAN_MODEL", "gemini-2.0-flash"),
            ("PLANTSCAN_HISTORY", "/var/lib/plantscan/history.json"),
            ("PLANTSCAN_REQUEST_TIMEOUT_SECS", "1"),
            ("PLANTSCAN_MIN_INTERVAL_SECS", "6.5"),
        ]));
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.min_interval, Duration::from_millis(6500));

        let config = settings.gemini_config()?;
        assert_eq!(config.api_key, "fallback");
        assert_eq!(
            config.endpoint(),
            "https://proxy.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
        Ok(())
    }

    #[test]
    fn primary_key_wins_and_garbage_numbers_fall_back() {
        let settings = Settings::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "primary"),
            ("GOOGLE_API_KEY", "fallback"),
            ("PLANTSCAN_REQUEST_TIMEOUT_SECS", "soon"),
        ]));
        assert_eq!(settings.api_key.as_deref(), Some("primary"));
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
    }
}
