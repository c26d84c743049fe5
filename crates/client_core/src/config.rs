use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::network::NetworkSimulationConfig;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network_enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub error_probability: f64,
    pub timeout_probability: f64,
    pub timeout_delay_ms: u64,
    pub fault_seed: Option<u64>,
    pub state_dir: PathBuf,
    pub snapshot_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network_enabled: true,
            min_delay_ms: 500,
            max_delay_ms: 2000,
            error_probability: 0.05,
            timeout_probability: 0.01,
            timeout_delay_ms: 10_000,
            fault_seed: None,
            state_dir: "./data/state".into(),
            snapshot_capacity: storage::DEFAULT_SNAPSHOT_CAPACITY,
        }
    }
}

impl Settings {
    /// Replaces out-of-range values with their defaults.
    pub fn validate(mut self) -> Self {
        let defaults = Settings::default();

        if self.min_delay_ms > self.max_delay_ms {
            warn!(
                min_delay_ms = self.min_delay_ms,
                max_delay_ms = self.max_delay_ms,
                "delay window is inverted; using defaults"
            );
            self.min_delay_ms = defaults.min_delay_ms;
            self.max_delay_ms = defaults.max_delay_ms;
        }
        if !is_probability(self.error_probability) {
            warn!(
                error_probability = self.error_probability,
                "error probability outside [0, 1]; using default"
            );
            self.error_probability = defaults.error_probability;
        }
        if !is_probability(self.timeout_probability) {
            warn!(
                timeout_probability = self.timeout_probability,
                "timeout probability outside [0, 1]; using default"
            );
            self.timeout_probability = defaults.timeout_probability;
        }
        if self.snapshot_capacity == 0 {
            warn!("snapshot capacity must be positive; using default");
            self.snapshot_capacity = defaults.snapshot_capacity;
        }
        self
    }

    pub fn network(&self) -> NetworkSimulationConfig {
        NetworkSimulationConfig {
            enabled: self.network_enabled,
            min_delay_ms: self.min_delay_ms,
            max_delay_ms: self.max_delay_ms,
            error_probability: self.error_probability,
            timeout_probability: self.timeout_probability,
            timeout_delay_ms: self.timeout_delay_ms,
            seed: self.fault_seed,
        }
    }
}

fn is_probability(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Defaults, then `client.toml` in the working directory, then `APP__*`
/// environment variables.
pub fn load_settings() -> Settings {
    let settings = match load_settings_file(Path::new(DEFAULT_SETTINGS_FILE)) {
        Ok(Some(settings)) => settings,
        Ok(None) => Settings::default(),
        Err(err) => {
            warn!(error = %err, "ignoring unreadable settings file");
            Settings::default()
        }
    };
    apply_env_overrides(settings, |key| std::env::var(key).ok()).validate()
}

/// Like [`load_settings`] but reads an explicit file, which must exist.
pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let settings = load_settings_file(path)?
        .with_context(|| format!("settings file '{}' does not exist", path.display()))?;
    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()).validate())
}

fn load_settings_file(path: &Path) -> anyhow::Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    let settings = toml::from_str::<Settings>(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
    Ok(Some(settings))
}

fn apply_env_overrides(
    mut settings: Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    if let Some(v) = parsed(&lookup, "APP__NETWORK_ENABLED") {
        settings.network_enabled = v;
    }
    if let Some(v) = parsed(&lookup, "APP__MIN_DELAY_MS") {
        settings.min_delay_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__MAX_DELAY_MS") {
        settings.max_delay_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__ERROR_PROBABILITY") {
        settings.error_probability = v;
    }
    if let Some(v) = parsed(&lookup, "APP__TIMEOUT_PROBABILITY") {
        settings.timeout_probability = v;
    }
    if let Some(v) = parsed(&lookup, "APP__TIMEOUT_DELAY_MS") {
        settings.timeout_delay_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__FAULT_SEED") {
        settings.fault_seed = Some(v);
    }
    if let Some(v) = lookup("APP__STATE_DIR") {
        settings.state_dir = v.into();
    }
    if let Some(v) = parsed(&lookup, "APP__SNAPSHOT_CAPACITY") {
        settings.snapshot_capacity = v;
    }
    settings
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
