use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Countersign";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var pointing at an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "COUNTERSIGN_CONFIG";

/// Get the application data directory (~/Countersign/ on all platforms).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Countersign")
}

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "countersign=info,tower_http=info,warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Score thresholds. Auto-apply and duplicate detection are tuned
/// independently even though both default to 0.80.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// At or above: label `high`. Layer A results below this let Layer B run.
    pub high_label: f32,
    /// At or above: label `medium`, which the decision engine auto-applies.
    pub auto_apply: f32,
    /// A work order already flagged signed counts as a duplicate only when
    /// the current extraction is at least this confident.
    pub duplicate_detection: f32,
    /// Minimum confidence the recognition service must report.
    pub recognition_accept: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_label: 0.90,
            auto_apply: 0.80,
            duplicate_detection: 0.80,
            recognition_accept: 0.80,
        }
    }
}

/// Per-layer confidence ceilings and the fixed structural scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceCaps {
    pub structural_unique: f32,
    pub structural_ambiguous: f32,
    pub recognition: f32,
    pub rescue: f32,
    pub fallback: f32,
}

impl Default for ConfidenceCaps {
    fn default() -> Self {
        Self {
            structural_unique: 0.98,
            structural_ambiguous: 0.85,
            recognition: 0.94,
            rescue: 0.85,
            fallback: 0.70,
        }
    }
}

/// Pipeline configuration. Every collaborator receives the slice it needs
/// at construction; nothing reads process state after startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub thresholds: Thresholds,
    pub caps: ConfidenceCaps,
    /// Accepted distance between a token's digit count and the expected count.
    pub digit_tolerance: u8,
    /// Used when a sender's template carries no digit count.
    pub default_expected_digits: u8,
    /// When false the identity resolver goes straight to the legacy store.
    pub authoritative_lookup_enabled: bool,
    pub recognition_url: Option<String>,
    pub recognition_timeout_secs: u64,
    pub rescue_url: Option<String>,
    pub rescue_model: String,
    pub rescue_timeout_secs: u64,
    /// DPI used when rasterising a capture region.
    pub render_dpi: u32,
    pub database_path: PathBuf,
    pub legacy_database_path: Option<PathBuf>,
    pub asset_dir: PathBuf,
    pub bind_address: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let data = app_data_dir();
        Self {
            thresholds: Thresholds::default(),
            caps: ConfidenceCaps::default(),
            digit_tolerance: 1,
            default_expected_digits: 7,
            authoritative_lookup_enabled: true,
            recognition_url: None,
            recognition_timeout_secs: 20,
            rescue_url: None,
            rescue_model: "llama3.1:8b".into(),
            rescue_timeout_secs: 30,
            render_dpi: 200,
            database_path: data.join("countersign.db"),
            legacy_database_path: Some(data.join("legacy_export.db")),
            asset_dir: data.join("assets"),
            bind_address: "127.0.0.1:8088".into(),
        }
    }
}

impl ReconcileConfig {
    /// Load from `COUNTERSIGN_CONFIG` (if set), then apply `COUNTERSIGN_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from a key lookup (env vars in production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("COUNTERSIGN_DATABASE") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("COUNTERSIGN_LEGACY_DATABASE") {
            self.legacy_database_path = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some(v) = lookup("COUNTERSIGN_ASSET_DIR") {
            self.asset_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("COUNTERSIGN_BIND") {
            self.bind_address = v;
        }
        if let Some(v) = lookup("COUNTERSIGN_RECOGNITION_URL") {
            self.recognition_url = Some(v);
        }
        if let Some(v) = lookup("COUNTERSIGN_RESCUE_URL") {
            self.rescue_url = Some(v);
        }
        if let Some(v) = lookup("COUNTERSIGN_RESCUE_MODEL") {
            self.rescue_model = v;
        }
        if let Some(v) = lookup("COUNTERSIGN_AUTHORITATIVE_LOOKUP") {
            self.authoritative_lookup_enabled = parse_env("COUNTERSIGN_AUTHORITATIVE_LOOKUP", &v)?;
        }
        if let Some(v) = lookup("COUNTERSIGN_EXPECTED_DIGITS") {
            self.default_expected_digits = parse_env("COUNTERSIGN_EXPECTED_DIGITS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("thresholds.high_label", t.high_label),
            ("thresholds.auto_apply", t.auto_apply),
            ("thresholds.duplicate_detection", t.duplicate_detection),
            ("thresholds.recognition_accept", t.recognition_accept),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Inconsistent(format!("{name} must be within [0, 1]")));
            }
        }
        if t.auto_apply > t.high_label {
            return Err(ConfigError::Inconsistent(
                "auto_apply threshold cannot exceed the high label threshold".into(),
            ));
        }
        if self.caps.fallback >= t.auto_apply {
            return Err(ConfigError::Inconsistent(
                "fallback cap must stay below the auto-apply threshold".into(),
            ));
        }
        if self.default_expected_digits == 0 {
            return Err(ConfigError::Inconsistent("default_expected_digits must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
