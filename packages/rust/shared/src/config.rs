//! Application configuration for RoofScout.
//!
//! User config lives at `~/.roofscout/roofscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RoofScoutError};
use crate::types::Region;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "roofscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".roofscout";

// ---------------------------------------------------------------------------
// Config structs (matching roofscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini provider settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Retry and request pacing.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Placeholder geocoordinate origin.
    #[serde(default)]
    pub origin: OriginConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// City to scan when `--city` is not given.
    #[serde(default = "default_city")]
    pub city: String,

    /// State to scan when `--state` is not given.
    #[serde(default = "default_state")]
    pub state: String,

    /// Directory CSV exports are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            city: default_city(),
            state: default_state(),
            output_dir: default_output_dir(),
        }
    }
}

impl DefaultsConfig {
    pub fn region(&self) -> Region {
        Region::new(&self.city, &self.state)
    }
}

fn default_city() -> String {
    "Pittsburgh".into()
}
fn default_state() -> String {
    "PA".into()
}
fn default_output_dir() -> String {
    ".".into()
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for the grounded discovery search.
    #[serde(default = "default_discovery_model")]
    pub discovery_model: String,

    /// Model used for per-lead roof analysis.
    #[serde(default = "default_enrichment_model")]
    pub enrichment_model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            discovery_model: default_discovery_model(),
            enrichment_model: default_enrichment_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GeminiConfig {
    /// Parse and validate the configured API root.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            RoofScoutError::config(format!("invalid gemini.base_url '{}': {e}", self.base_url))
        })
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_discovery_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_enrichment_model() -> String {
    "gemini-3-flash-preview".into()
}
fn default_timeout_secs() -> u64 {
    60
}

/// `[pacing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Total attempts per remote call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles each retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to each backoff.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Fixed gap between enrichment requests.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Progress total shown while discovery is still running.
    #[serde(default = "default_nominal_total")]
    pub nominal_total: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
            pacing_ms: default_pacing_ms(),
            nominal_total: default_nominal_total(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_jitter_ms() -> u64 {
    1000
}
fn default_pacing_ms() -> u64 {
    800
}
fn default_nominal_total() -> usize {
    500
}

/// `[origin]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,

    /// Width of the box placeholder coordinates are scattered in, in degrees.
    #[serde(default = "default_spread")]
    pub spread: f64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
            spread: default_spread(),
        }
    }
}

fn default_latitude() -> f64 {
    40.44
}
fn default_longitude() -> f64 {
    -79.99
}
fn default_spread() -> f64 {
    0.1
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, derived from the config file.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    /// Gap between consecutive enrichment requests.
    pub pacing: Duration,
    pub nominal_total: usize,
    pub origin: OriginConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.pacing.max_attempts,
            base_delay: Duration::from_millis(config.pacing.base_delay_ms),
            max_jitter: Duration::from_millis(config.pacing.jitter_ms),
            pacing: Duration::from_millis(config.pacing.pacing_ms),
            nominal_total: config.pacing.nominal_total,
            origin: config.origin.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.roofscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RoofScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.roofscout/roofscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RoofScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        RoofScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    if config.pacing.max_attempts == 0 {
        return Err(RoofScoutError::config("pacing.max_attempts must be at least 1"));
    }

    let origin = &config.origin;
    if !(origin.latitude.is_finite() && origin.longitude.is_finite() && origin.spread.is_finite())
    {
        return Err(RoofScoutError::config(
            "origin.latitude, origin.longitude and origin.spread must be finite numbers",
        ));
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RoofScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RoofScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RoofScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Gemini API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(RoofScoutError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://aistudio.google.com/apikey"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("pacing_ms"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
city = "Cleveland"
state = "OH"

[pacing]
pacing_ms = 1500
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.region(), Region::new("Cleveland", "OH"));
        assert_eq!(config.pacing.pacing_ms, 1500);
        assert_eq!(config.pacing.max_attempts, 5);
        assert_eq!(config.gemini.discovery_model, "gemini-2.5-flash");
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let pipeline = PipelineConfig::from(&AppConfig::default());
        assert_eq!(pipeline.max_attempts, 5);
        assert_eq!(pipeline.base_delay, Duration::from_millis(2000));
        assert_eq!(pipeline.max_jitter, Duration::from_millis(1000));
        assert_eq!(pipeline.pacing, Duration::from_millis(800));
        assert_eq!(pipeline.nominal_total, 500);
    }

    #[test]
    fn zero_attempts_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roofscout.toml");
        std::fs::write(&path, "[pacing]\nmax_attempts = 0\n").expect("write");

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn non_finite_origin_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        for value in ["nan", "inf", "-inf"] {
            let path = dir.path().join(format!("origin-{value}.toml"));
            std::fs::write(&path, format!("[origin]\nspread = {value}\n")).expect("write");

            let err = load_config_from(&path).unwrap_err();
            assert!(matches!(err, RoofScoutError::Config { .. }), "{value}: {err}");
            assert!(err.to_string().contains("origin.spread"), "{value}: {err}");
        }
    }

    #[test]
    fn base_url_validation() {
        let mut config = GeminiConfig::default();
        assert!(config.base_url().is_ok());
        config.base_url = "not a url".into();
        assert!(config.base_url().is_err());
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "RS_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
