//! Application configuration for tenderwatch.
//!
//! User config lives at `~/.tenderwatch/tenderwatch.toml` (or wherever
//! `--config` points). CLI flags override config file values, which override
//! defaults. Secrets are never stored in the file: it names the environment
//! variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TenderError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderwatch";

// ---------------------------------------------------------------------------
// Config structs (matching tenderwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tender API access and search policy. Required: the lookback window has no default.
    pub source: SourceConfig,

    /// Language model endpoint.
    #[serde(default)]
    pub model: ModelConfig,

    /// Notification sink.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Run inputs and outputs.
    #[serde(default)]
    pub run: RunConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the tender API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the project search endpoint.
    #[serde(default = "default_search_path")]
    pub search_path: String,

    /// Path template of the detail endpoint (`{projectId}`, `{publicationId}`).
    #[serde(default = "default_detail_path_template")]
    pub detail_path_template: String,

    /// Public portal used for deep links in notifications.
    #[serde(default = "default_base_url")]
    pub portal_url: String,

    /// Language for search results and localized fields.
    #[serde(default = "default_language")]
    pub language: String,

    /// CPV codes to search for.
    #[serde(default = "default_cpv_codes")]
    pub cpv_codes: Vec<String>,

    /// How many days back the publication window reaches.
    pub lookback_days: u32,

    /// Upper bound on search pages per run.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Delay between detail requests, in ms.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    /// Source config with defaults for everything except the lookback window.
    pub fn new(lookback_days: u32) -> Self {
        Self {
            base_url: default_base_url(),
            search_path: default_search_path(),
            detail_path_template: default_detail_path_template(),
            portal_url: default_base_url(),
            language: default_language(),
            cpv_codes: default_cpv_codes(),
            lookback_days,
            max_pages: default_max_pages(),
            request_delay_ms: default_request_delay(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.simap.ch".into()
}
fn default_search_path() -> String {
    "/api/publications/v2/project/project-search".into()
}
fn default_detail_path_template() -> String {
    "/api/publications/v1/project/{projectId}/publication-details/{publicationId}".into()
}
fn default_language() -> String {
    "de".into()
}
fn default_cpv_codes() -> Vec<String> {
    vec!["48000000".into(), "72000000".into()]
}
fn default_max_pages() -> u32 {
    100
}
fn default_request_delay() -> u64 {
    500
}
fn default_http_timeout() -> u64 {
    10
}

/// Which flavour of OpenAI-compatible API the model endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// `{endpoint}/chat/completions` with Bearer auth.
    #[default]
    OpenAi,
    /// Azure OpenAI deployment with `api-key` auth.
    Azure,
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProvider,

    /// API base URL (Azure: the resource endpoint).
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    /// Model name (Azure: the deployment name).
    #[serde(default = "default_model")]
    pub model: String,

    /// Azure `api-version` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            endpoint: default_model_endpoint(),
            model: default_model(),
            api_version: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout(),
        }
    }
}

fn default_model_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_model_timeout() -> u64 {
    60
}

/// `[notify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Name of the env var holding the webhook URL.
    #[serde(default = "default_webhook_env")]
    pub webhook_url_env: String,

    /// Minimum apply score for a project to be posted.
    #[serde(default = "default_threshold")]
    pub apply_score_threshold: u8,

    /// Per-request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url_env: default_webhook_env(),
            apply_score_threshold: default_threshold(),
            timeout_secs: default_http_timeout(),
        }
    }
}

fn default_webhook_env() -> String {
    "SLACK_WEBHOOK_URL".into()
}
fn default_threshold() -> u8 {
    7
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// JSON file with the company profile.
    #[serde(default = "default_profile_path")]
    pub company_profile: String,

    /// Batch artifact written at the end of each run.
    #[serde(default = "default_output_path")]
    pub output: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            company_profile: default_profile_path(),
            output: default_output_path(),
        }
    }
}

fn default_profile_path() -> String {
    "company_profile.json".into()
}
fn default_output_path() -> String {
    "enriched_projects.json".into()
}

impl AppConfig {
    /// The config written by `config init`.
    pub fn template() -> Self {
        Self {
            source: SourceConfig::new(3),
            model: ModelConfig::default(),
            notify: NotifyConfig::default(),
            run: RunConfig::default(),
        }
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("source.base_url", &self.source.base_url),
            ("source.portal_url", &self.source.portal_url),
            ("model.endpoint", &self.model.endpoint),
        ] {
            Url::parse(value)
                .map_err(|e| TenderError::config(format!("{name} is not a valid URL ({value}): {e}")))?;
        }

        if self.source.cpv_codes.is_empty() {
            return Err(TenderError::config("source.cpv_codes must not be empty"));
        }
        if self.source.max_pages == 0 {
            return Err(TenderError::config("source.max_pages must be at least 1"));
        }
        if !self.source.detail_path_template.contains("{projectId}")
            || !self.source.detail_path_template.contains("{publicationId}")
        {
            return Err(TenderError::config(
                "source.detail_path_template needs {projectId} and {publicationId} placeholders",
            ));
        }
        if self.notify.apply_score_threshold > 10 {
            return Err(TenderError::config(format!(
                "notify.apply_score_threshold must be within 0..=10, got {}",
                self.notify.apply_score_threshold
            )));
        }
        if self.model.provider == ModelProvider::Azure && self.model.api_version.is_none() {
            return Err(TenderError::config("model.api_version is required for the azure provider"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TenderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderwatch/tenderwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from the default location.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        return Err(TenderError::config(format!(
            "config file {} not found; run `tenderwatch config init` first",
            path.display()
        )));
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| TenderError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Create the config directory and write a template config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::template())
        .map_err(|e| TenderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderError::io(&path, e))?;
    tracing::info!(?path, "created template config file");

    Ok(path)
}

/// Read a secret from the environment variable named in the config.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(TenderError::config(format!(
            "secret not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_serializes() {
        let toml_str = toml::to_string_pretty(&AppConfig::template()).expect("serialize template");
        assert!(toml_str.contains("lookback_days = 3"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("SLACK_WEBHOOK_URL"));
    }

    #[test]
    fn template_roundtrip() {
        let toml_str = toml::to_string_pretty(&AppConfig::template()).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.source.lookback_days, 3);
        assert_eq!(parsed.source.max_pages, 100);
        assert_eq!(parsed.model.api_key_env, "OPENAI_API_KEY");
        parsed.validate().expect("template is valid");
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[source]
lookback_days = 1
"#,
        )
        .expect("parse");
        assert_eq!(config.source.lookback_days, 1);
        assert_eq!(config.source.language, "de");
        assert_eq!(config.source.cpv_codes, vec!["48000000", "72000000"]);
        assert_eq!(config.source.request_delay_ms, 500);
        assert_eq!(config.source.timeout_secs, 10);
        assert_eq!(config.notify.apply_score_threshold, 7);
        assert_eq!(config.model.provider, ModelProvider::OpenAi);
        assert_eq!(config.run.output, "enriched_projects.json");
    }

    #[test]
    fn lookback_window_is_required() {
        let err = toml::from_str::<AppConfig>(
            r#"
[source]
max_pages = 5
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("lookback_days"));

        assert!(toml::from_str::<AppConfig>("[model]\nmodel = \"gpt-4o\"\n").is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::template();
        config.source.cpv_codes.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::template();
        config.source.base_url = "not a url".into();
        assert!(config.validate().unwrap_err().to_string().contains("source.base_url"));

        let mut config = AppConfig::template();
        config.model.provider = ModelProvider::Azure;
        assert!(config.validate().is_err());
        config.model.api_version = Some("2025-01-01-preview".into());
        config.validate().expect("azure with api_version is valid");

        let mut config = AppConfig::template();
        config.notify.apply_score_threshold = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn azure_provider_parses() {
        let config: AppConfig = toml::from_str(
            r#"
[source]
lookback_days = 3

[model]
provider = "azure"
endpoint = "https://example.openai.azure.com"
model = "gpt-4o"
api_version = "2025-01-01-preview"
"#,
        )
        .expect("parse");
        assert_eq!(config.model.provider, ModelProvider::Azure);
        config.validate().expect("valid");
    }

    #[test]
    fn load_from_file() {
        let dir = std::env::temp_dir().join(format!("tw-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tenderwatch.toml");
        std::fs::write(&path, "[source]\nlookback_days = 2\nmax_pages = 4\n").unwrap();

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.source.lookback_days, 2);
        assert_eq!(config.source.max_pages, 4);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn secret_resolution() {
        // Unique names avoid interfering with other tests
        let err = resolve_secret("TW_TEST_NONEXISTENT_SECRET_12345").unwrap_err();
        assert!(err.to_string().contains("TW_TEST_NONEXISTENT_SECRET_12345"));
    }
}
