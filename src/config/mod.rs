use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::OutputFormat;
use crate::engine::{Credential, EngineSettings, RetryPolicy};
use crate::utils::validate_http_url;

const APP_DIR: &str = "video-summarizer";
const LOCAL_CONFIG: &str = "vidsum.yaml";
const CREDENTIALS_FILE: &str = "credentials.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model settings
    pub llm: LlmConfig,

    /// Video lookup settings
    pub video: VideoConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,

    pub model: String,

    pub temperature: f32,

    /// Deadline for one completion request
    pub request_timeout_secs: u64,

    /// Input budget per request (prompt + transcript), in bytes
    pub max_input_bytes: usize,

    /// Chunk requests allowed in flight at once for long transcripts
    pub max_concurrent_chunks: usize,

    /// Backoff for rate-limited requests
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Caption languages in order of preference
    pub languages: Vec<String>,

    /// Deadline for downloading a caption track
    pub fetch_timeout_secs: u64,

    /// Deadline for the yt-dlp metadata lookup
    pub lookup_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default output format
    pub default_output_format: String,
}

impl AppConfig {
    /// The configured default output format
    pub fn output_format(&self) -> Result<OutputFormat> {
        self.default_output_format
            .parse()
            .context("Invalid app.default_output_format (expected markdown, text or json)")
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            request_timeout_secs: 120,
            max_input_bytes: 48_000,
            max_concurrent_chunks: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            languages: vec!["en".to_string()],
            fetch_timeout_secs: 30,
            lookup_timeout_secs: 60,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_output_format: "markdown".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join(APP_DIR).join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_http_url(&self.llm.api_url).context("Invalid llm.api_url")?;

        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must be set");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be between 0 and 2");
        }
        if self.llm.max_input_bytes < 2_000 {
            anyhow::bail!("llm.max_input_bytes must be at least 2000");
        }
        if self.llm.max_concurrent_chunks == 0 {
            anyhow::bail!("llm.max_concurrent_chunks must be at least 1");
        }
        if self.llm.request_timeout_secs == 0
            || self.video.fetch_timeout_secs == 0
            || self.video.lookup_timeout_secs == 0
        {
            anyhow::bail!("Timeouts must be at least one second");
        }
        if self.llm.retry.max_attempts == 0 {
            anyhow::bail!("llm.retry.max_attempts must be at least 1");
        }
        if self.llm.retry.backoff_multiplier < 1.0 {
            anyhow::bail!("llm.retry.backoff_multiplier must be at least 1.0");
        }
        self.app.output_format()?;

        Ok(())
    }

    /// Engine settings derived from the `llm` section
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_input_bytes: self.llm.max_input_bytes,
            max_concurrent_chunks: self.llm.max_concurrent_chunks,
            request_timeout: Duration::from_secs(self.llm.request_timeout_secs),
            retry: self.llm.retry.clone(),
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  API URL: {}", self.llm.api_url);
        println!("  Model: {}", self.llm.model);
        println!("  Temperature: {}", self.llm.temperature);
        println!("  Request Timeout: {}s", self.llm.request_timeout_secs);
        println!("  Input Budget: {} bytes", self.llm.max_input_bytes);
        println!("  Concurrent Chunks: {}", self.llm.max_concurrent_chunks);
        println!("  Retry Attempts: {}", self.llm.retry.max_attempts);
        println!("  yt-dlp: {}", self.video.yt_dlp_path);
        println!("  Lookup Timeout: {}s", self.video.lookup_timeout_secs);
        println!("  Caption Languages: {}", self.video.languages.join(", "));
        println!("  Default Format: {}", self.app.default_output_format);
    }
}

/// Persistent storage for the user's API key
pub trait CredentialStore {
    fn get_api_key(&self) -> Result<Option<String>>;

    fn save_api_key(&self, api_key: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    openai_api_key: Option<String>,
}

/// Keeps the API key in a YAML file next to the config
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(Self::new(config_dir.join(APP_DIR).join(CREDENTIALS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_api_key(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs_err::read_to_string(&self.path)
            .context("Failed to read credentials file")?;
        let stored: StoredCredentials = serde_yaml::from_str(&content)
            .context("Failed to parse credentials file")?;

        Ok(stored.openai_api_key.filter(|k| !k.trim().is_empty()))
    }

    fn save_api_key(&self, api_key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let stored = StoredCredentials {
            openai_api_key: Some(api_key.trim().to_string()),
        };
        let content = serde_yaml::to_string(&stored)
            .context("Failed to serialize credentials")?;

        fs_err::write(&self.path, content)
            .context("Failed to write credentials file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs_err::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

/// Pick the API key for a request: an explicit key wins over the stored one
pub fn resolve_credential(explicit: Option<&str>, store: &dyn CredentialStore) -> Result<Option<Credential>> {
    if let Some(credential) = explicit.and_then(Credential::new) {
        return Ok(Some(credential));
    }

    Ok(store.get_api_key()?.and_then(Credential::new))
}
