//! Configuration loading, validation, and management for studiobot.
//!
//! Loads configuration from `~/.studiobot/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.studiobot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default chat model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Unset means the provider's own default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_temperature: Option<f32>,

    /// Model used to embed knowledge chunks and queries
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub personas: PersonaConfig,

    #[serde(default)]
    pub outputs: OutputConfig,

    #[serde(default)]
    pub images: ImageConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub skills: SkillsConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-5-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("embedding_model", &self.embedding_model)
            .field("providers", &self.providers)
            .field("gateway", &self.gateway)
            .field("chat", &self.chat)
            .field("personas", &self.personas)
            .field("outputs", &self.outputs)
            .field("images", &self.images)
            .field("knowledge", &self.knowledge)
            .field("skills", &self.skills)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Browser origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into(), "http://127.0.0.1:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Upper bound on provider round trips per chat turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Turns kept per agent; oldest are evicted first
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Directory for per-agent JSON history snapshots; unset keeps history in memory only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_snapshot_dir: Option<PathBuf>,

    #[serde(default = "default_agent")]
    pub default_agent: String,
}

fn default_max_tool_rounds() -> usize {
    3
}
fn default_history_cap() -> usize {
    20
}
fn default_agent() -> String {
    "creative_director".into()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            history_cap: default_history_cap(),
            history_snapshot_dir: None,
            default_agent: default_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Directory holding `<agent_id>.json` persona files
    #[serde(default = "default_personas_dir")]
    pub dir: PathBuf,

    /// Known agent identities
    #[serde(default = "default_agents")]
    pub agents: Vec<String>,
}

fn default_personas_dir() -> PathBuf {
    PathBuf::from("personas")
}
fn default_agents() -> Vec<String> {
    vec!["creative_director".into(), "art_director".into()]
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            dir: default_personas_dir(),
            agents: default_agents(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Fallback root when no project path applies
    #[serde(default = "default_output_root")]
    pub root: PathBuf,

    /// Document folder, relative to the project root (or absolute)
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Image folder, relative to the project root (or absolute)
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// Local state such as the project path map
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}
fn default_documents_dir() -> PathBuf {
    PathBuf::from("gen")
}
fn default_images_dir() -> PathBuf {
    PathBuf::from("Images")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("local_data")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            documents_dir: default_documents_dir(),
            images_dir: default_images_dir(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_num_images")]
    pub num_images: u32,

    #[serde(default = "default_image_width")]
    pub width: u32,

    #[serde(default = "default_image_height")]
    pub height: u32,

    #[serde(default = "default_image_style")]
    pub style: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Without a key, generation writes placeholder images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leonardo_api_key: Option<String>,

    #[serde(default = "default_leonardo_base_url")]
    pub leonardo_base_url: String,

    /// Generation status lives on the older API version
    #[serde(default = "default_leonardo_poll_url")]
    pub leonardo_poll_url: String,
}

fn default_num_images() -> u32 {
    2
}
fn default_image_width() -> u32 {
    720
}
fn default_image_height() -> u32 {
    1280
}
fn default_image_style() -> String {
    "high resolution cartoon, movie style".into()
}
fn default_leonardo_base_url() -> String {
    "https://cloud.leonardo.ai/api/rest/v2".into()
}
fn default_leonardo_poll_url() -> String {
    "https://cloud.leonardo.ai/api/rest/v1".into()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            num_images: default_num_images(),
            width: default_image_width(),
            height: default_image_height(),
            style: default_image_style(),
            model_id: None,
            leonardo_api_key: None,
            leonardo_base_url: default_leonardo_base_url(),
            leonardo_poll_url: default_leonardo_poll_url(),
        }
    }
}

impl std::fmt::Debug for ImageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageConfig")
            .field("num_images", &self.num_images)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("style", &self.style)
            .field("model_id", &self.model_id)
            .field("leonardo_api_key", &redact(&self.leonardo_api_key))
            .field("leonardo_base_url", &self.leonardo_base_url)
            .field("leonardo_poll_url", &self.leonardo_poll_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// JSONL file the knowledge base persists to; unset keeps it in memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_chunk_size() -> usize {
    1200
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    6
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Directory of `<skill>/SKILL.md` folders
    #[serde(default = "default_skills_dir")]
    pub dir: PathBuf,
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dir: default_skills_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.studiobot/config.toml)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Like [`AppConfig::load`], reading `path` instead of the default location.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Environment values only fill settings the file left unset,
    /// except `STUDIOBOT_PORT`, which always wins.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("STUDIOBOT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if self.images.leonardo_api_key.is_none() {
            self.images.leonardo_api_key = lookup("LEONARDO_API_KEY");
        }
        if let Some(port) = lookup("STUDIOBOT_PORT").and_then(|p| p.parse().ok()) {
            self.gateway.port = port;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".studiobot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.default_temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.chat.max_tool_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_tool_rounds must be at least 1".into(),
            ));
        }
        if self.chat.history_cap == 0 {
            return Err(ConfigError::ValidationError(
                "chat.history_cap must be at least 1".into(),
            ));
        }
        if self.knowledge.chunk_overlap >= self.knowledge.chunk_size {
            return Err(ConfigError::ValidationError(
                "knowledge.chunk_overlap must be smaller than knowledge.chunk_size".into(),
            ));
        }
        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must not be 0".into()));
        }
        Ok(())
    }

    /// The key for `provider`, preferring its own section over the global key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: None,
            embedding_model: default_embedding_model(),
            providers: HashMap::new(),
            gateway: GatewayConfig::default(),
            chat: ChatConfig::default(),
            personas: PersonaConfig::default(),
            outputs: OutputConfig::default(),
            images: ImageConfig::default(),
            knowledge: KnowledgeConfig::default(),
            skills: SkillsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
