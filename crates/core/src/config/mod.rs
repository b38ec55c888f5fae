use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::router::ContentType;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_model() -> String {
    "mistral".to_string()
}

fn default_content_types() -> BTreeMap<String, String> {
    [
        (ContentType::Blog, "llama3"),
        (ContentType::Social, "mistral"),
        (ContentType::Summary, "mistral"),
        (ContentType::Ebook, "llama3"),
        (ContentType::Analysis, "llama3"),
        (ContentType::Script, "mistral"),
        (ContentType::Article, "llama3"),
    ]
    .into_iter()
    .map(|(kind, model)| (kind.as_str().to_string(), model.to_string()))
    .collect()
}

/// Entries from the file override the built-in routes one by one; types the
/// file does not name keep their defaults.
fn merge_content_types<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, String>::deserialize(deserializer)?;
    let mut routes = default_content_types();
    for (content_type, model) in overrides {
        routes.insert(content_type.trim().to_lowercase(), model);
    }
    Ok(routes)
}

fn default_output_root() -> PathBuf {
    PathBuf::from("library")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Overall per-request limit, including reading a streamed body.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Substituted for any configured model the service does not offer.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(
        default = "default_content_types",
        deserialize_with = "merge_content_types"
    )]
    pub content_types: BTreeMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            content_types: default_content_types(),
        }
    }
}

impl ModelConfig {
    pub fn model_for(&self, content_type: &str) -> Option<&str> {
        self.content_types
            .get(&content_type.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn set_model<K: AsRef<str>, V: Into<String>>(&mut self, content_type: K, model: V) {
        self.content_types
            .insert(content_type.as_ref().trim().to_lowercase(), model.into());
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptConfig {
    #[serde(default)]
    pub custom_directories: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = if path.exists() {
            Config::from_path(&path)?
        } else {
            Config::default()
        };

        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.config.to_path(&self.path)
    }
}
