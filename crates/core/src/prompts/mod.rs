use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::PromptConfig;

mod builders;

pub use builders::{
    BlogPostParams, CategorizationParams, EbookChapterParams, EbookOutlineParams,
    ExtractionParams, HistoricalNarrativeParams, LengthLimit, MarketAnalysisParams, Platform,
    PlatformSelection, PromptBuilder, ScrapedContentParams, SocialPostParams, SummaryParams,
};

const BUILT_IN_PROMPTS: &str = include_str!("../../prompts/default.toml");

pub type PromptArguments = HashMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptSource {
    BuiltIn,
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct PromptTemplate {
    key: String,
    description: Option<String>,
    source: PromptSource,
    segments: Vec<Segment>,
    required: BTreeSet<String>,
}

impl PromptTemplate {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn source(&self) -> &PromptSource {
        &self.source
    }

    pub fn required_arguments(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(String::as_str)
    }

    /// Placeholders without a value render as empty text unless required.
    pub fn render(&self, arguments: &PromptArguments) -> Result<String, PromptError> {
        if let Some(missing) = self.required.iter().find(|r| !arguments.contains_key(*r)) {
            return Err(PromptError::MissingArgument {
                key: self.key.clone(),
                argument: missing.clone(),
            });
        }

        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Slot(name) => {
                    if let Some(value) = arguments.get(name) {
                        output.push_str(value);
                    }
                }
            }
        }
        Ok(output)
    }

    fn parse(key: String, raw: RawPrompt, source: PromptSource) -> Result<Self, PromptError> {
        let (segments, placeholders) = parse_template(&raw.template);
        let required = if raw.required.is_empty() {
            placeholders
        } else {
            let mut declared = BTreeSet::new();
            for argument in raw.required {
                let argument = argument.trim().to_string();
                if !placeholders.contains(&argument) {
                    return Err(PromptError::InvalidRequired { key, argument });
                }
                declared.insert(argument);
            }
            declared
        };

        Ok(Self {
            key,
            description: raw.description,
            source,
            segments,
            required,
        })
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt `{0}` not found")]
    NotFound(String),
    #[error("missing argument `{argument}` when rendering prompt `{key}`")]
    MissingArgument { key: String, argument: String },
    #[error("failed to read prompt file `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse built-in prompt definitions: {0}")]
    ParseBuiltIn(toml::de::Error),
    #[error("failed to parse prompt file `{path}` as TOML: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to parse prompt file `{path}` as YAML: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("prompt `{key}` declares required argument `{argument}` with no matching placeholder")]
    InvalidRequired { key: String, argument: String },
}

/// Built-in templates overlaid with any custom directories, keyed by name.
#[derive(Debug)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, PromptTemplate>,
    directories: Vec<PathBuf>,
}

impl PromptRegistry {
    pub fn new() -> Result<Self, PromptError> {
        Self::with_custom_directories::<PathBuf>(&[])
    }

    pub fn from_prompt_config(config: &PromptConfig) -> Result<Self, PromptError> {
        Self::with_custom_directories(&config.custom_directories)
    }

    pub fn with_custom_directories<P: AsRef<Path>>(directories: &[P]) -> Result<Self, PromptError> {
        let mut registry = Self {
            prompts: BTreeMap::new(),
            directories: directories
                .iter()
                .map(|p| p.as_ref().to_path_buf())
                .collect(),
        };
        registry.reload()?;
        Ok(registry)
    }

    pub fn reload(&mut self) -> Result<(), PromptError> {
        let mut prompts = BTreeMap::new();
        let document: PromptDocument =
            toml::from_str(BUILT_IN_PROMPTS).map_err(PromptError::ParseBuiltIn)?;
        insert_document(&mut prompts, document, &PromptSource::BuiltIn)?;

        for dir in &self.directories {
            load_directory(dir, &mut prompts)?;
        }

        self.prompts = prompts;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&PromptTemplate> {
        self.prompts.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }

    pub fn format(&self, key: &str, args: &PromptArguments) -> Result<String, PromptError> {
        self.get(key)
            .ok_or_else(|| PromptError::NotFound(key.to_string()))?
            .render(args)
    }
}

fn insert_document(
    prompts: &mut BTreeMap<String, PromptTemplate>,
    document: PromptDocument,
    source: &PromptSource,
) -> Result<(), PromptError> {
    for (key, raw) in document.prompts {
        let template = PromptTemplate::parse(key.clone(), raw, source.clone())?;
        prompts.insert(key, template);
    }
    Ok(())
}

fn load_directory(
    dir: &Path,
    prompts: &mut BTreeMap<String, PromptTemplate>,
) -> Result<(), PromptError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    for path in files {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if !matches!(ext.as_str(), "toml" | "yaml" | "yml") {
            continue;
        }

        let contents = fs::read_to_string(&path).map_err(io_error(&path))?;
        let document: PromptDocument = if ext == "toml" {
            toml::from_str(&contents).map_err(|source| PromptError::ParseToml {
                path: path.clone(),
                source,
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|source| PromptError::ParseYaml {
                path: path.clone(),
                source,
            })?
        };
        insert_document(prompts, document, &PromptSource::File(path.clone()))?;
    }

    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PromptError {
    let path = path.to_path_buf();
    move |source| PromptError::Io { path, source }
}

#[derive(Debug, Deserialize)]
struct PromptDocument {
    #[serde(default)]
    prompts: BTreeMap<String, RawPrompt>,
}

#[derive(Debug, Deserialize)]
struct RawPrompt {
    #[serde(alias = "text")]
    template: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: Vec<String>,
}

#[derive(Clone, Debug)]
enum Segment {
    Text(String),
    Slot(String),
}

fn parse_template(template: &str) -> (Vec<Segment>, BTreeSet<String>) {
    let mut segments = Vec::new();
    let mut placeholders = BTreeSet::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        text.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            text.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            text.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail[1..].find('}') {
            Some(end) => {
                let name = tail[1..=end].trim();
                if name.is_empty() {
                    text.push_str("{}");
                } else {
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    placeholders.insert(name.to_string());
                    segments.push(Segment::Slot(name.to_string()));
                }
                rest = &tail[end + 2..];
            }
            None => {
                text.push_str(tail);
                rest = "";
            }
        }
    }

    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    (segments, placeholders)
}
