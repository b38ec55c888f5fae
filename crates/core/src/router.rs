use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::logging::{LogRecord, LogSink};

/// Entry consulted when a content type has no mapping of its own.
pub const FALLBACK_CONTENT_TYPE: &str = "article";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ContentType {
    Blog,
    Social,
    Summary,
    Ebook,
    Analysis,
    Script,
    Article,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Blog,
        ContentType::Social,
        ContentType::Summary,
        ContentType::Ebook,
        ContentType::Analysis,
        ContentType::Script,
        ContentType::Article,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Social => "social",
            Self::Summary => "summary",
            Self::Ebook => "ebook",
            Self::Analysis => "analysis",
            Self::Script => "script",
            Self::Article => "article",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown content type `{0}`")]
pub struct UnknownContentType(pub String);

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or(UnknownContentType(s.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("no model configured for content type `{content_type}` and no `article` fallback entry")]
    Unresolved { content_type: String },
}

/// A configured model that was swapped for the default at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substitution {
    pub content_type: String,
    pub requested: String,
    pub replacement: String,
}

/// Portion of a model identifier before its `:tag` suffix.
pub fn base_name(model: &str) -> &str {
    let trimmed = model.trim();
    trimmed.split(':').next().unwrap_or(trimmed)
}

/// Finalised content type → model mapping. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRouter {
    routes: BTreeMap<String, String>,
    substitutions: Vec<Substitution>,
}

impl ContentRouter {
    /// Uses the mapping as given, without checking availability.
    pub fn new(routes: BTreeMap<String, String>) -> Self {
        Self {
            routes: normalize_keys(routes),
            substitutions: Vec::new(),
        }
    }

    pub fn resolve_startup(
        requested: &BTreeMap<String, String>,
        available: &[String],
        default_model: &str,
        sink: &dyn LogSink,
    ) -> Self {
        let routes = normalize_keys(requested.clone());
        if available.is_empty() {
            sink.log(LogRecord::warn(
                "model service reported no available models; keeping configured routes unverified",
            ));
            return Self {
                routes,
                substitutions: Vec::new(),
            };
        }

        let available_bases: BTreeSet<&str> = available.iter().map(|m| base_name(m)).collect();
        let mut finalized = BTreeMap::new();
        let mut substitutions = Vec::new();

        for (content_type, model) in routes {
            if available_bases.contains(base_name(&model)) {
                finalized.insert(content_type, model);
                continue;
            }

            sink.log(LogRecord::warn(format!(
                "model `{}` for content type `{}` is not available; using `{}` instead",
                model, content_type, default_model
            )));
            substitutions.push(Substitution {
                content_type: content_type.clone(),
                requested: model,
                replacement: default_model.to_string(),
            });
            finalized.insert(content_type, default_model.to_string());
        }

        Self {
            routes: finalized,
            substitutions,
        }
    }

    pub fn resolve(&self, content_type: &str) -> Result<&str, RouterError> {
        let key = content_type.trim().to_lowercase();
        self.routes
            .get(&key)
            .or_else(|| self.routes.get(FALLBACK_CONTENT_TYPE))
            .map(String::as_str)
            .ok_or(RouterError::Unresolved {
                content_type: content_type.to_string(),
            })
    }

    pub fn resolve_type(&self, content_type: ContentType) -> Result<&str, RouterError> {
        self.resolve(content_type.as_str())
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }
}

fn normalize_keys(routes: BTreeMap<String, String>) -> BTreeMap<String, String> {
    routes
        .into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v))
        .collect()
}
