use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_SLUG_CHARS: usize = 50;
const EMPTY_SLUG: &str = "untitled";
const MAX_NAME_ATTEMPTS: u32 = 1_000;

/// Filesystem-safe form of a title. Anything other than alphanumerics, `-`
/// and `_` separates words; words are joined with `_`.
pub fn sanitize_title(title: &str) -> String {
    let joined = title
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let slug = if joined.chars().count() > MAX_SLUG_CHARS {
        let truncated: String = joined.chars().take(MAX_SLUG_CHARS).collect();
        truncated.trim_end_matches('_').to_string()
    } else {
        joined
    };

    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Text,
    Markdown,
    Json,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArtifactContent {
    Text(String),
    Json(Value),
}

impl ArtifactContent {
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    fn render(&self, format: ArtifactFormat) -> Result<String, serde_json::Error> {
        match (self, format) {
            (Self::Text(text), ArtifactFormat::Json) => serde_json::to_string_pretty(text),
            (Self::Text(text), _) => Ok(text.clone()),
            (Self::Json(value), _) => serde_json::to_string_pretty(value),
        }
    }
}

impl From<String> for ArtifactContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ArtifactContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for ArtifactContent {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// A persisted output. Never modified once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub category: String,
    pub title: String,
    pub format: ArtifactFormat,
    pub timestamp: u64,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to create directory `{path}`: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write artifact `{path}`: {source}")]
    WriteFile { path: PathBuf, source: io::Error },
    #[error("failed to serialise artifact content: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no free file name for `{stem}` under `{dir}`")]
    NameExhausted { dir: PathBuf, stem: String },
}

type Clock = Box<dyn Fn() -> SystemTime + Send + Sync>;

/// Writes artifacts under `<root>/<category>/<slug>_<unix_ts>.<ext>`.
pub struct ArtifactStore {
    root: PathBuf,
    clock: Clock,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            clock: Box::new(SystemTime::now),
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> SystemTime + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save(
        &self,
        content: impl Into<ArtifactContent>,
        category: &str,
        title: &str,
        format: ArtifactFormat,
    ) -> Result<Artifact, ArtifactError> {
        let body = content.into().render(format)?;
        let category = sanitize_title(category);
        let dir = self.root.join(&category);
        fs::create_dir_all(&dir).map_err(|source| ArtifactError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let timestamp = (self.clock)()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let stem = format!("{}_{timestamp}", sanitize_title(title));
        let path = write_new_file(&dir, &stem, format.extension(), body.as_bytes())?;

        log::info!(target: "alexandrea::artifact", "saved {}", path.display());
        Ok(Artifact {
            category,
            title: title.to_string(),
            format,
            timestamp,
            path,
        })
    }
}

fn write_new_file(dir: &Path, stem: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{attempt}.{ext}")
        };
        let path = dir.join(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(ArtifactError::WriteFile { path, source }),
        };
        file.write_all(bytes)
            .map_err(|source| ArtifactError::WriteFile {
                path: path.clone(),
                source,
            })?;
        return Ok(path);
    }

    Err(ArtifactError::NameExhausted {
        dir: dir.to_path_buf(),
        stem: stem.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fixed_clock() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn sanitize_replaces_punctuation_runs() {
        assert_eq!(sanitize_title("A/B: Test!!"), "A_B_Test");
        assert_eq!(sanitize_title("already_clean-title"), "already_clean-title");
        assert_eq!(sanitize_title("  spaced   out  "), "spaced_out");
        assert_eq!(sanitize_title("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_title("!!!"), "untitled");
    }

    #[test]
    fn sanitize_is_bounded_and_idempotent() {
        let long = "word ".repeat(40);
        let slug = sanitize_title(&long);
        assert!(slug.chars().count() <= 50);
        assert!(!slug.ends_with('_'));
        assert_eq!(sanitize_title(&slug), slug);
    }

    #[test]
    fn save_writes_under_category_with_timestamp() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).with_clock(fixed_clock);

        let artifact = store
            .save("# Hello", "Blog Posts", "Hello World?", ArtifactFormat::Markdown)
            .unwrap();

        assert_eq!(artifact.category, "Blog_Posts");
        assert_eq!(artifact.timestamp, 1_700_000_000);
        assert_eq!(
            artifact.path,
            dir.path().join("Blog_Posts").join("Hello_World_1700000000.md")
        );
        assert_eq!(fs::read_to_string(&artifact.path).unwrap(), "# Hello");
    }

    #[test]
    fn same_second_collisions_get_a_suffix() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).with_clock(fixed_clock);

        let first = store.save("one", "social", "post", ArtifactFormat::Text).unwrap();
        let second = store.save("two", "social", "post", ArtifactFormat::Text).unwrap();

        assert_ne!(first.path, second.path);
        assert!(second.path.ends_with("post_1700000000_1.txt"));
        assert_eq!(fs::read_to_string(&first.path).unwrap(), "one");
    }

    #[test]
    fn json_format_pretty_prints_content() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).with_clock(fixed_clock);

        let value = serde_json::json!({"categories": ["a", "c"]});
        let artifact = store
            .save(value.clone(), "analysis", "cats", ArtifactFormat::Json)
            .unwrap();
        let written: Value =
            serde_json::from_str(&fs::read_to_string(&artifact.path).unwrap()).unwrap();
        assert_eq!(written, value);

        let text = store
            .save("plain", "analysis", "text", ArtifactFormat::Json)
            .unwrap();
        assert_eq!(fs::read_to_string(&text.path).unwrap(), "\"plain\"");
    }

    #[test]
    fn filesystem_errors_propagate() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "file, not a directory").unwrap();

        let store = ArtifactStore::new(&blocker);
        let err = store
            .save("x", "blog", "title", ArtifactFormat::Text)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::CreateDir { .. }));
    }
}
