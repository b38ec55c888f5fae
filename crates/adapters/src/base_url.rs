use alexandrea_core::DEFAULT_BASE_URL;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AdapterError;

static API_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(api|v\d+)$").unwrap());

/// Reduces a configured URL to the service root that native `/api/*` paths
/// hang off. `http://host:11434/v1` and `http://host:11434/api/` both become
/// `http://host:11434`.
pub fn normalize_base_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }

    API_SUFFIX_RE
        .replace(trimmed, "")
        .trim_end_matches('/')
        .to_string()
}

pub(crate) fn validate_base_url(url: &str) -> Result<(), AdapterError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(AdapterError::InvalidConfig(format!(
            "base_url `{url}` must start with http:// or https://"
        )))
    }
}
