//! Turning free-form model output into [`ExtractedInfo`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    #[serde(alias = "Positive", alias = "POSITIVE")]
    Positive,
    #[serde(alias = "Negative", alias = "NEGATIVE")]
    Negative,
    #[serde(alias = "Neutral", alias = "NEUTRAL")]
    Neutral,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInfo {
    pub main_topic: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub entities: BTreeSet<String>,
    pub sentiment: Sentiment,
}

/// Outcome of an extraction. A parse failure is data, not an error: the raw
/// model text travels with it unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyInformation {
    Parsed(ExtractedInfo),
    Unparsed { error: String, raw_text: String },
}

impl KeyInformation {
    pub fn parsed(&self) -> Option<&ExtractedInfo> {
        match self {
            Self::Parsed(info) => Some(info),
            Self::Unparsed { .. } => None,
        }
    }
}

pub trait StructuredExtractor: Send + Sync {
    fn extract(&self, raw: &str) -> KeyInformation;
}

/// Parses the span between the first `{` and the last `}` of the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct BraceSpanExtractor;

impl StructuredExtractor for BraceSpanExtractor {
    fn extract(&self, raw: &str) -> KeyInformation {
        let span = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => {
                return KeyInformation::Unparsed {
                    error: "response contains no JSON object".to_string(),
                    raw_text: raw.to_string(),
                }
            }
        };

        match serde_json::from_str::<ExtractedInfo>(span) {
            Ok(info) => KeyInformation::Parsed(info),
            Err(err) => KeyInformation::Unparsed {
                error: format!("invalid JSON object: {err}"),
                raw_text: raw.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_embedded_in_prose() {
        let raw = r#"Sure! {"main_topic":"x","key_points":["a","b","c"],"entities":["E"],"sentiment":"neutral"} Thanks."#;
        let info = BraceSpanExtractor.extract(raw);
        let parsed = info.parsed().expect("parsed");
        assert_eq!(parsed.main_topic, "x");
        assert_eq!(parsed.key_points, vec!["a", "b", "c"]);
        assert!(parsed.entities.contains("E"));
        assert_eq!(parsed.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn missing_braces_keep_raw_text_verbatim() {
        let raw = "I could not find anything useful.";
        match BraceSpanExtractor.extract(raw) {
            KeyInformation::Unparsed { raw_text, .. } => assert_eq!(raw_text, raw),
            other => panic!("expected unparsed, got {other:?}"),
        }
    }

    #[test]
    fn malformed_object_is_reported_not_raised() {
        let raw = "Result: {\"main_topic\": \"x\", \"sentiment\": \"ecstatic\"}";
        match BraceSpanExtractor.extract(raw) {
            KeyInformation::Unparsed { error, raw_text } => {
                assert!(error.starts_with("invalid JSON object"));
                assert_eq!(raw_text, raw);
            }
            other => panic!("expected unparsed, got {other:?}"),
        }
    }

    #[test]
    fn entities_deduplicate_and_sentiment_accepts_capitalised() {
        let raw = r#"{"main_topic":"t","key_points":[],"entities":["A","A","B"],"sentiment":"Positive"}"#;
        let info = BraceSpanExtractor.extract(raw);
        let parsed = info.parsed().unwrap();
        assert_eq!(parsed.entities.len(), 2);
        assert_eq!(parsed.sentiment, Sentiment::Positive);
    }
}
