use std::collections::HashSet;

use crate::extraction::KeyInformation;
use crate::gateway::GenerationResult;
use crate::logging::LogLevel;
use crate::prompts::{CategorizationParams, ExtractionParams, SummaryParams};
use crate::router::ContentType;

use super::{token_budget, ContentGenerator, GenerationError, Operation};

const SUMMARY_TEMPERATURE: f32 = 0.3;
const CATEGORIZATION_TEMPERATURE: f32 = 0.1;
const CATEGORIZATION_BUDGET: u32 = 100;
const EXTRACTION_TEMPERATURE: f32 = 0.1;
const EXTRACTION_BUDGET: u32 = 500;

impl ContentGenerator<'_> {
    pub fn summarize(&self, params: &SummaryParams) -> Result<GenerationResult, GenerationError> {
        self.generate(
            Operation::Summary,
            ContentType::Summary,
            params,
            token_budget(2, params.max_length),
            SUMMARY_TEMPERATURE,
        )
    }

    /// Returns the categories the model picked, restricted to the supplied
    /// list and spelled as the caller spelled them.
    pub fn categorize(&self, params: &CategorizationParams) -> Result<Vec<String>, GenerationError> {
        let result = self.generate(
            Operation::Categorization,
            ContentType::Article,
            params,
            CATEGORIZATION_BUDGET,
            CATEGORIZATION_TEMPERATURE,
        )?;

        let (kept, dropped) = parse_categories(&result.text, &params.categories);
        if !dropped.is_empty() {
            self.log(
                LogLevel::Warn,
                format!(
                    "dropped categories outside the requested set: {}",
                    dropped.join(", ")
                ),
            );
        }
        Ok(kept)
    }

    pub fn extract_key_information(
        &self,
        params: &ExtractionParams,
    ) -> Result<KeyInformation, GenerationError> {
        let result = self.generate(
            Operation::Extraction,
            ContentType::Analysis,
            params,
            EXTRACTION_BUDGET,
            EXTRACTION_TEMPERATURE,
        )?;

        let info = self.extractor.extract(&result.text);
        if let KeyInformation::Unparsed { error, .. } = &info {
            self.log(
                LogLevel::Warn,
                format!("could not parse key information from `{}`: {error}", result.model),
            );
        }
        Ok(info)
    }
}

/// Splits a comma separated answer into `(kept, dropped)`.
fn parse_categories(raw: &str, allowed: &[String]) -> (Vec<String>, Vec<String>) {
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    let mut seen = HashSet::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let needle = entry.to_lowercase();
        let matched = allowed
            .iter()
            .find(|category| category.trim().to_lowercase() == needle);
        match matched {
            Some(category) => {
                if seen.insert(category.to_lowercase()) {
                    kept.push(category.clone());
                }
            }
            None => dropped.push(entry.to_string()),
        }
    }

    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn trims_and_keeps_response_order() {
        let (kept, dropped) = parse_categories("c ,  a", &categories(&["a", "b", "c"]));
        assert_eq!(kept, vec!["c", "a"]);
        assert!(dropped.is_empty());
    }

    #[test]
    fn unknown_entries_are_dropped_and_reported() {
        let (kept, dropped) =
            parse_categories("Finance, sports, , FINANCE", &categories(&["finance", "History"]));
        assert_eq!(kept, vec!["finance"]);
        assert_eq!(dropped, vec!["sports"]);
    }
}
