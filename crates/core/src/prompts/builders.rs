use std::fmt;

use super::{PromptArguments, PromptError, PromptRegistry};

const NO_DATA_POINTS: &str = "No additional data points were provided.";

/// Typed parameters for one template. Building is pure: the same parameters
/// and registry always yield the same prompt text.
pub trait PromptBuilder {
    fn template_key(&self) -> &'static str;

    fn arguments(&self) -> PromptArguments;

    fn build(&self, prompts: &PromptRegistry) -> Result<String, PromptError> {
        prompts.format(self.template_key(), &self.arguments())
    }
}

fn render_data_points(points: &[String]) -> String {
    let lines: Vec<String> = points
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| format!("- {p}"))
        .collect();
    if lines.is_empty() {
        NO_DATA_POINTS.to_string()
    } else {
        lines.join("\n")
    }
}

fn args<const N: usize>(pairs: [(&str, String); N]) -> PromptArguments {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlogPostParams {
    pub topic: String,
    pub word_count: u32,
    pub tone: String,
    pub data_points: Vec<String>,
}

impl BlogPostParams {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            word_count: 800,
            tone: "informative".to_string(),
            data_points: Vec::new(),
        }
    }
}

impl PromptBuilder for BlogPostParams {
    fn template_key(&self) -> &'static str {
        "blog_post"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("topic", self.topic.trim().to_string()),
            ("word_count", self.word_count.to_string()),
            ("tone", self.tone.trim().to_string()),
            ("data_points", render_data_points(&self.data_points)),
        ])
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Platform {
    Twitter,
    LinkedIn,
    Facebook,
    Instagram,
}

/// Length limit a platform imposes on a post.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LengthLimit {
    Characters(u32),
    Words { min: u32, max: u32 },
}

impl Platform {
    /// Fixed order used when fanning out to every platform.
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Facebook,
        Platform::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::LinkedIn => "linkedin",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
        }
    }

    pub fn length_limit(&self) -> LengthLimit {
        match self {
            Self::Twitter => LengthLimit::Characters(280),
            Self::LinkedIn => LengthLimit::Words { min: 150, max: 200 },
            Self::Facebook => LengthLimit::Words { min: 80, max: 120 },
            Self::Instagram => LengthLimit::Words { min: 100, max: 150 },
        }
    }

    fn template_key(&self) -> &'static str {
        match self {
            Self::Twitter => "social_post_twitter",
            Self::LinkedIn => "social_post_linkedin",
            Self::Facebook => "social_post_facebook",
            Self::Instagram => "social_post_instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlatformSelection {
    One(Platform),
    All,
}

impl PlatformSelection {
    /// `"all"` and unrecognised names both select every platform.
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        let alias = match normalized.as_str() {
            "x" => "twitter",
            "ig" => "instagram",
            other => other,
        };
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str() == alias)
            .map_or(Self::All, Self::One)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        match self {
            Self::One(platform) => vec![*platform],
            Self::All => Platform::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SocialPostParams {
    pub topic: String,
    pub platform: String,
    pub tone: String,
    pub data_points: Vec<String>,
}

impl SocialPostParams {
    pub fn new(topic: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            platform: platform.into(),
            tone: "engaging".to_string(),
            data_points: Vec::new(),
        }
    }

    pub fn selection(&self) -> PlatformSelection {
        PlatformSelection::parse(&self.platform)
    }

    pub fn build_for(
        &self,
        platform: Platform,
        prompts: &PromptRegistry,
    ) -> Result<String, PromptError> {
        let args = args([
            ("topic", self.topic.trim().to_string()),
            ("tone", self.tone.trim().to_string()),
            ("data_points", render_data_points(&self.data_points)),
        ]);
        prompts.format(platform.template_key(), &args)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EbookOutlineParams {
    pub title: String,
    pub subject: String,
    pub num_chapters: u32,
    pub audience: String,
}

impl PromptBuilder for EbookOutlineParams {
    fn template_key(&self) -> &'static str {
        "ebook_outline"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("title", self.title.trim().to_string()),
            ("subject", self.subject.trim().to_string()),
            ("num_chapters", self.num_chapters.to_string()),
            ("audience", self.audience.trim().to_string()),
        ])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EbookChapterParams {
    pub book_title: String,
    pub chapter_number: u32,
    pub chapter_title: String,
    pub outline: String,
    pub word_count: u32,
}

impl PromptBuilder for EbookChapterParams {
    fn template_key(&self) -> &'static str {
        "ebook_chapter"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("book_title", self.book_title.trim().to_string()),
            ("chapter_number", self.chapter_number.to_string()),
            ("chapter_title", self.chapter_title.trim().to_string()),
            ("outline", self.outline.trim().to_string()),
            ("word_count", self.word_count.to_string()),
        ])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarketAnalysisParams {
    pub subject: String,
    pub timeframe: String,
    pub data_points: Vec<String>,
    pub word_count: u32,
}

impl PromptBuilder for MarketAnalysisParams {
    fn template_key(&self) -> &'static str {
        "market_analysis"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("subject", self.subject.trim().to_string()),
            ("timeframe", self.timeframe.trim().to_string()),
            ("data_points", render_data_points(&self.data_points)),
            ("word_count", self.word_count.to_string()),
        ])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistoricalNarrativeParams {
    pub event: String,
    pub period: String,
    pub data_points: Vec<String>,
    pub word_count: u32,
}

impl PromptBuilder for HistoricalNarrativeParams {
    fn template_key(&self) -> &'static str {
        "historical_narrative"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("event", self.event.trim().to_string()),
            ("period", self.period.trim().to_string()),
            ("data_points", render_data_points(&self.data_points)),
            ("word_count", self.word_count.to_string()),
        ])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SummaryParams {
    pub text: String,
    pub max_length: u32,
}

impl PromptBuilder for SummaryParams {
    fn template_key(&self) -> &'static str {
        "summarize"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("text", self.text.clone()),
            ("max_length", self.max_length.to_string()),
        ])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CategorizationParams {
    pub text: String,
    pub categories: Vec<String>,
}

impl PromptBuilder for CategorizationParams {
    fn template_key(&self) -> &'static str {
        "categorize"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("text", self.text.clone()),
            ("categories", self.categories.join(", ")),
        ])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionParams {
    pub text: String,
}

impl PromptBuilder for ExtractionParams {
    fn template_key(&self) -> &'static str {
        "extract_key_information"
    }

    fn arguments(&self) -> PromptArguments {
        args([("text", self.text.clone())])
    }
}

/// A scraped record as handed over by a collector.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrapedContentParams {
    pub title: String,
    pub content: String,
}

impl PromptBuilder for ScrapedContentParams {
    fn template_key(&self) -> &'static str {
        "process_content"
    }

    fn arguments(&self) -> PromptArguments {
        args([
            ("title", self.title.trim().to_string()),
            ("content", self.content.trim().to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PromptRegistry {
        PromptRegistry::new().expect("built-in prompts")
    }

    #[test]
    fn blog_prompt_is_deterministic() {
        let prompts = registry();
        let mut params = BlogPostParams::new("Ancient libraries");
        params.word_count = 1200;
        params.data_points = vec!["Alexandria held ~400k scrolls".into(), "  ".into()];

        let first = params.build(&prompts).unwrap();
        let second = params.clone().build(&prompts).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("about 1200 words"));
        assert!(first.contains("- Alexandria held ~400k scrolls"));
        assert!(!first.contains("- \n"));
    }

    #[test]
    fn empty_data_points_render_placeholder_sentence() {
        let prompts = registry();
        let params = MarketAnalysisParams {
            subject: "semiconductors".into(),
            timeframe: "Q3 2024".into(),
            data_points: Vec::new(),
            word_count: 600,
        };
        let prompt = params.build(&prompts).unwrap();
        assert!(prompt.contains(NO_DATA_POINTS));
        assert!(prompt.contains("covering Q3 2024"));
    }

    #[test]
    fn platform_selection_parses_known_names_and_falls_back_to_all() {
        assert_eq!(
            PlatformSelection::parse("LinkedIn"),
            PlatformSelection::One(Platform::LinkedIn)
        );
        assert_eq!(
            PlatformSelection::parse("x"),
            PlatformSelection::One(Platform::Twitter)
        );
        assert_eq!(PlatformSelection::parse("all"), PlatformSelection::All);
        assert_eq!(PlatformSelection::parse("mastodon"), PlatformSelection::All);
        assert_eq!(PlatformSelection::All.platforms(), Platform::ALL.to_vec());
    }

    #[test]
    fn each_platform_gets_its_own_constraints() {
        let prompts = registry();
        let params = SocialPostParams::new("library funding", "all");

        let twitter = params.build_for(Platform::Twitter, &prompts).unwrap();
        let linkedin = params.build_for(Platform::LinkedIn, &prompts).unwrap();
        let instagram = params.build_for(Platform::Instagram, &prompts).unwrap();

        assert!(twitter.contains("280 characters"));
        assert!(twitter.contains("2-3 relevant hashtags"));
        assert!(linkedin.contains("150-200 words"));
        assert!(instagram.contains("5-10 relevant hashtags"));
        assert_eq!(Platform::Twitter.length_limit(), LengthLimit::Characters(280));
    }

    #[test]
    fn categorization_lists_categories_in_order() {
        let prompts = registry();
        let params = CategorizationParams {
            text: "Stocks rallied.".into(),
            categories: vec!["finance".into(), "history".into()],
        };
        let prompt = params.build(&prompts).unwrap();
        assert!(prompt.contains("only these categories: finance, history"));
    }

    #[test]
    fn scraped_content_uses_title_content_framing() {
        let prompts = registry();
        let params = ScrapedContentParams {
            title: " Fall of Rome ".into(),
            content: "In 476 AD...".into(),
        };
        assert_eq!(
            params.build(&prompts).unwrap(),
            "Title: Fall of Rome\nContent: In 476 AD..."
        );
    }
}
