use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use crate::extraction::{BraceSpanExtractor, StructuredExtractor};
use crate::gateway::{
    FragmentStream, GatewayError, GenerationRequest, GenerationResult, InvalidRequest,
    ModelGateway,
};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::prompts::{
    BlogPostParams, EbookChapterParams, EbookOutlineParams, HistoricalNarrativeParams,
    LengthLimit, MarketAnalysisParams, Platform, PlatformSelection, PromptBuilder, PromptError,
    PromptRegistry, ScrapedContentParams, SocialPostParams,
};
use crate::router::{ContentRouter, ContentType, RouterError};

mod analysis;

const CREATIVE_TEMPERATURE: f32 = 0.7;
const WORDS_PER_OUTLINE_CHAPTER: u32 = 150;
const SCRAPED_CONTENT_BUDGET: u32 = 2048;

static DEFAULT_EXTRACTOR: BraceSpanExtractor = BraceSpanExtractor;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    BlogPost,
    SocialPost(Platform),
    EbookOutline,
    EbookChapter,
    MarketAnalysis,
    HistoricalNarrative,
    Summary,
    Categorization,
    Extraction,
    ScrapedContent,
    Prompt,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlogPost => f.write_str("blog post"),
            Self::SocialPost(platform) => write!(f, "{platform} post"),
            Self::EbookOutline => f.write_str("ebook outline"),
            Self::EbookChapter => f.write_str("ebook chapter"),
            Self::MarketAnalysis => f.write_str("market analysis"),
            Self::HistoricalNarrative => f.write_str("historical narrative"),
            Self::Summary => f.write_str("summary"),
            Self::Categorization => f.write_str("categorization"),
            Self::Extraction => f.write_str("key information extraction"),
            Self::ScrapedContent => f.write_str("scraped content"),
            Self::Prompt => f.write_str("prompt"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Route(#[from] RouterError),
    #[error("failed to build {operation} prompt: {source}")]
    Prompt {
        operation: Operation,
        #[source]
        source: PromptError,
    },
    #[error("invalid {operation} request: {source}")]
    Request {
        operation: Operation,
        #[source]
        source: InvalidRequest,
    },
    #[error("{operation} generation for `{content_type}` failed: {source}")]
    Gateway {
        operation: Operation,
        content_type: ContentType,
        #[source]
        source: GatewayError,
    },
}

/// Result of a social post request: one text, or one text per platform when
/// the selection fans out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocialPosts {
    Single { platform: Platform, text: String },
    PerPlatform(BTreeMap<Platform, String>),
}

impl SocialPosts {
    pub fn len(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::PerPlatform(posts) => posts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (Platform, &str)> + '_> {
        match self {
            Self::Single { platform, text } => Box::new(std::iter::once((*platform, text.as_str()))),
            Self::PerPlatform(posts) => {
                Box::new(posts.iter().map(|(platform, text)| (*platform, text.as_str())))
            }
        }
    }
}

/// Fragments of one streamed generation. Logs the same completion record as
/// a blocking call once the underlying stream ends.
pub struct TracedStream<'a> {
    inner: FragmentStream,
    sink: &'a dyn LogSink,
    operation: Operation,
    model: String,
    started: Instant,
    char_count: usize,
    finished: bool,
}

impl TracedStream<'_> {
    fn finish(&mut self, error: Option<&GatewayError>) {
        self.finished = true;
        let record = match error {
            None => LogRecord::new(
                LogLevel::Info,
                format!(
                    "{} ready: {} chars from `{}` in {:.2?}",
                    self.operation,
                    self.char_count,
                    self.model,
                    self.started.elapsed()
                ),
            ),
            Some(err) => LogRecord::warn(format!(
                "{} stream from `{}` failed after {} chars: {err}",
                self.operation, self.model, self.char_count
            )),
        };
        self.sink.log(record);
    }
}

impl Iterator for TracedStream<'_> {
    type Item = Result<String, GatewayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.inner.next() {
            Some(Ok(fragment)) => {
                self.char_count += fragment.chars().count();
                Some(Ok(fragment))
            }
            Some(Err(err)) => {
                self.finish(Some(&err));
                Some(Err(err))
            }
            None => {
                self.finish(None);
                None
            }
        }
    }
}

/// `max(1, multiplier × target)`.
pub fn token_budget(multiplier: u32, target: u32) -> u32 {
    multiplier.saturating_mul(target).max(1)
}

pub struct ContentGenerator<'a> {
    gateway: &'a dyn ModelGateway,
    router: &'a ContentRouter,
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
    extractor: &'a dyn StructuredExtractor,
}

impl<'a> ContentGenerator<'a> {
    pub fn new(
        gateway: &'a dyn ModelGateway,
        router: &'a ContentRouter,
        prompts: &'a PromptRegistry,
        sink: &'a dyn LogSink,
    ) -> Self {
        Self {
            gateway,
            router,
            prompts,
            sink,
            extractor: &DEFAULT_EXTRACTOR,
        }
    }

    pub fn with_extractor(mut self, extractor: &'a dyn StructuredExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn generate_blog_post(
        &self,
        params: &BlogPostParams,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate(
            Operation::BlogPost,
            ContentType::Blog,
            params,
            token_budget(2, params.word_count),
            CREATIVE_TEMPERATURE,
        )
    }

    pub fn generate_social_post(
        &self,
        params: &SocialPostParams,
    ) -> Result<SocialPosts, GenerationError> {
        match params.selection() {
            PlatformSelection::One(platform) => {
                let text = self.social_post(params, platform)?.text;
                Ok(SocialPosts::Single { platform, text })
            }
            PlatformSelection::All => {
                let mut posts = BTreeMap::new();
                for platform in Platform::ALL {
                    let result = self.social_post(params, platform)?;
                    posts.insert(platform, result.text);
                }
                Ok(SocialPosts::PerPlatform(posts))
            }
        }
    }

    pub fn generate_ebook_outline(
        &self,
        params: &EbookOutlineParams,
    ) -> Result<GenerationResult, GenerationError> {
        let words = WORDS_PER_OUTLINE_CHAPTER.saturating_mul(params.num_chapters);
        self.generate(
            Operation::EbookOutline,
            ContentType::Ebook,
            params,
            token_budget(2, words),
            CREATIVE_TEMPERATURE,
        )
    }

    pub fn generate_ebook_chapter(
        &self,
        params: &EbookChapterParams,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate(
            Operation::EbookChapter,
            ContentType::Ebook,
            params,
            token_budget(2, params.word_count),
            CREATIVE_TEMPERATURE,
        )
    }

    pub fn generate_market_analysis(
        &self,
        params: &MarketAnalysisParams,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate(
            Operation::MarketAnalysis,
            ContentType::Analysis,
            params,
            token_budget(2, params.word_count),
            CREATIVE_TEMPERATURE,
        )
    }

    pub fn generate_historical_narrative(
        &self,
        params: &HistoricalNarrativeParams,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate(
            Operation::HistoricalNarrative,
            ContentType::Script,
            params,
            token_budget(2, params.word_count),
            CREATIVE_TEMPERATURE,
        )
    }

    pub fn process_scraped_content(
        &self,
        params: &ScrapedContentParams,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate(
            Operation::ScrapedContent,
            ContentType::Article,
            params,
            SCRAPED_CONTENT_BUDGET,
            CREATIVE_TEMPERATURE,
        )
    }

    pub fn stream_blog_post(
        &self,
        params: &BlogPostParams,
    ) -> Result<TracedStream<'a>, GenerationError> {
        let operation = Operation::BlogPost;
        let model = self.router.resolve_type(ContentType::Blog)?;
        let prompt = params
            .build(self.prompts)
            .map_err(|source| GenerationError::Prompt { operation, source })?;
        self.open_stream(
            operation,
            ContentType::Blog,
            model,
            prompt,
            token_budget(2, params.word_count),
        )
    }

    /// Streams an already rendered prompt through the model routed for
    /// `content_type`.
    pub fn stream_prompt(
        &self,
        content_type: ContentType,
        prompt: impl Into<String>,
        max_tokens: u32,
    ) -> Result<TracedStream<'a>, GenerationError> {
        let model = self.router.resolve_type(content_type)?;
        self.open_stream(
            Operation::Prompt,
            content_type,
            model,
            prompt.into(),
            max_tokens.max(1),
        )
    }

    fn social_post(
        &self,
        params: &SocialPostParams,
        platform: Platform,
    ) -> Result<GenerationResult, GenerationError> {
        let operation = Operation::SocialPost(platform);
        let model = self.router.resolve_type(ContentType::Social)?;
        let prompt = params
            .build_for(platform, self.prompts)
            .map_err(|source| GenerationError::Prompt { operation, source })?;
        let target = match platform.length_limit() {
            LengthLimit::Characters(chars) => chars,
            LengthLimit::Words { max, .. } => max,
        };
        self.execute(
            operation,
            ContentType::Social,
            model,
            prompt,
            token_budget(2, target),
            CREATIVE_TEMPERATURE,
        )
    }

    fn generate(
        &self,
        operation: Operation,
        content_type: ContentType,
        params: &dyn PromptBuilder,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GenerationResult, GenerationError> {
        let model = self.router.resolve_type(content_type)?;
        let prompt = params
            .build(self.prompts)
            .map_err(|source| GenerationError::Prompt { operation, source })?;
        self.execute(operation, content_type, model, prompt, max_tokens, temperature)
    }

    fn execute(
        &self,
        operation: Operation,
        content_type: ContentType,
        model: &str,
        prompt: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GenerationResult, GenerationError> {
        let request = GenerationRequest::new(prompt, model, max_tokens, temperature)
            .map_err(|source| GenerationError::Request { operation, source })?;
        self.log_request(operation, &request);

        let result = self
            .gateway
            .complete(&request)
            .map_err(|source| GenerationError::Gateway {
                operation,
                content_type,
                source,
            })?;

        self.log(
            LogLevel::Info,
            format!(
                "{operation} ready: {} chars from `{}` in {:.2?}",
                result.char_count, result.model, result.elapsed
            ),
        );
        Ok(result)
    }

    fn open_stream(
        &self,
        operation: Operation,
        content_type: ContentType,
        model: &str,
        prompt: String,
        max_tokens: u32,
    ) -> Result<TracedStream<'a>, GenerationError> {
        let request = GenerationRequest::new(prompt, model, max_tokens, CREATIVE_TEMPERATURE)
            .map_err(|source| GenerationError::Request { operation, source })?
            .streaming();
        self.log_request(operation, &request);

        let inner = self
            .gateway
            .stream(&request)
            .map_err(|source| GenerationError::Gateway {
                operation,
                content_type,
                source,
            })?;
        Ok(TracedStream {
            inner,
            sink: self.sink,
            operation,
            model: request.model().to_string(),
            started: Instant::now(),
            char_count: 0,
            finished: false,
        })
    }

    fn log_request(&self, operation: Operation, request: &GenerationRequest) {
        self.log(
            LogLevel::Debug,
            format!(
                "{operation} request {} -> `{}` (prompt {} chars, max_tokens {}, temperature {}{})",
                request.id(),
                request.model(),
                request.prompt().chars().count(),
                request.max_tokens(),
                request.temperature(),
                if request.stream() { ", streaming" } else { "" }
            ),
        );
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message));
    }
}
