pub mod artifact;
pub mod config;
pub mod extraction;
pub mod gateway;
pub mod generator;
pub mod logging;
pub mod prompts;
pub mod router;

pub use artifact::{
    sanitize_title, Artifact, ArtifactContent, ArtifactError, ArtifactFormat, ArtifactStore,
};
pub use config::{
    Config, ConfigError, ConfigStore, GatewayConfig, ModelConfig, OutputConfig, PromptConfig,
    DEFAULT_BASE_URL,
};
pub use extraction::{
    BraceSpanExtractor, ExtractedInfo, KeyInformation, Sentiment, StructuredExtractor,
};
pub use gateway::{
    collect_fragments, FragmentStream, GatewayError, Generation, GenerationRequest,
    GenerationResult, InvalidRequest, ModelGateway,
};
pub use generator::{
    token_budget, ContentGenerator, GenerationError, Operation, SocialPosts, TracedStream,
};
pub use logging::{LogFacadeSink, LogLevel, LogRecord, LogSink, VecLogSink};
pub use prompts::{
    BlogPostParams, CategorizationParams, EbookChapterParams, EbookOutlineParams,
    ExtractionParams, HistoricalNarrativeParams, LengthLimit, MarketAnalysisParams, Platform,
    PlatformSelection, PromptArguments, PromptBuilder, PromptError, PromptRegistry, PromptSource,
    PromptTemplate, ScrapedContentParams, SocialPostParams, SummaryParams,
};
pub use router::{
    base_name, ContentRouter, ContentType, RouterError, Substitution, UnknownContentType,
    FALLBACK_CONTENT_TYPE,
};
