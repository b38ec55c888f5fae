use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use alexandrea_adapters::{AdapterError, OllamaGateway};
use alexandrea_core::{
    token_budget, ArtifactContent, ArtifactError, ArtifactFormat, ArtifactStore, BlogPostParams,
    CategorizationParams, ConfigError, ConfigStore, ContentGenerator, ContentRouter, ContentType,
    EbookChapterParams, EbookOutlineParams, ExtractionParams, GatewayError,
    GenerationError, HistoricalNarrativeParams, LogFacadeSink, MarketAnalysisParams,
    ModelGateway, PromptBuilder, PromptError, PromptRegistry, PromptSource, ScrapedContentParams,
    SocialPostParams, SummaryParams, TracedStream,
};
use clap::{Args, Parser, Subcommand};
use log::info;
use thiserror::Error;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = RunOptions {
        save: !cli.no_save,
    };

    match cli.command {
        Command::Config(command) => handle_config(&cli.config, command),
        Command::Prompts => list_prompts(&cli.config),
        Command::Models => show_models(&cli.config),
        Command::Blog(args) => Pipeline::open(&cli.config)?.blog(args, options),
        Command::Social(args) => Pipeline::open(&cli.config)?.social(args, options),
        Command::Outline(args) => Pipeline::open(&cli.config)?.outline(args, options),
        Command::Chapter(args) => Pipeline::open(&cli.config)?.chapter(args, options),
        Command::Analysis(args) => Pipeline::open(&cli.config)?.analysis(args, options),
        Command::Narrative(args) => Pipeline::open(&cli.config)?.narrative(args, options),
        Command::Summarize(args) => Pipeline::open(&cli.config)?.summarize(args, options),
        Command::Categorize(args) => Pipeline::open(&cli.config)?.categorize(args, options),
        Command::Extract(args) => Pipeline::open(&cli.config)?.extract(args, options),
        Command::Process(args) => Pipeline::open(&cli.config)?.process(args, options),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

fn handle_config(config_path: &Path, command: ConfigCommand) -> Result<(), CliError> {
    let store = ConfigStore::open(config_path.to_path_buf())?;
    match command {
        ConfigCommand::Init(args) => {
            if store.exists() && !args.force {
                return Err(CliError::ConfigExists(store.path().to_path_buf()));
            }
            store.save()?;
            info!("wrote configuration to {}", store.path().display());
            Ok(())
        }
        ConfigCommand::Show => {
            let rendered =
                serde_json::to_string_pretty(store.config()).map_err(ConfigError::from)?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn list_prompts(config_path: &Path) -> Result<(), CliError> {
    let store = ConfigStore::open(config_path.to_path_buf())?;
    let prompts = PromptRegistry::from_prompt_config(&store.config().prompts)?;
    for key in prompts.keys() {
        let Some(template) = prompts.get(key) else {
            continue;
        };
        let source = match template.source() {
            PromptSource::BuiltIn => "built-in".to_string(),
            PromptSource::File(path) => path.display().to_string(),
        };
        let required: Vec<&str> = template.required_arguments().collect();
        println!(
            "{key:<24} {:<44} [{}] ({source})",
            template.description().unwrap_or(""),
            required.join(", ")
        );
    }
    Ok(())
}

fn show_models(config_path: &Path) -> Result<(), CliError> {
    let store = ConfigStore::open(config_path.to_path_buf())?;
    let gateway = OllamaGateway::connect(&store.config().gateway)?;
    let available = gateway.list_models();
    let sink = LogFacadeSink::new();
    let router = ContentRouter::resolve_startup(
        &store.config().models.content_types,
        &available,
        &store.config().models.default_model,
        &sink,
    );

    println!("service: {} (version {})", gateway.base_url(), gateway.version());
    println!("available models:");
    for model in &available {
        println!("  {model}");
    }
    println!("routes:");
    for (content_type, model) in router.routes() {
        println!("  {content_type:<10} -> {model}");
    }
    for substitution in router.substitutions() {
        println!(
            "  note: `{}` replaced `{}` for {}",
            substitution.replacement, substitution.requested, substitution.content_type
        );
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct RunOptions {
    save: bool,
}

/// Everything a generation subcommand needs, built once per invocation.
struct Pipeline {
    gateway: OllamaGateway,
    router: ContentRouter,
    prompts: PromptRegistry,
    artifacts: ArtifactStore,
    sink: LogFacadeSink,
}

impl Pipeline {
    fn open(config_path: &Path) -> Result<Self, CliError> {
        let store = ConfigStore::open(config_path.to_path_buf())?;
        let config = store.config();
        let sink = LogFacadeSink::new();

        let gateway = OllamaGateway::connect(&config.gateway)?;
        let router = ContentRouter::resolve_startup(
            &config.models.content_types,
            &gateway.list_models(),
            &config.models.default_model,
            &sink,
        );
        let prompts = PromptRegistry::from_prompt_config(&config.prompts)?;
        let artifacts = ArtifactStore::new(config.output.root.clone());

        Ok(Self {
            gateway,
            router,
            prompts,
            artifacts,
            sink,
        })
    }

    fn generator(&self) -> ContentGenerator<'_> {
        ContentGenerator::new(&self.gateway, &self.router, &self.prompts, &self.sink)
    }

    fn blog(&self, args: BlogArgs, options: RunOptions) -> Result<(), CliError> {
        let params = BlogPostParams {
            topic: args.topic,
            word_count: args.words,
            tone: args.tone,
            data_points: args.data,
        };
        let text = if args.stream {
            print_stream(self.generator().stream_blog_post(&params)?)?
        } else {
            print_text(self.generator().generate_blog_post(&params)?.text)
        };
        self.persist(options, text, ContentType::Blog, &params.topic, ArtifactFormat::Markdown)
    }

    fn social(&self, args: SocialArgs, options: RunOptions) -> Result<(), CliError> {
        let params = SocialPostParams {
            topic: args.topic,
            platform: args.platform,
            tone: args.tone,
            data_points: args.data,
        };
        let posts = self.generator().generate_social_post(&params)?;
        for (platform, text) in posts.iter() {
            println!("== {platform} ==\n{text}\n");
            let title = format!("{} {platform}", params.topic);
            self.persist(
                options,
                text.to_string(),
                ContentType::Social,
                &title,
                ArtifactFormat::Text,
            )?;
        }
        Ok(())
    }

    fn outline(&self, args: OutlineArgs, options: RunOptions) -> Result<(), CliError> {
        let params = EbookOutlineParams {
            title: args.title,
            subject: args.subject,
            num_chapters: args.chapters,
            audience: args.audience,
        };
        let text = print_text(self.generator().generate_ebook_outline(&params)?.text);
        let title = format!("{} outline", params.title);
        self.persist(options, text, ContentType::Ebook, &title, ArtifactFormat::Markdown)
    }

    fn chapter(&self, args: ChapterArgs, options: RunOptions) -> Result<(), CliError> {
        let outline = args.outline.read()?;
        let params = EbookChapterParams {
            book_title: args.book_title,
            chapter_number: args.number,
            chapter_title: args.title,
            outline,
            word_count: args.words,
        };
        let text = if args.stream {
            self.stream_built(&params, ContentType::Ebook, params.word_count)?
        } else {
            print_text(self.generator().generate_ebook_chapter(&params)?.text)
        };
        let title = format!(
            "{} chapter {} {}",
            params.book_title, params.chapter_number, params.chapter_title
        );
        self.persist(options, text, ContentType::Ebook, &title, ArtifactFormat::Markdown)
    }

    fn analysis(&self, args: AnalysisArgs, options: RunOptions) -> Result<(), CliError> {
        let params = MarketAnalysisParams {
            subject: args.subject,
            timeframe: args.timeframe,
            data_points: args.data,
            word_count: args.words,
        };
        let text = if args.stream {
            self.stream_built(&params, ContentType::Analysis, params.word_count)?
        } else {
            print_text(self.generator().generate_market_analysis(&params)?.text)
        };
        let title = format!("{} {}", params.subject, params.timeframe);
        self.persist(options, text, ContentType::Analysis, &title, ArtifactFormat::Markdown)
    }

    fn narrative(&self, args: NarrativeArgs, options: RunOptions) -> Result<(), CliError> {
        let params = HistoricalNarrativeParams {
            event: args.event,
            period: args.period,
            data_points: args.data,
            word_count: args.words,
        };
        let text = if args.stream {
            self.stream_built(&params, ContentType::Script, params.word_count)?
        } else {
            print_text(self.generator().generate_historical_narrative(&params)?.text)
        };
        self.persist(options, text, ContentType::Script, &params.event, ArtifactFormat::Markdown)
    }

    fn summarize(&self, args: SummarizeArgs, options: RunOptions) -> Result<(), CliError> {
        let params = SummaryParams {
            text: args.input.read()?,
            max_length: args.max_length,
        };
        let text = print_text(self.generator().summarize(&params)?.text);
        let title = args.title.unwrap_or_else(|| "summary".to_string());
        self.persist(options, text, ContentType::Summary, &title, ArtifactFormat::Text)
    }

    fn categorize(&self, args: CategorizeArgs, options: RunOptions) -> Result<(), CliError> {
        let params = CategorizationParams {
            text: args.input.read()?,
            categories: args.categories,
        };
        let categories = self.generator().categorize(&params)?;
        println!("{}", categories.join(", "));
        let content = serde_json::json!({ "categories": categories });
        let title = args.title.unwrap_or_else(|| "categories".to_string());
        self.persist(options, content, ContentType::Article, &title, ArtifactFormat::Json)
    }

    fn extract(&self, args: ExtractArgs, options: RunOptions) -> Result<(), CliError> {
        let params = ExtractionParams {
            text: args.input.read()?,
        };
        let info = self.generator().extract_key_information(&params)?;
        let content = ArtifactContent::from_serialize(&info).map_err(ArtifactError::from)?;
        if let ArtifactContent::Json(value) = &content {
            let rendered = serde_json::to_string_pretty(value).map_err(ArtifactError::from)?;
            println!("{rendered}");
        }
        let title = args.title.unwrap_or_else(|| "key information".to_string());
        self.persist(options, content, ContentType::Analysis, &title, ArtifactFormat::Json)
    }

    fn process(&self, args: ProcessArgs, options: RunOptions) -> Result<(), CliError> {
        let params = ScrapedContentParams {
            title: args.title,
            content: args.input.read()?,
        };
        let text = print_text(self.generator().process_scraped_content(&params)?.text);
        self.persist(options, text, ContentType::Article, &params.title, ArtifactFormat::Markdown)
    }

    fn stream_built(
        &self,
        params: &dyn PromptBuilder,
        content_type: ContentType,
        words: u32,
    ) -> Result<String, CliError> {
        let prompt = params.build(&self.prompts)?;
        let fragments =
            self.generator()
                .stream_prompt(content_type, prompt, token_budget(2, words))?;
        print_stream(fragments)
    }

    fn persist(
        &self,
        options: RunOptions,
        content: impl Into<ArtifactContent>,
        content_type: ContentType,
        title: &str,
        format: ArtifactFormat,
    ) -> Result<(), CliError> {
        if !options.save {
            return Ok(());
        }
        let artifact = self
            .artifacts
            .save(content, content_type.as_str(), title, format)?;
        eprintln!("saved {}", artifact.path.display());
        Ok(())
    }
}

fn print_text(text: String) -> String {
    println!("{text}");
    text
}

fn print_stream(fragments: TracedStream<'_>) -> Result<String, CliError> {
    let mut stdout = io::stdout().lock();
    let mut text = String::new();
    for fragment in fragments {
        let fragment = fragment?;
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
        text.push_str(&fragment);
    }
    writeln!(stdout)?;
    Ok(text)
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("configuration file `{0}` already exists; pass --force to overwrite it")]
    ConfigExists(PathBuf),
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),
    #[error("{0}")]
    Adapter(#[from] AdapterError),
    #[error("{0}")]
    Generation(#[from] GenerationError),
    #[error("stream interrupted: {0}")]
    Stream(#[from] GatewayError),
    #[error("failed to save artifact: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("failed to read `{path}`: {source}")]
    ReadInput { path: PathBuf, source: io::Error },
    #[error("provide the input text with --text or --file")]
    MissingInput,
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[derive(Parser)]
#[command(
    name = "alexandrea",
    version,
    about = "Generate, categorise and archive content with a local Ollama service"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "alexandrea.json")]
    config: PathBuf,

    /// Log at debug level (RUST_LOG still applies when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the result without writing it to the library
    #[arg(long, global = true)]
    no_save: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommand),
    /// List the prompt templates in effect
    Prompts,
    /// Show the service version, available models and finalised routes
    Models,
    /// Write a blog post
    Blog(BlogArgs),
    /// Write a post for one social platform, or for all of them
    Social(SocialArgs),
    /// Outline an eBook
    Outline(OutlineArgs),
    /// Write one eBook chapter from its outline
    Chapter(ChapterArgs),
    /// Write a market analysis
    Analysis(AnalysisArgs),
    /// Write a historical narrative
    Narrative(NarrativeArgs),
    /// Summarise a text
    Summarize(SummarizeArgs),
    /// Pick matching categories for a text
    Categorize(CategorizeArgs),
    /// Extract main topic, key points, entities and sentiment as JSON
    Extract(ExtractArgs),
    /// Process a scraped record
    Process(ProcessArgs),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the current (or default) configuration to disk
    Init(InitArgs),
    /// Print the effective configuration
    Show,
}

#[derive(Args)]
struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

/// Text given inline or read from a file.
#[derive(Args)]
struct InputArgs {
    #[arg(long, value_name = "TEXT", conflicts_with = "file")]
    text: Option<String>,
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

impl InputArgs {
    fn read(&self) -> Result<String, CliError> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => fs::read_to_string(path).map_err(|source| CliError::ReadInput {
                path: path.clone(),
                source,
            }),
            (None, None) => Err(CliError::MissingInput),
        }
    }
}

#[derive(Args)]
struct BlogArgs {
    topic: String,
    #[arg(long, default_value_t = 800)]
    words: u32,
    #[arg(long, default_value = "informative")]
    tone: String,
    /// Reference fact to include; repeatable
    #[arg(short, long = "data", value_name = "POINT")]
    data: Vec<String>,
    /// Print fragments as they arrive
    #[arg(long)]
    stream: bool,
}

#[derive(Args)]
struct SocialArgs {
    topic: String,
    /// twitter, linkedin, facebook, instagram or all
    #[arg(long, default_value = "all")]
    platform: String,
    #[arg(long, default_value = "engaging")]
    tone: String,
    #[arg(short, long = "data", value_name = "POINT")]
    data: Vec<String>,
}

#[derive(Args)]
struct OutlineArgs {
    title: String,
    #[arg(long)]
    subject: String,
    #[arg(long, default_value_t = 10)]
    chapters: u32,
    #[arg(long, default_value = "general readers")]
    audience: String,
}

#[derive(Args)]
struct ChapterArgs {
    book_title: String,
    #[arg(long)]
    number: u32,
    #[arg(long)]
    title: String,
    #[command(flatten)]
    outline: InputArgs,
    #[arg(long, default_value_t = 2000)]
    words: u32,
    /// Print fragments as they arrive
    #[arg(long)]
    stream: bool,
}

#[derive(Args)]
struct AnalysisArgs {
    subject: String,
    #[arg(long, default_value = "the last 12 months")]
    timeframe: String,
    #[arg(short, long = "data", value_name = "POINT")]
    data: Vec<String>,
    #[arg(long, default_value_t = 1000)]
    words: u32,
    /// Print fragments as they arrive
    #[arg(long)]
    stream: bool,
}

#[derive(Args)]
struct NarrativeArgs {
    event: String,
    #[arg(long)]
    period: String,
    #[arg(short, long = "data", value_name = "POINT")]
    data: Vec<String>,
    #[arg(long, default_value_t = 1500)]
    words: u32,
    /// Print fragments as they arrive
    #[arg(long)]
    stream: bool,
}

#[derive(Args)]
struct SummarizeArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Maximum summary length in words
    #[arg(long, default_value_t = 150)]
    max_length: u32,
    /// Title used for the saved artifact
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args)]
struct CategorizeArgs {
    #[command(flatten)]
    input: InputArgs,
    /// Allowed categories, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    categories: Vec<String>,
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args)]
struct ExtractArgs {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long)]
    title: Option<String>,
}

#[derive(Args)]
struct ProcessArgs {
    #[arg(long)]
    title: String,
    #[command(flatten)]
    input: InputArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "alexandrea",
            "categorize",
            "--text",
            "Stocks fell",
            "--categories",
            "finance,history",
            "--no-save",
        ])
        .unwrap();
        assert!(cli.no_save);
        match cli.command {
            Command::Categorize(args) => {
                assert_eq!(args.categories, vec!["finance", "history"]);
                assert_eq!(args.input.read().unwrap(), "Stocks fell");
            }
            _ => panic!("expected categorize"),
        }
    }

    #[test]
    fn stream_flag_is_limited_to_streaming_subcommands() {
        let cli = Cli::try_parse_from([
            "alexandrea",
            "narrative",
            "The fall of Rome",
            "--period",
            "476",
            "--stream",
        ])
        .unwrap();
        match cli.command {
            Command::Narrative(args) => assert!(args.stream),
            _ => panic!("expected narrative"),
        }

        let rejected = Cli::try_parse_from(["alexandrea", "social", "Launch day", "--stream"]);
        assert!(rejected.is_err());
    }

    #[test]
    fn input_requires_text_or_file() {
        let input = InputArgs {
            text: None,
            file: None,
        };
        assert!(matches!(input.read(), Err(CliError::MissingInput)));
    }
}
