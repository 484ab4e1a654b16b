// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use log::{info, LevelFilter, Log, Metadata, Record, Level, SetLoggerError};
use std::path::PathBuf;
use std::io::Write;
use std::sync::Arc;
use clap::{Parser, ValueEnum, CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use subtrans::app_config::{self, Config, TranslationProvider};
use subtrans::app_controller::{Controller, IndicatifObserver};
use subtrans::file_utils::FileManager;

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Gemini,
    #[value(name = "openai", alias = "novita")]
    OpenAI,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Gemini => TranslationProvider::Gemini,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate an SRT file or every SRT file in a directory
    Translate(TranslateArgs),

    /// Generate shell completions for subtrans
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Input SRT file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output file (single-file mode only; defaults to <stem><suffix>.srt)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the selected provider
    #[arg(long, env = "SUBTRANS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Subtitle lines per request
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Attempts per batch, 0 for unlimited
    #[arg(short = 'r', long)]
    max_retries: Option<u32>,

    /// Write the original line above each translation
    #[arg(long)]
    bilingual: bool,

    /// Suffix appended to the output file stem
    #[arg(long)]
    suffix: Option<String>,

    /// Overwrite existing outputs and discard unfinished checkpoints
    #[arg(short, long)]
    force: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// subtrans - resilient parallel subtitle translation
///
/// Translates SRT subtitles with Gemini or any OpenAI-compatible API, using
/// several workers in parallel and checkpointing progress so that an
/// interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "subtrans")]
#[command(version)]
#[command(about = "Resilient parallel subtitle translation")]
#[command(long_about = "subtrans translates SRT subtitle files in parallel batches and resumes interrupted runs.

EXAMPLES:
    subtrans translate movie.srt                       # Translate using default config
    subtrans translate movie.srt -o movie.vi.srt       # Choose the output file
    subtrans translate -p openai -m some/model dir/    # Whole directory with another backend
    subtrans translate -w 8 -b 20 -r 5 movie.srt       # 8 workers, 20 lines per request, 5 attempts
    subtrans translate -f movie.srt                    # Start over, ignoring checkpoints
    subtrans completions bash > subtrans.bash          # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    gemini - Google Gemini (requires API key)
    openai - OpenAI-compatible chat completions, e.g. Novita AI (requires API key)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // the logger accepts everything; log::max_level does the filtering
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "subtrans", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => run_translate(args).await,
    }
}

fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.set_model(model);
    }
    if let Some(api_key) = &options.api_key {
        config.set_api_key(api_key);
    }
    if let Some(workers) = options.workers {
        config.translation.common.workers = workers;
    }
    if let Some(batch_size) = options.batch_size {
        config.translation.common.batch_size = batch_size;
    }
    if let Some(max_retries) = options.max_retries {
        config.translation.common.max_retries = max_retries;
    }
    if options.bilingual {
        config.output.bilingual = true;
    }
    if let Some(suffix) = &options.suffix {
        config.output.file_suffix = suffix.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = Config::load_or_create(&options.config_path)?;
    apply_overrides(&mut config, &options);
    log::set_max_level(config.log_level.to_level_filter());

    let observer = Arc::new(IndicatifObserver::new());
    let controller = Controller::with_config(config)?
        .with_observer(observer.clone())
        .with_force(options.force);

    let input = &options.input_path;
    if FileManager::file_exists(input) {
        let output = options
            .output
            .clone()
            .unwrap_or_else(|| controller.output_path_for(input));
        let result = controller.translate_file(input, &output).await;
        observer.clear();
        result?;
    } else if FileManager::dir_exists(input) {
        if options.output.is_some() {
            return Err(anyhow!("--output can only be used with a single input file"));
        }
        let report = controller.translate_directory(input).await;
        observer.clear();
        let report = report?;
        if report.failed() > 0 {
            return Err(anyhow!("{} file(s) failed to translate", report.failed()));
        }
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", input));
    }

    info!("Done");
    Ok(())
}
