// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::{Lazy, OnceCell};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use archivist::app_config::{Config, LogLevel};
use archivist::errors::StateError;
use archivist::file_utils::FileManager;
use archivist::providers::{ExtractionBackend, OllamaBackend};
use archivist::scan::{BackendProcessor, MessageProcessor, NoopProcessor, ScanDriver};
use archivist::state::ProgressTracker;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a chat export JSON file, resuming earlier progress
    Analyze(AnalyzeArgs),

    /// Reset the processing state so the next analysis starts from scratch
    ResetState {
        /// Processing state file (default from config)
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Show the stored processing state
    Status {
        /// Processing state file (default from config)
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Check that the extraction backend is reachable and the model installed
    CheckBackend(BackendArgs),

    /// Generate shell completions for archivist
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Model name to use for extraction
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama API base URL
    #[arg(long, env = "OLLAMA_API_BASE_URL")]
    endpoint: Option<String>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Chat export to analyze (default from config)
    #[arg(value_name = "CHAT_EXPORT_PATH")]
    chat_export_path: Option<PathBuf>,

    /// Processing state file (default from config)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Reset a state bound to another export without asking
    #[arg(short, long)]
    yes: bool,

    /// Send every message with its context to the extraction backend
    #[arg(short, long)]
    extract: bool,

    #[command(flatten)]
    backend: BackendArgs,

    /// Messages of context on each side of the target
    #[arg(short, long)]
    window_size: Option<usize>,

    /// Reply links to follow from the target
    #[arg(short, long)]
    reply_depth: Option<usize>,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

/// Archivist - resumable context analysis for chat exports
///
/// Walks an exported chat message by message, computing the context of each
/// message and recording progress so an interrupted run can resume.
#[derive(Parser, Debug)]
#[command(name = "archivist")]
#[command(version = "0.1.0")]
#[command(about = "Resumable context analysis for chat exports")]
#[command(long_about = "Archivist walks a chat export message by message, builds the context of each message and records progress so that an interrupted analysis resumes where it stopped.

EXAMPLES:
    archivist analyze                             # Analyze the default export from conf.json
    archivist analyze dump.json                   # Analyze a specific export
    archivist analyze dump.json -w 3 -r 5         # Custom context window
    archivist analyze dump.json --extract         # Also run extraction through Ollama
    archivist status                              # Show stored progress
    archivist reset-state                         # Start over on the next run
    archivist check-backend -m gemma3n:latest     # Verify the Ollama model
    archivist completions bash > archivist.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically. OLLAMA_API_BASE_URL overrides the endpoint.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// Set console logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    /// Do not write a log file
    #[arg(long, global = true)]
    no_log_file: bool,
}

// @struct: Custom logger implementation
struct CustomLogger {
    /// Console threshold, stored as a `LevelFilter` index
    console_level: AtomicUsize,
    /// Log file receiving info and above
    file: OnceCell<Mutex<File>>,
}

static LOGGER: Lazy<CustomLogger> = Lazy::new(|| CustomLogger {
    console_level: AtomicUsize::new(LevelFilter::Info as usize),
    file: OnceCell::new(),
});

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<()> {
        log::set_logger(&*LOGGER).map_err(|e| anyhow!("Failed to install logger: {}", e))?;
        LOGGER.set_console_level(level);
        Ok(())
    }

    fn set_console_level(&self, level: LevelFilter) {
        self.console_level.store(level as usize, Ordering::Relaxed);
        log::set_max_level(self.max_level());
    }

    fn console_level(&self) -> LevelFilter {
        match self.console_level.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn file_level(&self) -> LevelFilter {
        if self.file.get().is_some() {
            LevelFilter::Info
        } else {
            LevelFilter::Off
        }
    }

    fn max_level(&self) -> LevelFilter {
        self.console_level().max(self.file_level())
    }

    // @creates: logs/archivist_<timestamp>.log
    fn attach_file(&self, log_dir: &Path) -> Result<PathBuf> {
        FileManager::ensure_dir(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
        let path = log_dir.join(format!(
            "archivist_{}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        if self.file.set(Mutex::new(file)).is_err() {
            return Err(anyhow!("A log file is already attached"));
        }
        log::set_max_level(self.max_level());
        Ok(path)
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌",
            Level::Warn => "🚧",
            Level::Info => " ",
            Level::Debug => "🔍",
            Level::Trace => "📋",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
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
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record) {
        let level = record.level();

        if level <= self.console_level() {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }

        if level <= self.file_level() {
            if let Some(Ok(mut file)) = self.file.get().map(Mutex::lock) {
                let _ = writeln!(
                    file,
                    "{} | {:<5} | {} | {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    level,
                    record.target(),
                    record.args()
                );
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
        if let Some(Ok(mut file)) = self.file.get().map(Mutex::lock) {
            let _ = file.flush();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // The level is updated after loading the config
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "archivist", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.log_level {
        LOGGER.set_console_level(LogLevel::from(level.clone()).to_level_filter());
    }

    let config = Config::load_or_create(&cli.config_path)?;

    // If log level was not set via command line, update it from config now
    if cli.log_level.is_none() {
        LOGGER.set_console_level(config.log_level.to_level_filter());
    }
    if !cli.no_log_file {
        match LOGGER.attach_file(&config.log_dir) {
            Ok(path) => info!("Logging to {}", path.display()),
            Err(e) => warn!("File logging disabled: {}", e),
        }
    }
    info!("CLI application started.");

    let result = match cli.command {
        Commands::Analyze(args) => run_analyze(config, args).await,
        Commands::ResetState { state_file } => run_reset_state(state_file.unwrap_or(config.state_file)),
        Commands::Status { state_file } => run_status(state_file.unwrap_or(config.state_file)),
        Commands::CheckBackend(args) => run_check_backend(config, args).await,
        Commands::Completions { .. } => Ok(()),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    log::logger().flush();
    result
}

async fn run_analyze(mut config: Config, args: AnalyzeArgs) -> Result<()> {
    // Override config with CLI options if provided
    if let Some(window_size) = args.window_size {
        config.context.window_size = window_size;
    }
    if let Some(reply_depth) = args.reply_depth {
        config.context.reply_depth = reply_depth;
    }
    if args.extract {
        config.extraction.enabled = true;
    }
    apply_backend_overrides(&mut config, &args.backend);

    // Validate the configuration after loading and overriding
    config.validate().context("Configuration validation failed")?;

    let chat_export_path = match args.chat_export_path {
        Some(path) => path,
        None => {
            info!(
                "No chat export path provided, defaulting to {}",
                config.default_export_path.display()
            );
            config.default_export_path.clone()
        }
    };
    if !FileManager::file_exists(&chat_export_path) {
        return Err(anyhow!(
            "Chat export file not found at '{}'. Place your export there or pass its path as an argument.",
            chat_export_path.display()
        ));
    }

    let state_file = args.state_file.unwrap_or_else(|| config.state_file.clone());
    let Some(mut tracker) = open_tracker(&state_file, &chat_export_path, args.yes)? else {
        println!(
            "Analysis aborted. Please provide the correct chat export path or reset the state with 'archivist reset-state'."
        );
        return Ok(());
    };

    println!("Starting analysis of {}...", chat_export_path.display());
    let show_progress = !args.no_progress;

    let report = if config.extraction.enabled {
        let extraction = &config.extraction;
        let backend = OllamaBackend::with_config(
            &extraction.endpoint,
            extraction.model.clone(),
            extraction.timeout_secs,
            extraction.max_retries,
            extraction.retry_backoff_ms,
        );
        if !backend.is_available().await {
            warn!(
                "Extraction backend at {} is not ready; failures will be recorded per message",
                backend.base_url()
            );
        }
        let processor = BackendProcessor::new(Arc::new(backend), extraction.prompt_template.clone())
            .with_schema(extraction.output_schema.clone())
            .with_call_timeout(extraction.call_timeout())
            .with_output_path(extraction.output_path.clone());
        scan(&config, processor, show_progress, &chat_export_path, &mut tracker).await?
    } else {
        scan(&config, NoopProcessor, show_progress, &chat_export_path, &mut tracker).await?
    };

    println!("Analysis completed. {}.", report);
    println!(
        "Total messages processed: {}.",
        tracker.state().total_messages_processed
    );
    Ok(())
}

async fn scan<P: MessageProcessor>(
    config: &Config,
    processor: P,
    show_progress: bool,
    chat_export_path: &Path,
    tracker: &mut ProgressTracker,
) -> Result<archivist::ScanReport> {
    let driver = ScanDriver::new(config.context.clone(), processor)
        .with_max_consecutive_failures(config.extraction.max_consecutive_failures)
        .with_progress_bar(show_progress);
    driver
        .run(chat_export_path, tracker)
        .await
        .context("An error occurred during analysis")
}

/// Open the state for `chat_export_path`, asking before replacing another export's state.
///
/// `None` means the operator declined.
fn open_tracker(state_file: &Path, chat_export_path: &Path, assume_yes: bool) -> Result<Option<ProgressTracker>> {
    match ProgressTracker::open(state_file, chat_export_path) {
        Ok(tracker) => Ok(Some(tracker)),
        Err(StateError::Conflict { stored, requested }) => {
            warn!(
                "Chat export path in state ({}) does not match current path ({}).",
                stored.display(),
                requested.display()
            );
            let reset = assume_yes
                || confirm("Do you want to reset the processing state and start a new analysis for this file?")?;
            if !reset {
                return Ok(None);
            }
            let tracker = ProgressTracker::rebind(state_file, chat_export_path)?;
            println!("Processing state reset confirmed.");
            Ok(Some(tracker))
        }
        Err(e) => Err(e.into()),
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn run_reset_state(state_file: PathBuf) -> Result<()> {
    match ProgressTracker::load_existing(&state_file)? {
        Some(mut tracker) => {
            tracker.reset()?;
            println!("Processing state has been reset.");
        }
        None => println!("No processing state found to reset."),
    }
    Ok(())
}

fn run_status(state_file: PathBuf) -> Result<()> {
    let Some(tracker) = ProgressTracker::load_existing(&state_file)? else {
        println!("No processing state found at {}.", state_file.display());
        return Ok(());
    };

    let state = tracker.state();
    println!("{}", state);
    let format_time = |time: Option<chrono::DateTime<chrono::Utc>>| {
        time.map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    println!("  started:  {}", format_time(state.start_time));
    println!("  finished: {}", format_time(state.end_time));
    for (key, value) in &state.metadata {
        println!("  {}: {}", key, value);
    }
    Ok(())
}

async fn run_check_backend(mut config: Config, args: BackendArgs) -> Result<()> {
    apply_backend_overrides(&mut config, &args);
    let extraction = &config.extraction;
    let backend = OllamaBackend::with_config(
        &extraction.endpoint,
        extraction.model.clone(),
        extraction.timeout_secs,
        extraction.max_retries,
        extraction.retry_backoff_ms,
    );

    if !backend.is_available().await {
        return Err(anyhow!(
            "Model '{}' is not available at {}",
            backend.model_name(),
            backend.base_url()
        ));
    }

    println!("Model '{}' is available at {}.", backend.model_name(), backend.base_url());
    if let Some(info) = backend.model_info().await {
        println!("{}", serde_json::to_string_pretty(&info)?);
    }
    Ok(())
}

fn apply_backend_overrides(config: &mut Config, args: &BackendArgs) {
    if let Some(model) = &args.model {
        config.extraction.model = model.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.extraction.endpoint = endpoint.clone();
    }
}
