//! CLI parsing and orchestration. Loads config, picks a target, runs the pipeline, prints the
//! quality report. Maps errors to exit codes.

use crate::config::{self, ConfigError, Settings};
use crate::export::OutputFormat;
use crate::fetch::Fetcher;
use crate::model::Target;
use crate::pipeline::{self, PipelineError, RunOptions, RunStatus};
use clap::Parser;
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl CliRunError {
    pub fn status(&self) -> RunStatus {
        match self {
            CliRunError::Config(_) => RunStatus::ConfigContractViolation,
            CliRunError::Pipeline(e) => e.status(),
            CliRunError::Client(_) => RunStatus::UnexpectedError,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }
}

#[derive(Parser, Debug)]
#[command(name = "listscrape")]
#[command(about = "Scrape catalog list pages (and optionally their detail pages) into CSV or JSON")]
#[command(
    after_help = "Targets and [http], [validation], [logging], [output] settings are read from the config file (--config, ./listscrape.toml, or ~/.config/listscrape/config.toml). CLI flags override config. RUST_LOG overrides log level."
)]
pub struct Args {
    /// Config file path. Default: ./listscrape.toml, then the user config dir.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Target name from the config. Default: the first target.
    #[arg(long)]
    pub target: Option<String>,

    /// Output path. Default: {output.dir}/{sanitized-target-name}.{ext}.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: csv or json. Default: from the output extension, else csv.
    #[arg(long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Process only the first N items (list-only) or links (detail-follow).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Run every stage except writing the output file.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the data quality report (overrides config).
    #[arg(long)]
    pub no_validate: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds (overrides config; default 10).
    #[arg(long, value_parser = parse_secs)]
    pub timeout: Option<Duration>,

    /// Delay between detail-page requests in seconds (overrides config; default 0).
    #[arg(long, value_parser = parse_secs)]
    pub delay: Option<Duration>,

    /// Total attempts per request, including the first (overrides config; default 3).
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Print configured targets (name, mode, list URL) and exit.
    #[arg(long)]
    pub list_targets: bool,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and verbose error chain.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "csv" => Ok(OutputFormat::Csv),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!("Invalid --format value: '{}'. Use csv or json.", s)),
    }
}

fn parse_secs(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("'{}' must be a non-negative number of seconds", s))
}

/// File stem for a target name: ASCII alphanumeric and `_` runs joined by `-`, lowercased.
fn sanitize_name(name: &str) -> String {
    let stem = name
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_ascii_lowercase();
    if stem.is_empty() {
        "output".to_string()
    } else {
        stem
    }
}

/// `--quiet` and `--verbose` beat the configured level. `RUST_LOG` beats both (see [init_logging]).
fn effective_level<'a>(args: &Args, configured: &'a str) -> &'a str {
    if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        configured
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins when set.
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(anyhow::Error::msg)
}

fn output_format(args: &Args, path: &Path) -> OutputFormat {
    args.format
        .or_else(|| OutputFormat::from_path(path))
        .unwrap_or(OutputFormat::Csv)
}

fn output_path(args: &Args, settings: &Settings, target: &Target) -> PathBuf {
    match &args.output {
        Some(p) => p.clone(),
        None => {
            let ext = args.format.unwrap_or(OutputFormat::Csv).extension();
            settings
                .output_dir
                .join(format!("{}.{}", sanitize_name(&target.name), ext))
        }
    }
}

/// Create the output file, and its parent directories if missing.
fn create_output(path: &Path) -> io::Result<BufWriter<File>> {
    let with_path = |e: io::Error| io::Error::new(e.kind(), format!("{}: {}", path.display(), e));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(with_path)?;
        }
    }
    File::create(path).map(BufWriter::new).map_err(with_path)
}

/// One line per target: name, mode, list URL, tab-separated.
fn format_target_list(targets: &[Target]) -> String {
    targets
        .iter()
        .map(|t| format!("{}\t{}\t{}", t.name, t.mode.label(), t.list_url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply CLI overrides on top of config settings.
fn apply_overrides(args: &Args, mut settings: Settings) -> Result<Settings, ConfigError> {
    if let Some(timeout) = args.timeout {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                key: "--timeout",
                message: "must be greater than 0".to_string(),
            });
        }
        settings.timeout = timeout;
    }
    if let Some(delay) = args.delay {
        settings.delay_between_requests = delay;
    }
    if let Some(n) = args.max_attempts {
        settings.retry.max_attempts = n.max(1);
    }
    if let Some(ua) = args.user_agent.as_deref().filter(|ua| !ua.trim().is_empty()) {
        settings.user_agent = Some(ua.to_string());
    }
    if args.no_validate {
        settings.validation_enabled = false;
    }
    Ok(settings)
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let (config_path, config) = config::load_config(args.config.as_deref())?;
    let settings = apply_overrides(args, config.settings()?)?;

    if let Err(e) = init_logging(effective_level(args, &settings.log_level)) {
        eprintln!("Warning: could not initialise logging: {}", e);
    }
    info!(path = %config_path.display(), "Loaded config");

    let targets = config.targets()?;
    if args.list_targets {
        println!("{}", format_target_list(&targets));
        return Ok(());
    }
    let target = config::select_target(&targets, args.target.as_deref())?;

    let output_path = output_path(args, &settings, target);
    let format = output_format(args, &output_path);

    let mut builder = Fetcher::builder()
        .timeout(settings.timeout)
        .policy(settings.retry.clone());
    if let Some(ua) = &settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    let mut fetcher = builder.build().map_err(CliRunError::Client)?;

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: usize, total: usize| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            if let Ok(style) = indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            {
                bar.set_style(
                    style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                        .progress_chars("█▉▊▋▌▍▎▏ "),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n as u64);
        pb.set_message(format!("Fetching detail page {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(usize, usize)> = if args.quiet { None } else { Some(&progress_cb) };

    let options = RunOptions {
        limit: args.limit,
        delay_between_requests: settings.delay_between_requests,
        validation_enabled: settings.validation_enabled,
        dry_run: args.dry_run,
        format,
        progress,
    };
    let outcome = pipeline::run(target, &mut fetcher, &options, || create_output(&output_path));

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    let summary = outcome?;

    if let Some(report) = &summary.report {
        println!("{}", report);
    }
    let result = &summary.result;
    info!(
        records = result.records.len(),
        attempted = result.attempted,
        succeeded = result.succeeded,
        skipped = result.skipped_count(),
        "Run summary"
    );
    if summary.output_written {
        info!(path = %output_path.display(), format = format.extension(), "Wrote output");
    } else {
        info!(path = %output_path.display(), "Dry run: output not written");
    }
    Ok(())
}
