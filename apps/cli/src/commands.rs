//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tenderwatch_core::{OpenAiClient, PipelineConfig, ProgressReporter, RunReport};
use tenderwatch_notify::{RenderOptions, WebhookNotifier};
use tenderwatch_shared::{
    AppConfig, CompanyProfile, init_config, load_config, load_config_from, resolve_secret,
};
use tenderwatch_source::{SourceClient, SummaryQuery};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tenderwatch: tender notices, scored and delivered.
#[derive(Parser)]
#[command(
    name = "tenderwatch",
    version,
    about = "Poll public tenders, enrich them with an LLM and notify the team.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.tenderwatch/tenderwatch.toml).
    #[arg(long, global = true, env = "TENDERWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch, enrich and notify once.
    Run {
        /// Override `source.lookback_days`.
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Override `source.max_pages`.
        #[arg(long)]
        max_pages: Option<u32>,

        /// Override `run.output`.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render notifications but do not post them.
        #[arg(long)]
        dry_run: bool,

        /// Ignore the apply-score threshold.
        #[arg(long)]
        notify_all: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tenderwatch=info",
        1 => "tenderwatch=debug",
        _ => "tenderwatch=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            lookback_days,
            max_pages,
            output,
            dry_run,
            notify_all,
        } => {
            let overrides = RunOverrides {
                lookback_days,
                max_pages,
                output,
                dry_run,
                notify_all,
            };
            cmd_run(config_path.as_deref(), overrides).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

/// Flags of `tenderwatch run` that override file values.
struct RunOverrides {
    lookback_days: Option<u32>,
    max_pages: Option<u32>,
    output: Option<PathBuf>,
    dry_run: bool,
    notify_all: bool,
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn cmd_run(config_path: Option<&Path>, overrides: RunOverrides) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(days) = overrides.lookback_days {
        config.source.lookback_days = days;
    }
    if let Some(pages) = overrides.max_pages {
        config.source.max_pages = pages;
    }
    config.validate()?;

    // Secrets are resolved once, before any network traffic.
    let api_key = resolve_secret(&config.model.api_key_env)?;
    let notifier = if overrides.dry_run {
        None
    } else {
        let url = resolve_secret(&config.notify.webhook_url_env)?;
        Some(WebhookNotifier::new(url, config.notify.timeout_secs)?)
    };

    let profile = CompanyProfile::load(Path::new(&config.run.company_profile))?;
    let model = OpenAiClient::new(&config.model, api_key)?;
    let source = SourceClient::new(config.source.clone())?;

    let pipeline = PipelineConfig {
        query: SummaryQuery::from(&config.source),
        threshold: (!overrides.notify_all).then_some(config.notify.apply_score_threshold),
        output: overrides
            .output
            .unwrap_or_else(|| PathBuf::from(&config.run.output)),
        render: RenderOptions {
            portal_url: config.source.portal_url.clone(),
            language: config.source.language.clone(),
        },
    };

    info!(
        lookback_days = config.source.lookback_days,
        max_pages = config.source.max_pages,
        dry_run = overrides.dry_run,
        threshold = ?pipeline.threshold,
        "starting tenderwatch run"
    );

    let reporter = CliProgress::new();
    let report = tenderwatch_core::run(
        &pipeline,
        &source,
        &model,
        notifier.as_ref(),
        &profile,
        &reporter,
    )
    .await?;

    println!();
    println!("  Run {} finished", report.run_id);
    println!("  Summaries: {}", report.summaries);
    println!("  Details:   {}", report.details);
    println!(
        "  Enriched:  {} ({} failed)",
        report.enriched, report.enrichment_failures
    );
    println!(
        "  Notified:  {} ({} failed, {} below threshold)",
        report.notified, report.notification_failures, report.skipped_below_threshold
    );
    println!("  Output:    {}", report.output.display());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, label: &str) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}] {label}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    println!("Set source.lookback_days and the env vars named in [model] and [notify].");
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
