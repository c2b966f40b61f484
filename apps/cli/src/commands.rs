//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use noteforge_client::{HttpBackend, HttpTextFetcher, ResilientClient, RetryPolicy};
use noteforge_core::{
    BackfillProgress, BackfillReport, BackfillRunner, JobState, NotePipeline, PipelineConfig,
    RecordPipeline,
};
use noteforge_shared::{
    AppConfig, BackfillConfig, ChunkingConfig, CompletionSettings, RecordArtifacts, RecordFilter,
    SourceRecord, expand_home, init_config, load_config, resolve_api_key,
};
use noteforge_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// noteforge: turn video transcripts into study notes.
#[derive(Parser)]
#[command(
    name = "noteforge",
    version,
    about = "Turn subtitle transcripts into notes, bilingual summaries, mind maps and tags.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Run the pipeline on one local transcript file and print the artifacts.
    Process {
        /// Transcript file (SRT-style).
        file: PathBuf,

        /// Record title (defaults to the file stem).
        #[arg(short, long)]
        title: Option<String>,

        /// Where the media came from; used for platform tags.
        #[arg(long)]
        source_url: Option<String>,

        /// Override the completion model.
        #[arg(short, long)]
        model: Option<String>,

        /// Print artifacts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Store a transcript file as a record for later backfill.
    Import {
        /// Transcript file (SRT-style).
        file: PathBuf,

        /// Record title.
        #[arg(short, long)]
        title: String,

        /// Where the media came from.
        #[arg(long)]
        source_url: Option<String>,

        /// Database path (defaults to `[storage] database_path`).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Derive artifacts for stored records.
    Backfill {
        /// Database path (defaults to `[storage] database_path`).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Process at most this many records.
        #[arg(long)]
        limit: Option<usize>,

        /// Records processed concurrently (defaults to `[backfill] concurrency`).
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Reprocess records that already have artifacts.
        #[arg(long)]
        all: bool,

        /// Restrict to these record ids (repeatable).
        #[arg(long = "id")]
        ids: Vec<String>,

        /// Override the completion model.
        #[arg(short, long)]
        model: Option<String>,
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
        0 => "noteforge=info",
        1 => "noteforge=debug",
        _ => "noteforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Process {
            file,
            title,
            source_url,
            model,
            json,
        } => cmd_process(&file, title, source_url, model.as_deref(), json).await,
        Command::Import {
            file,
            title,
            source_url,
            db,
        } => cmd_import(&file, title, source_url, db.as_deref()).await,
        Command::Backfill {
            db,
            limit,
            concurrency,
            all,
            ids,
            model,
        } => {
            let options = BackfillOptions {
                db,
                limit,
                concurrency,
                all,
                ids,
                model,
            };
            cmd_backfill(options).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

type CliPipeline = NotePipeline<HttpBackend, HttpTextFetcher>;

/// Build the HTTP-backed pipeline from config, with an optional model override.
fn build_pipeline(config: &AppConfig, model: Option<&str>) -> Result<CliPipeline> {
    let api_key = resolve_api_key(config)?;
    let mut settings = CompletionSettings::from_section(&config.completion, api_key);
    if let Some(model) = model {
        settings.model = model.to_string();
    }

    let backend = HttpBackend::new(&settings)?;
    let client = ResilientClient::new(backend, RetryPolicy::from(&settings));
    let fetcher = HttpTextFetcher::new(settings.timeout)?;
    let pipeline_config = PipelineConfig::new(ChunkingConfig::from(config), &settings);

    info!(
        model = %pipeline_config.model,
        base_url = %settings.base_url,
        "completion client ready"
    );
    Ok(NotePipeline::new(client, fetcher, pipeline_config))
}

fn database_path(config: &AppConfig, flag: Option<&Path>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(expand_home(&config.storage.database_path)?),
    }
}

fn read_transcript(file: &Path) -> Result<String> {
    std::fs::read_to_string(file)
        .wrap_err_with(|| format!("failed to read transcript '{}'", file.display()))
}

fn check_source_url(source_url: Option<&str>) -> Result<()> {
    if let Some(url) = source_url {
        Url::parse(url).map_err(|e| eyre!("invalid source URL '{url}': {e}"))?;
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

// ---------------------------------------------------------------------------
// process
// ---------------------------------------------------------------------------

async fn cmd_process(
    file: &Path,
    title: Option<String>,
    source_url: Option<String>,
    model: Option<&str>,
    json: bool,
) -> Result<()> {
    check_source_url(source_url.as_deref())?;
    let config = load_config()?;
    let pipeline = build_pipeline(&config, model)?;

    let title = title.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string())
    });
    let mut record = SourceRecord::inline(title, read_transcript(file)?);
    record.source_url = source_url;

    info!(file = %file.display(), title = %record.title, "processing transcript");

    let spinner = spinner("Processing transcript");
    let result = pipeline.process(&record).await;
    spinner.finish_and_clear();

    let artifacts = result.map_err(|failure| eyre!(failure))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
    } else {
        print_artifacts(&record.title, &artifacts)?;
    }
    Ok(())
}

fn print_artifacts(title: &str, artifacts: &RecordArtifacts) -> Result<()> {
    println!("# {title}");
    println!();
    println!("{}", artifacts.document);
    println!();
    println!("## Summary (primary)");
    println!();
    println!("{}", artifacts.summary.primary_text);
    println!();
    println!("## Summary (secondary)");
    println!();
    println!("{}", artifacts.summary.secondary_text);
    println!();
    println!("## Mind map");
    println!();
    println!("{}", serde_json::to_string_pretty(&artifacts.mind_map)?);
    println!();
    println!("Tags:   {}", artifacts.tags.as_slice().join(", "));
    println!("Model:  {}", artifacts.model);
    println!("SHA256: {}", artifacts.content_hash);
    Ok(())
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

async fn cmd_import(
    file: &Path,
    title: String,
    source_url: Option<String>,
    db: Option<&Path>,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(eyre!("--title must not be empty"));
    }
    check_source_url(source_url.as_deref())?;

    let config = load_config()?;
    let db_path = database_path(&config, db)?;
    let storage = Storage::open(&db_path).await?;

    let mut record = SourceRecord::inline(title, read_transcript(file)?);
    record.source_url = source_url;
    storage.insert_record(&record).await?;

    info!(id = %record.id, db = %db_path.display(), "record imported");
    println!("{}", record.id);
    Ok(())
}

// ---------------------------------------------------------------------------
// backfill
// ---------------------------------------------------------------------------

struct BackfillOptions {
    db: Option<PathBuf>,
    limit: Option<usize>,
    concurrency: Option<usize>,
    all: bool,
    ids: Vec<String>,
    model: Option<String>,
}

async fn cmd_backfill(options: BackfillOptions) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config, options.model.as_deref())?;
    let db_path = database_path(&config, options.db.as_deref())?;
    let storage = Storage::open(&db_path).await?;

    let mut backfill = BackfillConfig::from(&config);
    if let Some(concurrency) = options.concurrency {
        backfill.concurrency = concurrency;
    }

    let filter = RecordFilter {
        ids: options.ids,
        only_missing: config.backfill.only_missing && !options.all,
        limit: options.limit,
    };

    info!(
        db = %db_path.display(),
        concurrency = backfill.concurrency,
        only_missing = filter.only_missing,
        "starting backfill"
    );

    let runner = BackfillRunner::new(Arc::new(storage), Arc::new(pipeline), &backfill);
    let report = runner.run(&filter, Arc::new(BarProgress::new())).await?;

    print_report(&report);
    if report.failed > 0 {
        return Err(eyre!("{} of {} records failed", report.failed, report.total()));
    }
    Ok(())
}

fn print_report(report: &BackfillReport) {
    println!();
    println!("  Backfill finished");
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed);
    println!("  Skipped:   {}", report.skipped);
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    for failure in &report.failures {
        let stage = failure.stage.map(|s| s.as_str()).unwrap_or("worker");
        println!("    {} [{stage}] {}", failure.record_id, failure.message);
    }
    println!();
}

/// Backfill progress on an indicatif bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl BackfillProgress for BarProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn job_finished(&self, record_id: &str, state: &JobState) {
        let label = match state {
            JobState::Succeeded => "ok",
            JobState::Skipped { .. } => "skipped",
            JobState::Failed { .. } => "failed",
            JobState::Pending | JobState::InFlight => "unfinished",
        };
        self.bar.set_message(format!("{record_id} {label}"));
        self.bar.inc(1);
    }

    fn done(&self, _report: &BackfillReport) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backfill_flags_parse() {
        let cli = Cli::parse_from([
            "noteforge", "backfill", "--limit", "5", "--all", "--id", "a", "--id", "b", "-c", "2",
        ]);
        match cli.command {
            Command::Backfill {
                limit,
                all,
                ids,
                concurrency,
                ..
            } => {
                assert_eq!(limit, Some(5));
                assert!(all);
                assert_eq!(ids, ["a", "b"]);
                assert_eq!(concurrency, Some(2));
            }
            _ => panic!("expected backfill"),
        }
    }

    #[test]
    fn explicit_db_flag_wins() {
        let config = AppConfig::default();
        let path = database_path(&config, Some(Path::new("/tmp/x.db"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn bad_source_url_rejected() {
        assert!(check_source_url(Some("not a url")).is_err());
        assert!(check_source_url(Some("https://youtu.be/x")).is_ok());
        assert!(check_source_url(None).is_ok());
    }
}
