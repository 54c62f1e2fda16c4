use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use openboycott_core::{
    analyze, render_batch, CompanyRecord, Credentials, FetchMode, IssueId, JsonFileSink,
    OutputFormat, ScoutSettings,
};
use serde_json::json;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "openboycott-cli",
    author,
    version,
    about = "Scores companies on social and environmental issues from weighted evidence"
)]
struct Cli {
    /// Settings file (TOML, YAML or JSON); OPENBOYCOTT_* variables override it
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the issue catalogue
    Issues {
        /// Emit issues as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Gather evidence for companies and aggregate their issue scores
    Analyze {
        /// Company names, analyzed in order
        #[arg(required = true, value_name = "COMPANY")]
        companies: Vec<String>,
        /// JSON file mapping service names to API keys
        #[arg(long, value_name = "FILE", default_value = "keys.json")]
        keys: PathBuf,
        /// Use deterministic fixture data instead of live services
        #[arg(long)]
        offline: bool,
        /// Output document; records are merged into it as they are produced
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Skip companies already present in the output document
        #[arg(long, requires = "output")]
        skip_existing: bool,
        #[arg(long, value_enum, default_value_t = Format::Human)]
        format: Format,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Human,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Human => OutputFormat::Human,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Issues { json } => list_issues(json)?,
        Commands::Analyze {
            companies,
            keys,
            offline,
            output,
            skip_existing,
            format,
        } => {
            let settings = ScoutSettings::load(cli.config.as_deref())?;
            let request = AnalyzeRequest {
                companies,
                keys,
                mode: if offline {
                    FetchMode::Offline
                } else {
                    FetchMode::Live
                },
                output,
                skip_existing,
                format: format.into(),
            };
            run_analyze(&settings, request).await?;
        }
    }
    Ok(())
}

fn list_issues(json: bool) -> Result<()> {
    if json {
        let issues: Vec<_> = IssueId::ALL
            .iter()
            .map(|issue| {
                json!({
                    "id": issue,
                    "description": issue.description(),
                    "function": issue.function_name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }

    println!("{} issue(s)", IssueId::ALL.len());
    for issue in IssueId::ALL {
        println!(
            "- {id:<8} {desc}",
            id = issue.code().bold(),
            desc = issue.description()
        );
    }
    Ok(())
}

struct AnalyzeRequest {
    companies: Vec<String>,
    keys: PathBuf,
    mode: FetchMode,
    output: Option<PathBuf>,
    skip_existing: bool,
    format: OutputFormat,
}

async fn run_analyze(settings: &ScoutSettings, request: AnalyzeRequest) -> Result<()> {
    let credentials = match request.mode {
        FetchMode::Offline => Credentials::default(),
        FetchMode::Live => load_credentials(&request.keys)?,
    };
    let sink = request.output.as_deref().map(JsonFileSink::new);

    let existing: BTreeSet<String> = match (&sink, request.skip_existing) {
        (Some(sink), true) => sink.load_existing()?.keys().cloned().collect(),
        _ => BTreeSet::new(),
    };

    let mut write_failed = false;
    let mut on_record = |key: &str, record: &CompanyRecord| {
        let Some(sink) = &sink else { return };
        if write_failed {
            return;
        }
        if let Err(err) = sink.upsert(key, record) {
            warn!(
                error = %format!("{err:#}"),
                %key,
                "failed to write record; remaining records are written at the end"
            );
            write_failed = true;
        }
    };
    let skip = |key: &str| existing.contains(key);

    let batch = analyze(
        &request.companies,
        &credentials,
        settings,
        request.mode,
        &mut on_record,
        &skip,
    )
    .await?;

    print!("{}", render_batch(&batch, request.format)?);
    if request.format == OutputFormat::Human {
        let summary = format!(
            "{} of {} company(ies) recorded",
            batch.len(),
            request.companies.len()
        );
        println!("{}", summary.green());
        if let Some(sink) = &sink {
            println!("Output: {}", sink.path().display());
        }
    } else {
        println!();
    }

    if let (Some(sink), true) = (&sink, write_failed) {
        sink.merge(&batch).context("output document was not fully updated")?;
    }
    Ok(())
}

fn load_credentials(path: &Path) -> Result<Credentials> {
    Credentials::load(path)
        .with_context(|| format!("live analysis needs API keys in {}", path.display()))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
