use anyhow::anyhow;
use assessor::commands::{self, Context};
use assessor_core::config::{ClientSettings, Overrides, DEFAULT_POLL_INTERVAL};
use assessor_core::{telemetry, HttpAssessmentApi, InMemoryAssessmentApi, VersionRegistry};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "assessor", version, about = "Migration assessment client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Planner base URL, overrides config and environment.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Explicit path to assessor.yaml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Talk to an in-process simulated backend instead of a planner.
    #[arg(long, global = true)]
    mock: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an RVTools export and wait for the assessment.
    Upload {
        #[arg(long)]
        name: String,
        file: PathBuf,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Show the status of a job.
    Status { job_id: i64 },
    #[command(subcommand)]
    Assessments(AssessmentCommand),
    /// Print component versions.
    Version,
}

#[derive(Subcommand, Debug)]
enum AssessmentCommand {
    List,
    /// Create an assessment from a discovery-agent inventory JSON file.
    Import {
        #[arg(long)]
        name: String,
        inventory: PathBuf,
    },
    Rename { id: String, name: String },
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(telemetry::filter_from_env("warn"))?;
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        commands::version(&VersionRegistry::new());
        return Ok(());
    }

    let interval_override = match &cli.command {
        Command::Upload {
            interval_ms: Some(ms),
            ..
        } => Some(Duration::from_millis(*ms)),
        _ => None,
    };
    let ctx = build_context(&cli, interval_override)?;

    match cli.command {
        Command::Upload { name, file, .. } => commands::upload(&ctx, &name, &file).await,
        Command::Status { job_id } => commands::status(&ctx, job_id).await,
        Command::Assessments(AssessmentCommand::List) => commands::list_assessments(&ctx).await,
        Command::Assessments(AssessmentCommand::Import { name, inventory }) => {
            commands::import_inventory(&ctx, &name, &inventory).await
        }
        Command::Assessments(AssessmentCommand::Rename { id, name }) => {
            commands::rename_assessment(&ctx, &id, &name).await
        }
        Command::Assessments(AssessmentCommand::Delete { id }) => {
            commands::delete_assessment(&ctx, &id).await
        }
        Command::Version => Ok(()),
    }
}

fn build_context(cli: &Cli, interval: Option<Duration>) -> anyhow::Result<Context> {
    if interval.is_some_and(|interval| interval.is_zero()) {
        return Err(anyhow!("--interval-ms must be greater than zero"));
    }
    if cli.mock {
        return Ok(Context {
            api: Arc::new(InMemoryAssessmentApi::new()),
            poll_interval: interval.unwrap_or(DEFAULT_POLL_INTERVAL),
        });
    }
    let overrides = Overrides {
        base_url: cli.api_url.clone(),
        token: None,
        poll_interval: interval,
    };
    let settings = ClientSettings::load(cli.config.as_deref(), overrides)
        .map_err(|err| anyhow!(err.user_message()))?;
    Ok(Context {
        api: Arc::new(HttpAssessmentApi::new(&settings.api)?),
        poll_interval: settings.poll_interval,
    })
}
