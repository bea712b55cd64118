use anyhow::{bail, Result};
use assessor_core::model::{AssessmentForm, JobStatus, UploadFile};
use assessor_core::polling::Pollable;
use assessor_core::{telemetry, AssessmentStore, InMemoryAssessmentApi, JobStore};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Assessor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an upload-to-assessment flow against the in-memory backend.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let api = Arc::new(InMemoryAssessmentApi::with_latency(Duration::from_millis(5)));
        let jobs = Arc::new(JobStore::new(api.clone()));
        let assessments = AssessmentStore::new(api.clone());

        let file = UploadFile::new("smoke.xlsx", b"PK\x03\x04smoke".to_vec());
        let Some(job) = jobs.create_rvtools_job("Smoke run", &file).await? else {
            bail!("smoke job creation was superseded");
        };
        jobs.start_polling(Duration::from_millis(20));

        let mut attempts = 0;
        let finished = loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(current) = jobs.current_job().filter(|job| job.is_terminal()) {
                break current;
            }
            attempts += 1;
            if attempts > 100 {
                jobs.stop_polling();
                bail!("job {} did not finish", job.id);
            }
        };
        jobs.stop_polling();
        if finished.status != JobStatus::Completed {
            bail!("job {} ended as {}", finished.id, finished.status);
        }

        assessments
            .create(&AssessmentForm::from_inventory(
                "Smoke inventory",
                serde_json::json!({"vms": {"total": 1}}),
            ))
            .await?;
        let listed = assessments.list().await?;
        info!(
            job_id = finished.id,
            assessments = listed.len(),
            "smoke test finished"
        );
        Ok(())
    })
}
