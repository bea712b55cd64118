use crate::render;
use anyhow::{bail, Context as _, Result};
use assessor_core::model::{AssessmentForm, JobId, JobStatus, UploadFile};
use assessor_core::polling::Pollable;
use assessor_core::version::{VersionInfo, VersionRegistry, CORE_VERSION};
use assessor_core::{AssessmentApi, AssessmentStore, JobStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a command needs: the backend and the polling cadence.
#[derive(Clone)]
pub struct Context {
    pub api: Arc<dyn AssessmentApi>,
    pub poll_interval: Duration,
}

/// Upload an RVTools export and follow the job until it finishes.
///
/// Ctrl-C cancels the job; an assessment the job managed to produce before
/// the cancel reached the server is deleted again.
pub async fn upload(ctx: &Context, name: &str, path: &Path) -> Result<()> {
    let file = UploadFile::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let jobs = Arc::new(JobStore::new(ctx.api.clone()));

    let (tx, mut changes) = unbounded_channel();
    let subscription = jobs.subscribe(move || {
        let _ = tx.send(());
    });

    let mut creating = {
        let jobs = jobs.clone();
        let name = name.to_string();
        tokio::spawn(async move { jobs.create_rvtools_job(&name, &file).await })
    };
    let created = tokio::select! {
        joined = &mut creating => joined.context("upload task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            jobs.cancel_job().await;
            let _ = creating.await;
            jobs.wait_for_cleanup().await;
            subscription.unsubscribe();
            println!("Upload cancelled.");
            return Ok(());
        }
    };
    let Some(job) = created else {
        println!("Upload was superseded.");
        return Ok(());
    };
    println!("Created {}", render::job_summary(&job));

    jobs.start_polling(ctx.poll_interval);
    let mut last_line = None;
    let outcome = loop {
        if let Some(progress) = jobs.progress() {
            let line = render::progress_line(&progress);
            if last_line.as_ref() != Some(&line) {
                println!("{line}");
                last_line = Some(line);
            }
            if progress.is_terminal {
                break jobs.current_job();
            }
        }
        tokio::select! {
            changed = changes.recv() => {
                if changed.is_none() {
                    break jobs.current_job();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                jobs.stop_polling();
                let latest = jobs.cancel_job().await;
                cleanup_after_cancel(ctx, latest.as_ref()).await;
                println!("Upload cancelled.");
                subscription.unsubscribe();
                return Ok(());
            }
        }
    };
    jobs.stop_polling();
    subscription.unsubscribe();

    match outcome {
        Some(job) if job.status == JobStatus::Completed => {
            println!("{}", render::job_summary(&job));
            Ok(())
        }
        Some(job) if job.status == JobStatus::Failed => {
            bail!(job.failure_message().unwrap_or_default())
        }
        Some(job) => {
            println!("{}", render::job_summary(&job));
            Ok(())
        }
        None => bail!("job state was cleared before it finished"),
    }
}

async fn cleanup_after_cancel(ctx: &Context, latest: Option<&assessor_core::Job>) {
    let Some(assessment_id) = latest
        .filter(|job| job.status == JobStatus::Completed)
        .and_then(|job| job.assessment_id.as_deref())
    else {
        return;
    };
    match ctx.api.delete_assessment(assessment_id).await {
        Ok(()) => info!(assessment_id, "removed assessment produced by cancelled job"),
        Err(err) => warn!(assessment_id, error = %err, "failed to remove assessment"),
    }
}

pub async fn status(ctx: &Context, id: JobId) -> Result<()> {
    let job = ctx.api.get_job(id, &CancellationToken::new()).await?;
    println!("{}", render::job_summary(&job));
    println!("{}", render::progress_line(&job.progress()));
    Ok(())
}

pub async fn list_assessments(ctx: &Context) -> Result<()> {
    let store = AssessmentStore::new(ctx.api.clone());
    let assessments = store.list().await?;
    println!("{}", render::assessment_table(&assessments).trim_end());
    Ok(())
}

pub async fn import_inventory(ctx: &Context, name: &str, path: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let inventory: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let store = AssessmentStore::new(ctx.api.clone());
    let assessment = store
        .create(&AssessmentForm::from_inventory(name, inventory))
        .await?;
    println!("Created assessment {} ({})", assessment.id, assessment.name);
    Ok(())
}

pub async fn rename_assessment(ctx: &Context, id: &str, name: &str) -> Result<()> {
    let store = AssessmentStore::new(ctx.api.clone());
    let assessment = store.rename(id, name).await?;
    println!("Renamed assessment {} to {}", assessment.id, assessment.name);
    Ok(())
}

pub async fn delete_assessment(ctx: &Context, id: &str) -> Result<()> {
    let store = AssessmentStore::new(ctx.api.clone());
    store.delete(id).await?;
    println!("Deleted assessment {id}");
    Ok(())
}

pub fn version(registry: &VersionRegistry) {
    let cli = registry.register("assessor", VersionInfo::new(env!("CARGO_PKG_VERSION")));
    let core = registry.register("assessor-core", VersionInfo::new(CORE_VERSION));
    for (component, info) in registry.entries() {
        println!("{component} {info}");
    }
    cli.unregister();
    core.unregister();
}
