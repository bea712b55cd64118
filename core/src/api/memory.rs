use super::{with_cancel, ApiError, ApiResult, AssessmentApi};
use crate::model::{
    Assessment, AssessmentForm, AssessmentUpdate, Job, JobId, JobStatus, SourceType, UploadFile,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Simulated planner backend.
///
/// Every `get_job` moves a job one status forward
/// (pending, validating, parsing, completed). Completing a job creates its
/// assessment. Uploads with no bytes fail during validation.
#[derive(Default)]
pub struct InMemoryAssessmentApi {
    backend: Mutex<Backend>,
    latency: Duration,
}

#[derive(Default)]
struct Backend {
    next_job_id: JobId,
    jobs: HashMap<JobId, TrackedJob>,
    assessments: Vec<Assessment>,
    job_fetches: usize,
    cancel_requests: Vec<JobId>,
}

struct TrackedJob {
    job: Job,
    name: String,
    empty_upload: bool,
}

impl InMemoryAssessmentApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`; cancellable calls honour their token
    /// while waiting.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn job(&self, id: JobId) -> Option<Job> {
        self.backend.lock().jobs.get(&id).map(|tracked| tracked.job.clone())
    }

    pub fn assessments(&self) -> Vec<Assessment> {
        self.backend.lock().assessments.clone()
    }

    pub fn job_fetches(&self) -> usize {
        self.backend.lock().job_fetches
    }

    pub fn cancel_requests(&self) -> Vec<JobId> {
        self.backend.lock().cancel_requests.clone()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }
}

impl Backend {
    fn advance(&mut self, id: JobId) -> ApiResult<Job> {
        let tracked = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;
        let next = match tracked.job.status {
            JobStatus::Pending => JobStatus::Validating,
            JobStatus::Validating if tracked.empty_upload => JobStatus::Failed,
            JobStatus::Validating => JobStatus::Parsing,
            JobStatus::Parsing => JobStatus::Completed,
            terminal => terminal,
        };
        if next == tracked.job.status {
            return Ok(tracked.job.clone());
        }
        tracked.job.status = next;
        match next {
            JobStatus::Failed => {
                tracked.job.error = Some("uploaded file is empty".to_string());
            }
            JobStatus::Completed => {
                let now = Utc::now();
                let assessment = Assessment {
                    id: Uuid::new_v4().to_string(),
                    name: tracked.name.clone(),
                    source_type: SourceType::Rvtools,
                    source_id: None,
                    created_at: Some(now),
                    updated_at: Some(now),
                };
                tracked.job.assessment_id = Some(assessment.id.clone());
                self.assessments.push(assessment);
            }
            _ => {}
        }
        Ok(tracked.job.clone())
    }
}

#[async_trait]
impl AssessmentApi for InMemoryAssessmentApi {
    async fn create_rvtools_job(
        &self,
        name: &str,
        file: &UploadFile,
        cancel: &CancellationToken,
    ) -> ApiResult<Job> {
        with_cancel(cancel, async {
            self.delay().await;
            let mut backend = self.backend.lock();
            backend.next_job_id += 1;
            let job = Job::new(backend.next_job_id, JobStatus::Pending);
            backend.jobs.insert(
                job.id,
                TrackedJob {
                    job: job.clone(),
                    name: name.to_string(),
                    empty_upload: file.is_empty(),
                },
            );
            Ok(job)
        })
        .await
    }

    async fn get_job(&self, id: JobId, cancel: &CancellationToken) -> ApiResult<Job> {
        with_cancel(cancel, async {
            self.delay().await;
            let mut backend = self.backend.lock();
            backend.job_fetches += 1;
            backend.advance(id)
        })
        .await
    }

    async fn cancel_job(&self, id: JobId) -> ApiResult<()> {
        self.delay().await;
        let mut backend = self.backend.lock();
        backend.cancel_requests.push(id);
        let tracked = backend
            .jobs
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("job {id}")))?;
        if !tracked.job.is_terminal() {
            tracked.job.status = JobStatus::Cancelled;
        }
        Ok(())
    }

    async fn list_assessments(&self, cancel: &CancellationToken) -> ApiResult<Vec<Assessment>> {
        with_cancel(cancel, async {
            self.delay().await;
            Ok(self.backend.lock().assessments.clone())
        })
        .await
    }

    async fn create_assessment(&self, form: &AssessmentForm) -> ApiResult<Assessment> {
        self.delay().await;
        if form.name.trim().is_empty() {
            return Err(ApiError::Api {
                status: 400,
                code: "invalid_name".to_string(),
                message: "assessment name must not be empty".to_string(),
            });
        }
        let now = Utc::now();
        let assessment = Assessment {
            id: Uuid::new_v4().to_string(),
            name: form.name.trim().to_string(),
            source_type: form.source_type,
            source_id: form.source_id.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.backend.lock().assessments.push(assessment.clone());
        Ok(assessment)
    }

    async fn update_assessment(
        &self,
        id: &str,
        update: &AssessmentUpdate,
    ) -> ApiResult<Assessment> {
        self.delay().await;
        let mut backend = self.backend.lock();
        let assessment = backend
            .assessments
            .iter_mut()
            .find(|assessment| assessment.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("assessment {id}")))?;
        if let Some(name) = &update.name {
            assessment.name = name.clone();
        }
        assessment.updated_at = Some(Utc::now());
        Ok(assessment.clone())
    }

    async fn delete_assessment(&self, id: &str) -> ApiResult<()> {
        self.delay().await;
        let mut backend = self.backend.lock();
        let before = backend.assessments.len();
        backend.assessments.retain(|assessment| assessment.id != id);
        if backend.assessments.len() == before {
            return Err(ApiError::NotFound(format!("assessment {id}")));
        }
        Ok(())
    }
}
