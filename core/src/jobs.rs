use crate::api::AssessmentApi;
use crate::model::{Job, JobProgress, UploadFile};
use crate::polling::{Pollable, Poller};
use crate::store::{ObservableStore, StoreError, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobState {
    pub current_job: Option<Job>,
    pub is_creating: bool,
    pub create_error: Option<String>,
}

impl JobState {
    pub fn progress(&self) -> Option<JobProgress> {
        self.current_job.as_ref().map(JobProgress::from_job)
    }
}

pub struct JobStore {
    api: Arc<dyn AssessmentApi>,
    state: ObservableStore<JobState>,
    poller: Poller,
    create_token: Mutex<Option<(u64, CancellationToken)>>,
    create_seq: AtomicU64,
    cancelling: AtomicBool,
    cleanup: TaskTracker,
}

/// Clears the re-entrancy flag however `cancel_job` exits.
struct CancelGuard<'a>(&'a AtomicBool);

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobStore {
    pub fn new(api: Arc<dyn AssessmentApi>) -> Self {
        Self {
            api,
            state: ObservableStore::default(),
            poller: Poller::new(),
            create_token: Mutex::new(None),
            create_seq: AtomicU64::new(0),
            cancelling: AtomicBool::new(false),
            cleanup: TaskTracker::new(),
        }
    }

    pub fn snapshot(&self) -> JobState {
        self.state.snapshot()
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.state.subscribe(listener)
    }

    pub fn current_job(&self) -> Option<Job> {
        self.state.read(|state| state.current_job.clone())
    }

    pub fn progress(&self) -> Option<JobProgress> {
        self.state.read(JobState::progress)
    }

    /// Upload an RVTools file and start a processing job for it.
    ///
    /// Returns `Ok(None)` when the request was superseded by another create or
    /// aborted by [`JobStore::cancel_job`]. Polling is left to the caller.
    pub async fn create_rvtools_job(
        &self,
        name: &str,
        file: &UploadFile,
    ) -> Result<Option<Job>, StoreError> {
        let token = CancellationToken::new();
        let seq = self.create_seq.fetch_add(1, Ordering::SeqCst);
        if let Some((_, previous)) = self.create_token.lock().replace((seq, token.clone())) {
            previous.cancel();
        }
        self.state.update(|state| {
            state.is_creating = true;
            state.create_error = None;
        });

        let result = self.api.create_rvtools_job(name, file, &token).await;
        let aborted = token.is_cancelled();
        self.release_create_token(seq);

        match result {
            Ok(job) if aborted => {
                info!(job_id = job.id, "job created after abort; cancelling on server");
                let api = self.api.clone();
                self.cleanup.spawn(async move {
                    if let Err(err) = api.cancel_job(job.id).await {
                        debug!(job_id = job.id, error = %err, "cleanup cancel failed");
                    }
                });
                Ok(None)
            }
            Ok(job) => {
                info!(job_id = job.id, status = %job.status, "job created");
                self.state.update(|state| {
                    state.current_job = Some(job.clone());
                    state.is_creating = false;
                    state.create_error = None;
                });
                Ok(Some(job))
            }
            Err(_) if aborted => Ok(None),
            Err(err) => {
                warn!(error = %err, "failed to create job");
                self.state.update(|state| {
                    state.is_creating = false;
                    state.create_error = Some(err.to_string());
                });
                Err(err.into())
            }
        }
    }

    /// Abort the tracked job and clear local state.
    ///
    /// Returns the most recent view of the job so the caller can clean up
    /// anything it already produced. A call made while another cancel is
    /// running returns `None` and does nothing.
    pub async fn cancel_job(&self) -> Option<Job> {
        if self
            .cancelling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let _guard = CancelGuard(&self.cancelling);

        if let Some((_, token)) = self.create_token.lock().take() {
            token.cancel();
        }

        let latest = match self.current_job() {
            Some(local) => match self.api.get_job(local.id, &CancellationToken::new()).await {
                Ok(job) => Some(job),
                Err(err) => {
                    warn!(job_id = local.id, error = %err, "using last known job state");
                    Some(local)
                }
            },
            None => None,
        };

        if let Some(job) = latest.as_ref().filter(|job| !job.is_terminal()) {
            match self.api.cancel_job(job.id).await {
                Ok(()) => info!(job_id = job.id, "job cancelled"),
                Err(err) => warn!(job_id = job.id, error = %err, "failed to cancel job"),
            }
        }

        self.reset();
        latest
    }

    /// Wait for server-side cancels of jobs whose create was aborted.
    pub async fn wait_for_cleanup(&self) {
        self.cleanup.close();
        self.cleanup.wait().await;
        self.cleanup.reopen();
    }

    /// Back to the initial state. Polling is not affected.
    pub fn reset(&self) {
        self.state.set(JobState::default());
    }

    fn release_create_token(&self, seq: u64) {
        let mut current = self.create_token.lock();
        if current.as_ref().is_some_and(|(current, _)| *current == seq) {
            *current = None;
        }
    }
}

#[async_trait]
impl Pollable for JobStore {
    fn poller(&self) -> &Poller {
        &self.poller
    }

    async fn poll(&self, cancel: CancellationToken) -> Result<(), StoreError> {
        if self.cancelling.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(job) = self.current_job().filter(|job| !job.is_terminal()) else {
            return Ok(());
        };

        let latest = match self.api.get_job(job.id, &cancel).await {
            Ok(latest) => latest,
            Err(err) if err.is_cancelled() => return Ok(()),
            Err(err) => {
                warn!(job_id = job.id, error = %err, "failed to refresh job status");
                return Ok(());
            }
        };
        if cancel.is_cancelled() || self.cancelling.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut status_changed = false;
        self.state.update_if(|state| match state.current_job.as_mut() {
            Some(current) if current.id == latest.id => {
                status_changed = current.status != latest.status;
                *current = latest.clone();
                true
            }
            _ => false,
        });
        if status_changed {
            debug!(job_id = latest.id, status = %latest.status, "job status changed");
        }
        Ok(())
    }
}
