use assessor_core::model::{JobStatus, UploadFile};
use assessor_core::polling::Pollable;
use assessor_core::{AssessmentStore, InMemoryAssessmentApi, JobState, JobStore};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// Progress labels seen by a subscriber, in order, without repeats.
#[derive(Default)]
struct Labels(Mutex<Vec<String>>);

impl Labels {
    fn push(&self, label: &str) {
        let mut labels = self.0.lock();
        if labels.last().map(String::as_str) != Some(label) {
            labels.push(label.to_string());
        }
    }

    fn all(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

const TICK: Duration = Duration::from_millis(1000);

fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .expect("runtime")
}

fn spreadsheet() -> UploadFile {
    UploadFile::new("vcenter.xlsx", b"PK\x03\x04rvtools".to_vec())
}

async fn tick() {
    tokio::time::advance(TICK).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[test]
fn upload_reaches_completed_and_produces_assessment() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let api = Arc::new(InMemoryAssessmentApi::new());
        let jobs = Arc::new(JobStore::new(api.clone()));
        let labels = Arc::new(Labels::default());
        let _sub = {
            let labels = labels.clone();
            let reader = Arc::downgrade(&jobs);
            jobs.subscribe(move || {
                if let Some(progress) = reader.upgrade().and_then(|jobs| jobs.progress()) {
                    labels.push(progress.label);
                }
            })
        };

        let job = jobs
            .create_rvtools_job("Datacenter", &spreadsheet())
            .await
            .expect("create")
            .expect("job");
        jobs.start_polling(TICK);
        for _ in 0..3 {
            tick().await;
        }
        let finished = jobs.current_job().expect("current job");
        assert_eq!(finished.status, JobStatus::Completed);

        tick().await;
        assert_eq!(api.job_fetches(), 3);
        jobs.stop_polling();

        assert_eq!(
            labels.all(),
            vec![
                "Uploading file",
                "Validating inventory",
                "Parsing inventory",
                "Assessment ready"
            ]
        );

        let assessments = AssessmentStore::new(api.clone());
        let listed = assessments.list().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(finished.assessment_id.as_deref(), Some(listed[0].id.as_str()));
        assert_eq!(listed[0].name, "Datacenter");
        assert_eq!(job.id, finished.id);
    });
}

#[test]
fn cancelling_a_completed_job_allows_assessment_cleanup() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let api = Arc::new(InMemoryAssessmentApi::new());
        let jobs = Arc::new(JobStore::new(api.clone()));
        let assessments = AssessmentStore::new(api.clone());

        jobs.create_rvtools_job("Late cancel", &spreadsheet())
            .await
            .expect("create");
        jobs.start_polling(TICK);
        for _ in 0..3 {
            tick().await;
        }
        jobs.stop_polling();

        let latest = jobs.cancel_job().await.expect("latest job");
        assert_eq!(latest.status, JobStatus::Completed);
        assert!(api.cancel_requests().is_empty());
        assert_eq!(jobs.snapshot(), JobState::default());

        let assessment_id = latest.assessment_id.expect("assessment id");
        assessments.delete(&assessment_id).await.expect("delete");
        assert!(api.assessments().is_empty());
    });
}

#[test]
fn cancelling_mid_flight_cancels_on_server_and_keeps_timer() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let api = Arc::new(InMemoryAssessmentApi::new());
        let jobs = Arc::new(JobStore::new(api.clone()));

        let job = jobs
            .create_rvtools_job("Abandoned", &spreadsheet())
            .await
            .expect("create")
            .expect("job");
        jobs.start_polling(TICK);
        tick().await;
        assert_eq!(jobs.current_job().unwrap().status, JobStatus::Validating);

        let latest = jobs.cancel_job().await.expect("latest job");
        assert_eq!(latest.status, JobStatus::Parsing);
        assert_eq!(api.cancel_requests(), vec![job.id]);
        assert_eq!(api.job(job.id).unwrap().status, JobStatus::Cancelled);
        assert!(jobs.current_job().is_none());
        assert!(jobs.is_polling());

        let fetches = api.job_fetches();
        tick().await;
        assert_eq!(api.job_fetches(), fetches);
        jobs.stop_polling();
    });
}

#[test]
fn empty_upload_ends_in_failure_message() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let api = Arc::new(InMemoryAssessmentApi::new());
        let jobs = Arc::new(JobStore::new(api.clone()));

        jobs.create_rvtools_job("Empty", &UploadFile::new("empty.xlsx", Vec::new()))
            .await
            .expect("create");
        jobs.start_polling(TICK);
        tick().await;
        tick().await;
        jobs.stop_polling();

        let progress = jobs.progress().expect("progress");
        assert!(progress.is_terminal);
        assert_eq!(progress.message.as_deref(), Some("uploaded file is empty"));
    });
}

#[test]
fn create_aborted_before_response_resolves_to_none() {
    let runtime = test_runtime();
    runtime.block_on(async {
        let api = Arc::new(InMemoryAssessmentApi::with_latency(Duration::from_millis(200)));
        let jobs = Arc::new(JobStore::new(api.clone()));

        let creating = {
            let jobs = jobs.clone();
            tokio::spawn(async move { jobs.create_rvtools_job("Aborted", &spreadsheet()).await })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(jobs.snapshot().is_creating);

        assert!(jobs.cancel_job().await.is_none());
        let created = creating.await.expect("join").expect("no error");
        assert!(created.is_none());
        assert!(api.job(1).is_none());
        assert_eq!(jobs.snapshot(), JobState::default());
    });
}
