pub mod api;
pub mod assessments;
pub mod config;
pub mod jobs;
pub mod model;
pub mod polling;
pub mod store;
pub mod telemetry;
pub mod version;

pub use api::{ApiError, AssessmentApi, HttpAssessmentApi, InMemoryAssessmentApi};
pub use assessments::{AssessmentState, AssessmentStore};
pub use config::{ClientSettings, ConfigError};
pub use jobs::{JobState, JobStore};
pub use model::{Assessment, Job, JobId, JobProgress, JobStatus, UploadFile};
pub use polling::{Pollable, Poller};
pub use store::{ObservableStore, StoreError, Subscription};
pub use version::{VersionInfo, VersionRegistry};
