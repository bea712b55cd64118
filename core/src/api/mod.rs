mod http;
mod memory;

pub use http::{HttpAssessmentApi, API_PREFIX};
pub use memory::InMemoryAssessmentApi;

use crate::model::{Assessment, AssessmentForm, AssessmentUpdate, Job, JobId, UploadFile};
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request was cancelled")]
    Cancelled,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait AssessmentApi: Send + Sync {
    async fn create_rvtools_job(
        &self,
        name: &str,
        file: &UploadFile,
        cancel: &CancellationToken,
    ) -> ApiResult<Job>;

    async fn get_job(&self, id: JobId, cancel: &CancellationToken) -> ApiResult<Job>;

    async fn cancel_job(&self, id: JobId) -> ApiResult<()>;

    async fn list_assessments(&self, cancel: &CancellationToken) -> ApiResult<Vec<Assessment>>;

    async fn create_assessment(&self, form: &AssessmentForm) -> ApiResult<Assessment>;

    async fn update_assessment(&self, id: &str, update: &AssessmentUpdate)
        -> ApiResult<Assessment>;

    async fn delete_assessment(&self, id: &str) -> ApiResult<()>;
}

/// Race `request` against `cancel`; a cancelled token wins.
pub(crate) async fn with_cancel<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = ApiResult<T>>,
) -> ApiResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = request => result,
    }
}

/// Shapes the list endpoint answers with. Anything else is a decode error.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AssessmentListPayload {
    Bare(Vec<Assessment>),
    Items { items: Vec<Assessment> },
    Assessments { assessments: Vec<Assessment> },
}

impl AssessmentListPayload {
    pub fn parse(body: &[u8]) -> ApiResult<Vec<Assessment>> {
        let payload: Self = serde_json::from_slice(body)?;
        Ok(payload.into_assessments())
    }

    pub fn into_assessments(self) -> Vec<Assessment> {
        match self {
            Self::Bare(list) => list,
            Self::Items { items } => items,
            Self::Assessments { assessments } => assessments,
        }
    }
}
