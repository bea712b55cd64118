use super::{with_cancel, ApiError, ApiResult, AssessmentApi, AssessmentListPayload};
use crate::config::ApiSettings;
use crate::model::{Assessment, AssessmentForm, AssessmentUpdate, Job, JobId, UploadFile};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub const API_PREFIX: &str = "api/v1/";

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// [`AssessmentApi`] over the planner's REST endpoints.
#[derive(Clone)]
pub struct HttpAssessmentApi {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpAssessmentApi {
    pub fn new(settings: &ApiSettings) -> ApiResult<Self> {
        let mut base_url = Url::parse(&settings.base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = settings.token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ApiError::Config("invalid API token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("assessor/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            timeout: settings.timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> ApiResult<Url> {
        let path = path.trim_start_matches('/');
        Ok(self.base_url.join(API_PREFIX)?.join(path)?)
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = request.timeout(self.timeout).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(extract_error(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.send(request).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn extract_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.json::<ErrorResponse>().await.ok();
    let (code, message) = match body {
        Some(body) => (body.code, body.message),
        None => (None, format!("HTTP {status}")),
    };
    match status {
        404 => ApiError::NotFound(message),
        401 | 403 => ApiError::Auth(message),
        _ => ApiError::Api {
            status,
            code: code.unwrap_or_else(|| "unknown".to_string()),
            message,
        },
    }
}

#[async_trait]
impl AssessmentApi for HttpAssessmentApi {
    async fn create_rvtools_job(
        &self,
        name: &str,
        file: &UploadFile,
        cancel: &CancellationToken,
    ) -> ApiResult<Job> {
        let url = self.url("assessments/rvtools")?;
        let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        let form = Form::new().text("name", name.to_string()).part("file", part);
        debug!(name, file = %file.file_name, bytes = file.bytes.len(), "uploading RVTools file");
        with_cancel(
            cancel,
            self.send_json(self.http.post(url).multipart(form)),
        )
        .await
    }

    async fn get_job(&self, id: JobId, cancel: &CancellationToken) -> ApiResult<Job> {
        let url = self.url(&format!("assessments/jobs/{id}"))?;
        with_cancel(cancel, self.send_json(self.http.get(url))).await
    }

    async fn cancel_job(&self, id: JobId) -> ApiResult<()> {
        let url = self.url(&format!("assessments/jobs/{id}"))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn list_assessments(&self, cancel: &CancellationToken) -> ApiResult<Vec<Assessment>> {
        let url = self.url("assessments")?;
        with_cancel(cancel, async {
            let response = self.send(self.http.get(url)).await?;
            let body = response.bytes().await?;
            AssessmentListPayload::parse(&body)
        })
        .await
    }

    async fn create_assessment(&self, form: &AssessmentForm) -> ApiResult<Assessment> {
        let url = self.url("assessments")?;
        self.send_json(self.http.post(url).json(form)).await
    }

    async fn update_assessment(
        &self,
        id: &str,
        update: &AssessmentUpdate,
    ) -> ApiResult<Assessment> {
        let url = self.url(&format!("assessments/{id}"))?;
        self.send_json(self.http.put(url).json(update)).await
    }

    async fn delete_assessment(&self, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("assessments/{id}"))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}
