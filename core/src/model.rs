use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type JobId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Validating,
    Parsing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const TERMINAL: [JobStatus; 3] = [Self::Completed, Self::Failed, Self::Cancelled];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Parsing => "parsing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side processing job for an uploaded inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: JobId, status: JobStatus) -> Self {
        Self {
            id,
            status,
            assessment_id: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Message to show the user when the backend reports the job as failed.
    pub fn failure_message(&self) -> Option<String> {
        if self.status != JobStatus::Failed {
            return None;
        }
        let detail = self
            .error
            .as_deref()
            .map(str::trim)
            .filter(|detail| !detail.is_empty());
        Some(match detail {
            Some(detail) => detail.to_string(),
            None => "Processing failed without further detail.".to_string(),
        })
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress::from_job(self)
    }
}

/// Progress view derived from a job's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub step: usize,
    pub total: usize,
    pub label: &'static str,
    pub message: Option<String>,
    pub is_terminal: bool,
}

impl JobProgress {
    pub const TOTAL_STEPS: usize = 3;

    pub fn from_job(job: &Job) -> Self {
        let (step, label) = match job.status {
            JobStatus::Pending => (0, "Uploading file"),
            JobStatus::Validating => (1, "Validating inventory"),
            JobStatus::Parsing => (2, "Parsing inventory"),
            JobStatus::Completed => (3, "Assessment ready"),
            JobStatus::Failed => (3, "Processing failed"),
            JobStatus::Cancelled => (3, "Cancelled"),
        };
        Self {
            step,
            total: Self::TOTAL_STEPS,
            label,
            message: job.failure_message(),
            is_terminal: job.is_terminal(),
        }
    }

    pub fn percent(&self) -> u8 {
        ((self.step * 100) / self.total) as u8
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Rvtools,
    Agent,
    Inventory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub name: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentForm {
    pub name: String,
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<serde_json::Value>,
}

impl AssessmentForm {
    pub fn from_inventory(name: impl Into<String>, inventory: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            source_type: SourceType::Inventory,
            source_id: None,
            inventory: Some(inventory),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AssessmentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An inventory file ready to be sent as a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("inventory.xlsx")
            .to_string();
        Ok(Self { file_name, bytes })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
