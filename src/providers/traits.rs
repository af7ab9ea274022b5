use async_trait::async_trait;

use crate::{
    error::Result,
    models::{GenerationRequest, ModelSpec, ProviderKind},
    polling::PollConfig,
};

/// Binary result of a generation, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ResultPayload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }
}

/// What a provider hands back from `submit`. Synchronous APIs skip polling.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Job(String),
    Immediate(ResultPayload),
}

/// Provider status normalized to the states the polling engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Succeeded,
    Failed,
    Moderated,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollStatus {
    pub state: JobState,
    pub result_ref: Option<String>,
    pub error_detail: Option<String>,
}

impl PollStatus {
    pub fn pending() -> Self {
        Self {
            state: JobState::Pending,
            result_ref: None,
            error_detail: None,
        }
    }

    pub fn succeeded(result_ref: impl Into<String>) -> Self {
        Self {
            state: JobState::Succeeded,
            result_ref: Some(result_ref.into()),
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed,
            result_ref: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn moderated(detail: impl Into<String>) -> Self {
        Self {
            state: JobState::Moderated,
            result_ref: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn not_found() -> Self {
        Self {
            state: JobState::NotFound,
            result_ref: None,
            error_detail: None,
        }
    }
}

/// One external generation service behind the submit / poll / fetch contract.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn model(&self) -> &'static ModelSpec;

    /// Backoff tuning for this provider's jobs.
    fn polling(&self) -> PollConfig;

    async fn submit(&self, request: &GenerationRequest, unit: usize) -> Result<Submission>;

    async fn poll_status(&self, job_id: &str) -> Result<PollStatus>;

    async fn fetch_result(&self, result_ref: &str) -> Result<ResultPayload>;
}
