use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{provider} rejected the submission{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    SubmissionRejected {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Content moderated by {provider}: {detail}")]
    ContentModerated { provider: String, detail: String },

    #[error("{provider} is temporarily unavailable: {message}")]
    TransientProvider { provider: String, message: String },

    #[error("{provider} failed to generate: {detail}")]
    ProviderFailed { provider: String, detail: String },

    #[error("{provider} job {job_id} no longer exists")]
    JobNotFound { provider: String, job_id: String },

    #[error("{provider} job {job_id} did not finish after {attempts} polls ({}ms)", .elapsed.as_millis())]
    PollingTimeout {
        provider: String,
        job_id: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Generation request timed out after {}s", .0.as_secs())]
    RequestTimeout(Duration),

    #[error("All {attempted} generations failed: {summary}")]
    AllUnitsFailed { attempted: usize, summary: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification used for ranking failure reasons and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Configuration,
    Rejected,
    Moderated,
    Transient,
    ProviderFailed,
    NotFound,
    Timeout,
    Persistence,
    Credits,
    Cancelled,
    Generic,
}

impl ErrorKind {
    /// Lower is more actionable for the user.
    pub fn relevance(&self) -> u8 {
        match self {
            ErrorKind::Moderated => 0,
            ErrorKind::ProviderFailed | ErrorKind::Rejected => 1,
            ErrorKind::Configuration | ErrorKind::Validation | ErrorKind::Credits => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::Persistence => 4,
            ErrorKind::Timeout | ErrorKind::Transient => 5,
            ErrorKind::Cancelled | ErrorKind::Generic => 6,
        }
    }
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Validation(_) => ErrorKind::Validation,
            GenerationError::Configuration(_) => ErrorKind::Configuration,
            GenerationError::SubmissionRejected { .. } => ErrorKind::Rejected,
            GenerationError::ContentModerated { .. } => ErrorKind::Moderated,
            GenerationError::TransientProvider { .. } => ErrorKind::Transient,
            GenerationError::ProviderFailed { .. } => ErrorKind::ProviderFailed,
            GenerationError::JobNotFound { .. } => ErrorKind::NotFound,
            GenerationError::PollingTimeout { .. } | GenerationError::RequestTimeout(_) => {
                ErrorKind::Timeout
            }
            GenerationError::Persistence(_) => ErrorKind::Persistence,
            GenerationError::InsufficientCredits { .. } => ErrorKind::Credits,
            GenerationError::Cancelled => ErrorKind::Cancelled,
            GenerationError::AllUnitsFailed { .. } | GenerationError::Serialization(_) => {
                ErrorKind::Generic
            }
        }
    }

    /// Only transient provider errors are worth another poll.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::TransientProvider { .. })
    }

    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        GenerationError::TransientProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status from a provider into the taxonomy.
    pub fn from_status(provider: &str, status: u16, body: String) -> Self {
        match status {
            401 | 403 => GenerationError::Configuration(format!(
                "{} rejected credentials ({}): {}",
                provider, status, body
            )),
            408 | 429 | 500..=599 => GenerationError::transient(
                provider,
                format!("HTTP {}: {}", status, body),
            ),
            _ if looks_moderated(&body) => GenerationError::ContentModerated {
                provider: provider.to_string(),
                detail: body,
            },
            _ => GenerationError::SubmissionRejected {
                provider: provider.to_string(),
                status: Some(status),
                message: body,
            },
        }
    }

    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return GenerationError::from_status(provider, status.as_u16(), err.to_string());
        }
        if err.is_builder() {
            return GenerationError::Configuration(format!("{}: {}", provider, err));
        }
        GenerationError::transient(provider, err.to_string())
    }
}

/// Heuristic shared by providers that report moderation only as free text.
pub fn looks_moderated(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["moderat", "nsfw", "content filter", "safety", "inappropriate", "policy violation"]
        .iter()
        .any(|needle| lower.contains(needle))
}

impl From<serde_json::Error> for GenerationError {
    fn from(err: serde_json::Error) -> Self {
        GenerationError::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for GenerationError {
    fn from(err: tokio_postgres::Error) -> Self {
        GenerationError::Persistence(format!("Database error: {}", err))
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for GenerationError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        GenerationError::Persistence(format!("Failed to get connection: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            GenerationError::from_status("flux", 401, "bad key".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            GenerationError::from_status("flux", 503, "busy".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            GenerationError::from_status("flux", 429, "slow down".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            GenerationError::from_status("luma", 400, "prompt flagged by moderation".into()).kind(),
            ErrorKind::Moderated
        );
        assert_eq!(
            GenerationError::from_status("luma", 422, "bad aspect ratio".into()).kind(),
            ErrorKind::Rejected
        );
    }

    #[test]
    fn moderation_outranks_timeout() {
        assert!(ErrorKind::Moderated.relevance() < ErrorKind::ProviderFailed.relevance());
        assert!(ErrorKind::ProviderFailed.relevance() < ErrorKind::Timeout.relevance());
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(GenerationError::transient("flux", "503").is_retryable());
        assert!(!GenerationError::ContentModerated {
            provider: "flux".into(),
            detail: "nsfw".into()
        }
        .is_retryable());
    }

    #[test]
    fn display_includes_detail() {
        let err = GenerationError::ContentModerated {
            provider: "flux".into(),
            detail: "Request Moderated: Derivative Works Filter".into(),
        };
        assert!(err.to_string().contains("Derivative Works Filter"));

        let err = GenerationError::SubmissionRejected {
            provider: "luma".into(),
            status: Some(422),
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "luma rejected the submission (422): bad");
    }
}
