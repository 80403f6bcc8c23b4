use crate::types::JobStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the generation service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service responded with status {status}: {}", .message.as_deref().unwrap_or("no detail"))]
    Status { status: u16, message: Option<String> },

    #[error("not authorized; sign in again")]
    Unauthorized,

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request URL: {0}")]
    Url(String),
}

impl ApiError {
    /// The `error` field the service put in its response body, if any.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Unauthorized => self.to_string(),
            other => other.service_message().unwrap_or(fallback).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no current mood detected; check your mood first or pick a custom mood")]
    NoCurrentMood,

    #[error("{field} must be between 0 and 1 (got {value})")]
    OutOfRange { field: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Submission {
        message: String,
        #[source]
        source: ApiError,
    },

    #[error("status query for job {job_id} failed: {source}")]
    PollTransient {
        job_id: String,
        #[source]
        source: ApiError,
    },

    #[error("stopped polling job {job_id} after {failures} consecutive failed status queries")]
    PollAbandoned {
        job_id: String,
        failures: u32,
        #[source]
        last_error: Box<GenerationError>,
    },

    #[error("{message}")]
    Download {
        job_id: String,
        message: String,
        #[source]
        source: Option<ApiError>,
    },

    #[error("{message}")]
    HistoryLoad {
        message: String,
        #[source]
        source: ApiError,
    },

    #[error("job {job_id} is {status}; only completed jobs can be downloaded")]
    NotCompleted { job_id: String, status: JobStatus },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenerationError {
    pub fn submission(source: ApiError) -> Self {
        Self::Submission { message: source.user_message("Failed to start generation"), source }
    }

    pub fn download(job_id: &str, source: ApiError) -> Self {
        Self::Download {
            job_id: job_id.to_string(),
            message: source.user_message("Failed to download file"),
            source: Some(source),
        }
    }

    pub fn history(source: ApiError) -> Self {
        Self::HistoryLoad { message: source.user_message("Failed to load history"), source }
    }
}
