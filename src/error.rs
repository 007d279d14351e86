use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TaskId;

/// Failures talking to the scan service.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered HTTP {status}: {body}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed payload from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid service url {0}")]
    InvalidUrl(String),
}

/// A scan could not be started; no session exists.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("{0}")]
    Rejected(String),

    #[error("service accepted the scan but returned no task id")]
    MissingTaskId,

    #[error("task id {0} is already being tracked")]
    DuplicateTaskId(TaskId),

    #[error("Failed to start scan: {0}")]
    Api(#[from] ApiError),
}

/// Which poll request failed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollStage {
    Status,
    Results,
}

/// Why a session stopped polling with `status = error`.
///
/// Stored on the session, so it keeps messages rather than source errors.
#[derive(Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollError {
    /// The status endpoint reported `status: "error"`.
    #[error("{message}")]
    Service { message: String },

    /// The scan finished but the results payload was not `completed`.
    #[error("{message}")]
    Results { message: String },

    #[error("{message}")]
    Transport { stage: PollStage, message: String },
}

impl PollError {
    pub fn message(&self) -> &str {
        match self {
            PollError::Service { message }
            | PollError::Results { message }
            | PollError::Transport { message, .. } => message,
        }
    }
}

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("no session tracked for task {0}")]
    UnknownSession(TaskId),

    #[error("stop request for task {task_id} failed: {source}")]
    Stop {
        task_id: TaskId,
        #[source]
        source: ApiError,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("max attempts must be at least 1")]
    ZeroAttempts,
}
