use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    Fetch,
    Validation,
    Timeout,
    Work,
    Internal,
}

impl PipelineErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineErrorKind::Fetch => "fetch",
            PipelineErrorKind::Validation => "validation",
            PipelineErrorKind::Timeout => "timeout",
            PipelineErrorKind::Work => "work",
            PipelineErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    pub message: String,
    pub key: Option<String>,
}

impl PipelineError {
    pub fn new(kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} (key={})", self.message, key),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for PipelineError {}

pub fn fetch_error(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Fetch, message)
}

pub fn validation_error(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Validation, message)
}

pub fn timeout_error(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Timeout, message)
}

pub fn work_error(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Work, message)
}

pub fn internal_error(message: impl Into<String>) -> PipelineError {
    PipelineError::new(PipelineErrorKind::Internal, message)
}
