use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ContactField;

/// Internal failure taxonomy. All kinds surface to the visitor as the same
/// `Failed` status; the kind is kept for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Configuration,
    Dispatch,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Configuration => "configuration",
            FailureKind::Dispatch => "dispatch",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown contact field '{0}'")]
pub struct UnknownFieldError(pub String);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("mail dispatch client is not loaded yet")]
    CapabilityUnavailable,
    #[error("mail dispatch transport failure: {0}")]
    Transport(String),
    #[error("mail dispatch timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("required fields are blank: {}", join_fields(.missing))]
    Validation { missing: Vec<ContactField> },
    #[error("mail service configuration is missing: {}", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl SubmissionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubmissionError::Validation { .. } => FailureKind::Validation,
            SubmissionError::Configuration { .. } => FailureKind::Configuration,
            SubmissionError::Dispatch(_) => FailureKind::Dispatch,
        }
    }
}

fn join_fields(fields: &[ContactField]) -> String {
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
