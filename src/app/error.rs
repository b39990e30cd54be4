use serde::Serialize;
use std::fmt;

pub const ERR_EXECUTION: &str = "ERR_EXECUTION";
pub const ERR_AUTHORIZATION: &str = "ERR_AUTHORIZATION";
pub const ERR_PRECONDITION: &str = "ERR_PRECONDITION";
pub const ERR_PARTIAL_DATA: &str = "ERR_PARTIAL_DATA";
pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";

/// What a batch loop should do after one of its items failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDisposition {
    /// The failure belongs to the item; log it and continue with the next one.
    SkipItem,
    /// The failure invalidates every remaining item (no device, no bridge, ...).
    AbortBatch,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    /// The bridge could not be spawned or exited non-zero.
    pub fn execution(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_EXECUTION, message, trace_id)
    }

    /// The device is attached but debugging has not been allowed on it yet.
    pub fn authorization(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_AUTHORIZATION, message, trace_id)
    }

    pub fn precondition(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PRECONDITION, message, trace_id)
    }

    /// One of several required queries failed and the combined result was dropped.
    pub fn partial_data(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PARTIAL_DATA, message, trace_id)
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }

    pub fn batch_disposition(&self) -> BatchDisposition {
        match self.code.as_str() {
            ERR_EXECUTION | ERR_VALIDATION => BatchDisposition::SkipItem,
            _ => BatchDisposition::AbortBatch,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
