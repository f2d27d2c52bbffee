use log::warn;
use serde_json::Value;
use thiserror::Error;

pub type RecordsResult<T> = Result<T, RecordsError>;

/// Failure kinds surfaced by the recording engine.
///
/// Validation and conflict failures are always raised before the first write
/// of a batch. Internal failures roll the batch transaction back.
#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Option<Value>,
    },
    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<Value>,
    },
    #[error("{message}")]
    NotFound {
        message: String,
        details: Option<Value>,
    },
    #[error("{code}: {message}")]
    Internal { code: &'static str, message: String },
}

impl RecordsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_code(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            code,
            message: message.into(),
        }
    }

    /// Adapter for `map_err` on storage calls: `.map_err(RecordsError::db("db_query_failed"))`.
    ///
    /// UNIQUE constraint failures become `Conflict`, since they only fire when
    /// a concurrent batch won the race for the same key. The storage text is
    /// logged, never returned.
    pub fn db(code: &'static str) -> impl FnOnce(rusqlite::Error) -> RecordsError {
        move |e| match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                warn!(
                    "event=storage_conflict module=db status=conflict code={} error={}",
                    code, e
                );
                RecordsError::conflict("record already exists for this key")
            }
            _ => RecordsError::internal(code, e.to_string()),
        }
    }

    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::Validation { details, .. }
            | Self::Conflict { details, .. }
            | Self::NotFound { details, .. } => *details = Some(value),
            Self::Internal { .. } => {}
        }
        self
    }

    /// HTTP-equivalent status mirrored into the response envelope.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::Conflict { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Internal { .. } => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } => code,
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::Internal { code, .. } => code,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Validation { details, .. }
            | Self::Conflict { details, .. }
            | Self::NotFound { details, .. } => details.as_ref(),
            Self::Internal { .. } => None,
        }
    }

    /// Message safe to hand back to a caller. Internal failures are reduced to
    /// a generic line; the storage detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => "internal storage error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl From<serde_json::Error> for RecordsError {
    fn from(value: serde_json::Error) -> Self {
        RecordsError::validation(format!("malformed params: {value}"))
    }
}
