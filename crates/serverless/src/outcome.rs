use serde::Serialize;

/// Tagged result reported to a serverless host instead of raising.
///
/// Serializes as `{"status": "success", "data": ...}` or
/// `{"status": "error", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome<T> {
    Success { data: T },
    Error { error: String },
}

impl<T> Outcome<T> {
    pub fn success(data: T) -> Self {
        Outcome::Success { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Outcome::Error { error } => Some(error),
            Outcome::Success { .. } => None,
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Outcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Outcome::success(data),
            Err(e) => Outcome::error(e.to_string()),
        }
    }
}
