use std::fmt;
use serde::{Deserialize, Serialize};

/// Error taxonomy for the orchestrator core.
#[derive(Debug)]
pub enum Error {
    /// Payload/URI/enum shape rejected by the Payload Registry or a handler.
    Validation(String),

    /// Missing, expired, or invalid bearer token.
    Unauthorized(String),

    /// Caller is authenticated but not permitted to act on this resource.
    Forbidden(String),

    /// Entity does not exist.
    NotFound(String),

    /// State-machine violation: assign non-pending, complete twice, cancel terminal.
    Conflict(String),

    /// Refresh token failed to decode, expired, or was revoked.
    InvalidRefresh(String),

    /// Relational store, container runtime, or blob store failure. Safe to
    /// retry idempotent calls against.
    Transient(String),

    /// Startup/config failure.
    Config(String),

    /// JSON (de)serialization failure outside the validation path.
    Serialization(serde_json::Error),

    /// Anything else.
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "validation error: {}", msg),
            Error::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            Error::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::Conflict(msg) => write!(f, "conflict: {}", msg),
            Error::InvalidRefresh(msg) => write!(f, "invalid refresh token: {}", msg),
            Error::Transient(msg) => write!(f, "transient dependency error: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Serialization(e) => write!(f, "serialization error: {}", e),
            Error::Other(msg) => write!(f, "error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Transient(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Transient(error.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        Error::InvalidRefresh(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Validation(format!("invalid uuid: {}", error))
    }
}

impl Error {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Error::Unauthorized(msg.into())
    }

    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        Error::Forbidden(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn invalid_refresh<T: Into<String>>(msg: T) -> Self {
        Error::InvalidRefresh(msg.into())
    }

    pub fn transient<T: Into<String>>(msg: T) -> Self {
        Error::Transient(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    pub fn other<T: Into<String>>(msg: T) -> Self {
        Error::Other(msg.into())
    }

    /// HTTP status code per the taxonomy table.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::InvalidRefresh(_) => 401,
            Error::Transient(_) => 500,
            Error::Config(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Unauthorized(_) => "unauth",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::InvalidRefresh(_) => "invalid_refresh",
            Error::Transient(_) => "transient_dependency",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Other(_) => "other",
        }
    }
}

/// User-visible `{status, message}` envelope. Stack traces never cross this
/// boundary; they stay in the tracing logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub status: u16,
    pub message: String,
}

impl From<&Error> for ErrorEnvelope {
    fn from(error: &Error) -> Self {
        ErrorEnvelope {
            status: error.status_code(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: Option<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
            code: None,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_error(self) -> Error {
        Error::Validation(
            serde_json::to_string(&self).unwrap_or_else(|_| "validation failed".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(Error::validation("x").status_code(), 400);
        assert_eq!(Error::unauthorized("x").status_code(), 401);
        assert_eq!(Error::forbidden("x").status_code(), 403);
        assert_eq!(Error::not_found("x").status_code(), 404);
        assert_eq!(Error::conflict("x").status_code(), 409);
        assert_eq!(Error::invalid_refresh("x").status_code(), 401);
        assert_eq!(Error::transient("x").status_code(), 500);
    }

    #[test]
    fn envelope_never_carries_variant_name() {
        let err = Error::not_found("job 123");
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.status, 404);
        assert!(envelope.message.contains("job 123"));
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), 404);
    }
}
