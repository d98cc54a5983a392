//! Errors raised by the external sinks.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("unexpected status {0}")]
  Status(reqwest::StatusCode),

  /// Moodle answered with an exception payload.
  #[error("{exception}: {message}")]
  Moodle { exception: String, message: String },

  #[error("unexpected response: {0}")]
  Response(String),

  /// Account creation needs every one of `REQUIRED_USER_FIELDS`.
  #[error("required field missing: {0}")]
  MissingField(&'static str),

  #[error("group not found in course: {0}")]
  GroupNotFound(String),
}

pub type Result<T, E = SinkError> = std::result::Result<T, E>;
