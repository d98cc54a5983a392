//! Error types for `rollcall-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid status tag: {0:?}")]
  InvalidStatus(String),

  #[error("status {0:?} is not in the configured allow-list")]
  StatusNotAllowed(String),

  #[error("empty identity")]
  EmptyIdentity,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
