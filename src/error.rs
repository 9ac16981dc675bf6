//! Error types shared by the cache, transport and workflow layers.

use std::collections::BTreeMap;

use thiserror::Error;

/// Field name -> first failing rule message.
pub type FieldErrors = BTreeMap<String, String>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the entity cache and its transports.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
  /// Attribute bag rejected by the validator; never reaches a transport.
  #[error("Validation failed")]
  Validation(FieldErrors),

  /// Non-success HTTP answer, or a connection-level failure when `status` is `None`.
  #[error("{message}")]
  Transport { status: Option<u16>, message: String },

  /// A read resolved to no matching record.
  #[error("{0} not found")]
  NotFound(String),

  #[error("no address resolvable for this request")]
  MissingAddress,

  #[error("response did not carry an identifier for the created entity")]
  MissingIdentifier,

  #[error("failed to decode response: {0}")]
  Decode(String),

  #[error("invalid URL: {0}")]
  InvalidUrl(String),
}

impl SyncError {
  /// Non-success HTTP answer.
  pub fn transport(status: u16, message: impl Into<String>) -> Self {
    SyncError::Transport {
      status: Some(status),
      message: message.into(),
    }
  }

  /// Connection-level failure: no HTTP answer was received.
  pub fn unreachable(message: impl Into<String>) -> Self {
    SyncError::Transport {
      status: None,
      message: message.into(),
    }
  }

  /// HTTP status carried by the failure, if any.
  pub fn status(&self) -> Option<u16> {
    match self {
      SyncError::Transport { status, .. } => *status,
      SyncError::NotFound(_) => Some(404),
      _ => None,
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, SyncError::NotFound(_))
  }

  /// The display string a workflow keeps for its error banner.
  pub fn message(&self) -> String {
    self.to_string()
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(e: reqwest::Error) -> Self {
    SyncError::Transport {
      status: e.status().map(|s| s.as_u16()),
      message: e.to_string(),
    }
  }
}

impl From<url::ParseError> for SyncError {
  fn from(e: url::ParseError) -> Self {
    SyncError::InvalidUrl(e.to_string())
  }
}

impl From<serde_json::Error> for SyncError {
  fn from(e: serde_json::Error) -> Self {
    SyncError::Decode(e.to_string())
  }
}
