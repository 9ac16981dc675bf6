//! Serde shapes of backend responses.
//!
//! These are kept apart from the entity model so decoding stays lenient
//! (the backend proxies several upstream formats) while the model stays small.

use serde::Deserialize;
use serde_json::Value;

use super::Attributes;
use crate::error::{SyncError, SyncResult};

// ============================================================================
// List endpoints
// ============================================================================

/// Paged list payload: `{ items, total_items, total_pages, current_page }`.
#[derive(Debug, Default, Deserialize)]
pub struct PageEnvelope {
  #[serde(default, alias = "tributes", alias = "data")]
  pub items: Vec<Attributes>,
  #[serde(default)]
  pub total_items: Option<u64>,
  #[serde(default)]
  pub total_pages: Option<u64>,
  #[serde(default)]
  pub current_page: Option<u64>,
}

impl PageEnvelope {
  /// Decode either a bare array of records or an envelope object.
  pub fn decode(value: Value) -> SyncResult<Self> {
    match value {
      Value::Array(items) => {
        let items = items
          .into_iter()
          .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(SyncError::Decode(format!(
              "expected record object in list, got {}",
              kind_of(&other)
            ))),
          })
          .collect::<SyncResult<Vec<_>>>()?;
        Ok(PageEnvelope {
          items,
          ..Default::default()
        })
      }
      Value::Object(_) => Ok(serde_json::from_value(value)?),
      Value::Null => Ok(PageEnvelope::default()),
      other => Err(SyncError::Decode(format!(
        "expected list payload, got {}",
        kind_of(&other)
      ))),
    }
  }
}

// ============================================================================
// Single-record endpoints
// ============================================================================

/// Extract the record from a single-entity answer.
///
/// Lookup endpoints wrap the record (`{ "tribute": {...} }` or
/// `{ "data": {...} }`); plain endpoints answer with the record itself.
/// Returns `None` when the answer holds no record.
pub fn unwrap_record(value: Value) -> Option<Attributes> {
  let Value::Object(mut map) = value else {
    return None;
  };

  for wrapper in ["tribute", "data"] {
    if let Some(inner) = map.remove(wrapper) {
      return match inner {
        Value::Object(record) if !record.is_empty() => Some(record),
        _ => None,
      };
    }
  }

  map.remove("success");
  if map.is_empty() {
    None
  } else {
    Some(map)
  }
}

/// Strip write-acknowledgement bookkeeping from a create/update answer so
/// only record attributes are merged into the entity.
///
/// `slugified_name` is adopted as `slug`; `tribute_id` and `success` are dropped
/// (the identifier is read separately via `EntityKind::identifier_from`).
pub fn normalize_saved(mut body: Attributes) -> Attributes {
  body.remove("success");
  body.remove("tribute_id");
  if let Some(slug) = body.remove("slugified_name") {
    body.entry("slug").or_insert(slug);
  }
  body
}

/// Error message from a failed response body, if it carries one.
pub fn error_message(body: &[u8]) -> Option<String> {
  #[derive(Deserialize)]
  struct ErrorBody {
    message: Option<String>,
  }

  if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
    if let Some(message) = parsed.message.filter(|m| !m.is_empty()) {
      return Some(message);
    }
  }

  let text = String::from_utf8_lossy(body).trim().to_string();
  if text.is_empty() {
    None
  } else {
    Some(text)
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
