use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{RenderMode, SyncOptions, SyncResponse, SyncTarget, Transport, Verb};
use crate::entity::{Attributes, EntityId};
use crate::error::SyncResult;

/// What a server-rendered `read` of a single entity answers with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderPolicy {
  /// Deterministic per-kind body derived from the id (e.g. "Post 12")
  #[default]
  Synthesize,
  /// An empty body; the entity keeps its defaults
  Empty,
}

/// Transport for the server-rendering context. Never touches the network.
///
/// - `read` of an entity or of a `by-slug` lookup answers with a placeholder
///   body, of a collection with `[]`
/// - `create`/`update`/`patch` echo the payload; creates without an id get a
///   session-local sequential one
/// - `delete` answers no-content
#[derive(Debug)]
pub struct NullTransport {
  placeholders: PlaceholderPolicy,
  next_id: AtomicU64,
}

impl NullTransport {
  pub fn new(placeholders: PlaceholderPolicy) -> Self {
    Self {
      placeholders,
      next_id: AtomicU64::new(1),
    }
  }

  pub fn placeholders(&self) -> PlaceholderPolicy {
    self.placeholders
  }

  fn read(&self, target: &SyncTarget, options: &SyncOptions) -> Value {
    let (id, key) = match (target, slug_lookup(options)) {
      (SyncTarget::Entity { id: Some(id), .. }, _) => (id.clone(), "id"),
      (_, Some(slug)) => (EntityId::Str(slug.to_string()), "slug"),
      _ => return Value::Array(Vec::new()),
    };

    let mut body = match self.placeholders {
      PlaceholderPolicy::Synthesize => target.kind().placeholder(&id),
      PlaceholderPolicy::Empty => Attributes::new(),
    };
    body.insert(key.into(), id.to_value());
    Value::Object(body)
  }

  fn echo(&self, verb: Verb, target: &SyncTarget, options: &SyncOptions) -> Value {
    let mut payload = options.payload_for(target);
    if verb == Verb::Create {
      if let Value::Object(map) = &mut payload {
        if !map.contains_key("id") {
          let id = self.next_id.fetch_add(1, Ordering::Relaxed);
          map.insert("id".into(), Value::from(id));
        }
      }
    }
    payload
  }
}

/// The slug of a `by-slug` address override, if that is what is being read.
fn slug_lookup(options: &SyncOptions) -> Option<&str> {
  let (_, slug) = options.url.as_deref()?.rsplit_once("/by-slug/")?;
  Some(slug.trim_end_matches('/')).filter(|slug| !slug.is_empty())
}

impl Default for NullTransport {
  fn default() -> Self {
    Self::new(PlaceholderPolicy::default())
  }
}

#[async_trait]
impl Transport for NullTransport {
  fn mode(&self) -> RenderMode {
    RenderMode::Server
  }

  async fn sync(
    &self,
    verb: Verb,
    target: &SyncTarget,
    options: SyncOptions,
  ) -> SyncResult<SyncResponse> {
    debug!(%verb, entity = %target.describe(), "server render: answering locally");
    let response = match verb {
      Verb::Read => SyncResponse::Json(self.read(target, &options)),
      Verb::Create | Verb::Update | Verb::Patch => {
        SyncResponse::Json(self.echo(verb, target, &options))
      }
      Verb::Delete => SyncResponse::NoContent,
    };
    Ok(options.receive(response))
  }
}
