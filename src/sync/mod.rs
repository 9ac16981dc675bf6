//! Verb-to-wire translation.
//!
//! The entity cache speaks in abstract verbs against a [`SyncTarget`]; a
//! [`Transport`] decides what that means. [`NetworkTransport`] maps verbs to
//! HTTP calls, [`NullTransport`] answers locally for server rendering. The
//! transport is chosen once per session and injected, so nothing above this
//! module branches on the execution context.

mod network;
mod null;

pub use network::{NetworkTransport, NetworkTransportBuilder};
pub use null::{NullTransport, PlaceholderPolicy};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::entity::{Attributes, EntityId, EntityKind};
use crate::error::SyncResult;

/// Abstract CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
  Create,
  Read,
  Update,
  Patch,
  Delete,
}

impl Verb {
  pub fn method(self) -> Method {
    match self {
      Verb::Create => Method::POST,
      Verb::Read => Method::GET,
      Verb::Update => Method::PUT,
      Verb::Patch => Method::PATCH,
      Verb::Delete => Method::DELETE,
    }
  }

  /// Everything except `read` carries a JSON body.
  pub fn sends_body(self) -> bool {
    !matches!(self, Verb::Read)
  }
}

impl fmt::Display for Verb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Verb::Create => "create",
      Verb::Read => "read",
      Verb::Update => "update",
      Verb::Patch => "patch",
      Verb::Delete => "delete",
    };
    f.write_str(name)
  }
}

/// Which execution context a transport serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
  /// Network-capable, interactive context
  #[default]
  Interactive,
  /// Server rendering; must never perform network I/O
  Server,
}

/// What a sync call operates on.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncTarget {
  /// A single entity. `id` is absent for creates.
  Entity {
    kind: EntityKind,
    id: Option<EntityId>,
    body: Attributes,
  },
  /// The collection of all entities of a kind.
  Collection { kind: EntityKind },
}

impl SyncTarget {
  pub fn entity(kind: EntityKind, id: Option<EntityId>, body: Attributes) -> Self {
    SyncTarget::Entity { kind, id, body }
  }

  pub fn collection(kind: EntityKind) -> Self {
    SyncTarget::Collection { kind }
  }

  pub fn kind(&self) -> EntityKind {
    match self {
      SyncTarget::Entity { kind, .. } | SyncTarget::Collection { kind } => *kind,
    }
  }

  /// Intrinsic address: the kind's base path, suffixed by the id for
  /// single-entity targets that have one.
  pub fn address(&self) -> String {
    match self {
      SyncTarget::Entity {
        kind, id: Some(id), ..
      } => format!("{}/{}", kind.base_path(), id),
      _ => self.kind().base_path().to_string(),
    }
  }

  /// Payload used when the call options carry no explicit data.
  pub fn body(&self) -> Option<&Attributes> {
    match self {
      SyncTarget::Entity { body, .. } => Some(body),
      SyncTarget::Collection { .. } => None,
    }
  }

  /// Short label for logs and not-found messages, e.g. `tribute 7`.
  pub fn describe(&self) -> String {
    match self {
      SyncTarget::Entity {
        kind, id: Some(id), ..
      } => format!("{} {}", kind, id),
      SyncTarget::Entity { kind, id: None, .. } => format!("new {}", kind),
      SyncTarget::Collection { kind } => format!("{} list", kind),
    }
  }
}

/// Request as it is about to leave; handed to the before-send hook.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
  pub verb: Verb,
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Value>,
}

pub type BeforeSend = Arc<dyn Fn(&mut OutgoingRequest) + Send + Sync>;
pub type AfterReceive = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Per-call options.
#[derive(Clone, Default)]
pub struct SyncOptions {
  /// Address override; relative paths are joined onto the backend origin.
  pub url: Option<String>,
  /// Payload override; defaults to the target's attribute bag.
  pub data: Option<Value>,
  pub query: Vec<(String, String)>,
  pub headers: Vec<(String, String)>,
  pub before_send: Option<BeforeSend>,
  pub after_receive: Option<AfterReceive>,
}

impl SyncOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }

  pub fn data(mut self, data: Value) -> Self {
    self.data = Some(data);
    self
  }

  pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.query.push((key.into(), value.to_string()));
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn before_send(mut self, hook: impl Fn(&mut OutgoingRequest) + Send + Sync + 'static) -> Self {
    self.before_send = Some(Arc::new(hook));
    self
  }

  pub fn after_receive(mut self, hook: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
    self.after_receive = Some(Arc::new(hook));
    self
  }

  /// Resolve the address for `target`, preferring the explicit override.
  pub fn address_for(&self, target: &SyncTarget) -> String {
    self.url.clone().unwrap_or_else(|| target.address())
  }

  /// Payload for a body-carrying verb.
  pub fn payload_for(&self, target: &SyncTarget) -> Value {
    match (&self.data, target.body()) {
      (Some(data), _) => data.clone(),
      (None, Some(body)) => Value::Object(body.clone()),
      (None, None) => Value::Null,
    }
  }

  pub(crate) fn receive(&self, response: SyncResponse) -> SyncResponse {
    match (response, &self.after_receive) {
      (SyncResponse::Json(value), Some(hook)) => SyncResponse::Json(hook(value)),
      (response, _) => response,
    }
  }
}

impl fmt::Debug for SyncOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SyncOptions")
      .field("url", &self.url)
      .field("data", &self.data)
      .field("query", &self.query)
      .field("headers", &self.headers)
      .field("before_send", &self.before_send.is_some())
      .field("after_receive", &self.after_receive.is_some())
      .finish()
  }
}

/// Decoded answer of a successful sync call.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncResponse {
  /// Success without a body (e.g. 204)
  NoContent,
  Json(Value),
}

impl SyncResponse {
  pub fn is_no_content(&self) -> bool {
    matches!(self, SyncResponse::NoContent)
  }

  pub fn into_value(self) -> Value {
    match self {
      SyncResponse::NoContent => Value::Null,
      SyncResponse::Json(value) => value,
    }
  }

  /// The body as an attribute bag, if it is a JSON object.
  pub fn into_attributes(self) -> Option<Attributes> {
    match self {
      SyncResponse::Json(Value::Object(map)) => Some(map),
      _ => None,
    }
  }
}

/// Sync strategy injected into the cache and collections.
#[async_trait]
pub trait Transport: Send + Sync {
  /// Execution context this transport serves.
  fn mode(&self) -> RenderMode;

  /// Perform `verb` against `target`.
  async fn sync(
    &self,
    verb: Verb,
    target: &SyncTarget,
    options: SyncOptions,
  ) -> SyncResult<SyncResponse>;
}
