//! Entity model: type tags, identifiers, attribute bags and the
//! fixed per-kind configuration (defaults, addresses, placeholders).

pub mod wire;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::cache::Model;

/// Open, JSON-shaped attribute bag.
pub type Attributes = Map<String, Value>;

/// Shallow merge: every top-level key of `source` replaces the key in `target`.
pub fn merge_attributes(target: &mut Attributes, source: &Attributes) {
  for (k, v) in source {
    target.insert(k.clone(), v.clone());
  }
}

/// Build an attribute bag from a `json!` object literal. Non-objects yield an empty bag.
pub fn attrs(value: Value) -> Attributes {
  match value {
    Value::Object(map) => map,
    _ => Attributes::new(),
  }
}

// ============================================================================
// Kind
// ============================================================================

/// The fixed set of remotely stored entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Post,
  Page,
  Tribute,
  User,
}

impl EntityKind {
  pub const ALL: [EntityKind; 4] = [
    EntityKind::Post,
    EntityKind::Page,
    EntityKind::Tribute,
    EntityKind::User,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      EntityKind::Post => "post",
      EntityKind::Page => "page",
      EntityKind::Tribute => "tribute",
      EntityKind::User => "user",
    }
  }

  /// Human label used in placeholder titles and error messages.
  pub fn label(self) -> &'static str {
    match self {
      EntityKind::Post => "Post",
      EntityKind::Page => "Page",
      EntityKind::Tribute => "Tribute",
      EntityKind::User => "User",
    }
  }

  /// Canonical collection path, joined onto the backend origin.
  pub fn base_path(self) -> &'static str {
    match self {
      EntityKind::Post => "/api/wp/posts",
      EntityKind::Page => "/api/wp/pages",
      EntityKind::Tribute => "/api/tributes",
      EntityKind::User => "/api/wp/users",
    }
  }

  /// Attributes every freshly constructed entity of this kind starts with.
  pub fn defaults(self) -> Attributes {
    let value = match self {
      EntityKind::Post => json!({
        "title": { "rendered": "" },
        "content": { "rendered": "" },
        "excerpt": { "rendered": "" },
        "status": "draft",
      }),
      EntityKind::Page => json!({
        "title": { "rendered": "" },
        "content": { "rendered": "" },
        "status": "draft",
      }),
      EntityKind::Tribute => json!({
        "user_id": 0,
        "loved_one_name": "",
        "phone_number": "",
        "status": "draft",
        "custom_html": "",
        "number_of_streams": 0,
      }),
      EntityKind::User => json!({
        "username": "",
        "name": "",
        "email": "",
        "roles": [],
        "capabilities": {},
      }),
    };
    attrs(value)
  }

  /// Deterministic stand-in body used when rendering without network access.
  pub fn placeholder(self, id: &EntityId) -> Attributes {
    let value = match self {
      EntityKind::Post | EntityKind::Page => json!({
        "title": { "rendered": format!("{} {}", self.label(), id) },
        "content": { "rendered": "" },
      }),
      EntityKind::Tribute => json!({ "loved_one_name": format!("Tribute {}", id) }),
      EntityKind::User => json!({
        "username": format!("user{}", id),
        "name": format!("User {}", id),
      }),
    };
    attrs(value)
  }

  /// Pull the identifier out of a create/read response body.
  ///
  /// Tribute creation answers with `tribute_id` rather than `id`. A zero id
  /// counts as unassigned.
  pub fn identifier_from(self, body: &Attributes) -> Option<EntityId> {
    let lookup = |field: &str| {
      body
        .get(field)
        .and_then(EntityId::from_value)
        .filter(|id| !id.is_unassigned())
    };
    match (lookup("id"), self) {
      (Some(id), _) => Some(id),
      (None, EntityKind::Tribute) => lookup("tribute_id"),
      (None, _) => None,
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EntityKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().trim_end_matches('s') {
      "post" => Ok(EntityKind::Post),
      "page" => Ok(EntityKind::Page),
      "tribute" => Ok(EntityKind::Tribute),
      "user" => Ok(EntityKind::User),
      other => Err(format!("unknown entity kind: {}", other)),
    }
  }
}

// ============================================================================
// Identifier
// ============================================================================

/// Entity identifier; numeric for backend records, textual for anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
  Num(u64),
  Str(String),
}

impl EntityId {
  /// Parse a textual id, preferring the numeric form so `"12"` and `12`
  /// address the same cache entry.
  pub fn parse(s: &str) -> Self {
    let s = s.trim();
    s.parse::<u64>()
      .map(EntityId::Num)
      .unwrap_or_else(|_| EntityId::Str(s.to_string()))
  }

  pub fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_u64().map(EntityId::Num),
      Value::String(s) if !s.trim().is_empty() => Some(EntityId::parse(s)),
      _ => None,
    }
  }

  pub fn is_unassigned(&self) -> bool {
    matches!(self, EntityId::Num(0))
  }

  pub fn to_value(&self) -> Value {
    match self {
      EntityId::Num(n) => Value::from(*n),
      EntityId::Str(s) => Value::from(s.clone()),
    }
  }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EntityId::Num(n) => write!(f, "{}", n),
      EntityId::Str(s) => f.write_str(s),
    }
  }
}

impl From<u64> for EntityId {
  fn from(n: u64) -> Self {
    EntityId::Num(n)
  }
}

impl From<&str> for EntityId {
  fn from(s: &str) -> Self {
    EntityId::parse(s)
  }
}

impl From<String> for EntityId {
  fn from(s: String) -> Self {
    EntityId::parse(&s)
  }
}

impl FromStr for EntityId {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(EntityId::parse(s))
  }
}

/// Identity-map key, rendered as `"{kind}:{id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn new(kind: EntityKind, id: &EntityId) -> Self {
    CacheKey(format!("{}:{}", kind, id))
  }

  pub fn has_kind(&self, kind: EntityKind) -> bool {
    self
      .0
      .strip_prefix(kind.as_str())
      .is_some_and(|rest| rest.starts_with(':'))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ============================================================================
// Entity
// ============================================================================

/// A single remotely backed record: type tag, identifier and attribute bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
  kind: EntityKind,
  id: Option<EntityId>,
  attributes: Attributes,
  /// When the body was last confirmed by a transport answer
  synced_at: Option<DateTime<Utc>>,
}

impl Entity {
  /// New entity seeded with the kind's defaults.
  pub fn new(kind: EntityKind, id: Option<EntityId>) -> Self {
    Self {
      kind,
      id,
      attributes: kind.defaults(),
      synced_at: None,
    }
  }

  /// Wrap a plain attribute bag as-is (no defaults), taking the id from the bag.
  pub fn from_attributes(kind: EntityKind, mut attributes: Attributes) -> Self {
    let id = kind.identifier_from(&attributes);
    attributes.remove("id");
    Self {
      kind,
      id,
      attributes,
      synced_at: None,
    }
  }

  pub fn assign_id(&mut self, id: EntityId) {
    self.id = Some(id);
  }

  pub fn synced_at(&self) -> Option<DateTime<Utc>> {
    self.synced_at
  }

  pub(crate) fn mark_synced(&mut self) {
    self.synced_at = Some(Utc::now());
  }
}

impl Model for Entity {
  fn kind(&self) -> EntityKind {
    self.kind
  }

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn attributes(&self) -> &Attributes {
    &self.attributes
  }

  fn set(&mut self, attrs: &Attributes) {
    for (k, v) in attrs {
      // The identifier is owned by the key, not the bag.
      if k == "id" {
        continue;
      }
      self.attributes.insert(k.clone(), v.clone());
    }
  }

  fn to_json(&self) -> Attributes {
    let mut out = self.attributes.clone();
    if let Some(id) = &self.id {
      out.insert("id".into(), id.to_value());
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_parses_singular_and_plural() {
    assert_eq!("tributes".parse::<EntityKind>(), Ok(EntityKind::Tribute));
    assert_eq!("Post".parse::<EntityKind>(), Ok(EntityKind::Post));
    assert!("comment".parse::<EntityKind>().is_err());
  }

  #[test]
  fn numeric_strings_become_numeric_ids() {
    assert_eq!(EntityId::parse("12"), EntityId::Num(12));
    assert_eq!(EntityId::parse("alpha"), EntityId::Str("alpha".into()));
    assert_eq!(
      CacheKey::new(EntityKind::Post, &"12".into()),
      CacheKey::new(EntityKind::Post, &12.into())
    );
  }

  #[test]
  fn cache_key_kind_prefix_is_exact() {
    let key = CacheKey::new(EntityKind::Post, &EntityId::Num(1));
    assert_eq!(key.as_str(), "post:1");
    assert!(key.has_kind(EntityKind::Post));
    assert!(!key.has_kind(EntityKind::Page));
  }

  #[test]
  fn tribute_identifier_falls_back_to_tribute_id() {
    let body = attrs(json!({ "success": true, "tribute_id": 44 }));
    assert_eq!(
      EntityKind::Tribute.identifier_from(&body),
      Some(EntityId::Num(44))
    );
    assert_eq!(EntityKind::Post.identifier_from(&body), None);
  }

  #[test]
  fn zero_ids_are_unassigned() {
    assert_eq!(EntityKind::Post.identifier_from(&attrs(json!({ "id": 0 }))), None);
    assert_eq!(EntityKind::Post.identifier_from(&attrs(json!({ "id": "0" }))), None);
    assert_eq!(
      EntityKind::Tribute.identifier_from(&attrs(json!({ "id": 0, "tribute_id": 7 }))),
      Some(EntityId::Num(7))
    );
  }

  #[test]
  fn placeholders_are_derived_from_the_id() {
    let body = EntityKind::Page.placeholder(&EntityId::Num(3));
    assert_eq!(body["title"]["rendered"], "Page 3");
    let user = EntityKind::User.placeholder(&EntityId::Num(9));
    assert_eq!(user["username"], "user9");
    assert_eq!(user["name"], "User 9");
  }

  #[test]
  fn set_merges_without_touching_the_id() {
    let mut entity = Entity::new(EntityKind::Tribute, Some(EntityId::Num(1)));
    entity.set(&attrs(json!({ "id": 99, "loved_one_name": "Ada" })));
    assert_eq!(entity.id(), Some(&EntityId::Num(1)));
    assert_eq!(entity.get("loved_one_name"), Some(&json!("Ada")));
    assert_eq!(entity.get("status"), Some(&json!("draft")));
    assert_eq!(entity.to_json()["id"], json!(1));
  }
}
