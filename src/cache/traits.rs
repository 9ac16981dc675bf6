//! Shared get/set/serialize surface for entity-shaped records.

use serde_json::Value;

use crate::entity::{Attributes, CacheKey, EntityId, EntityKind};

/// Trait for records that live in the identity map or in a collection.
///
/// One tagged record type implements this; the kind is data, not a type.
pub trait Model {
  fn kind(&self) -> EntityKind;

  fn id(&self) -> Option<&EntityId>;

  /// The attribute bag, without the identifier.
  fn attributes(&self) -> &Attributes;

  /// Shallow merge of `attrs` into the bag.
  fn set(&mut self, attrs: &Attributes);

  /// Plain-data form: the bag plus `id` when assigned.
  fn to_json(&self) -> Attributes;

  fn get(&self, attr: &str) -> Option<&Value> {
    self.attributes().get(attr)
  }

  /// Identity-map key, once the record has an identifier.
  fn cache_key(&self) -> Option<CacheKey> {
    self.id().map(|id| CacheKey::new(self.kind(), id))
  }
}
