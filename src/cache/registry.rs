//! Model registry: the identity map plus the verbs that keep it in sync.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, warn};

use super::traits::Model;
use crate::entity::wire::{normalize_saved, unwrap_record};
use crate::entity::{merge_attributes, Attributes, CacheKey, Entity, EntityId, EntityKind};
use crate::error::{SyncError, SyncResult};
use crate::sync::{RenderMode, SyncOptions, SyncResponse, SyncTarget, Transport, Verb};

// ============================================================================
// Handle
// ============================================================================

/// Shared reference to a cached entity.
///
/// Clones point at the same entity; a mutation through one handle is visible
/// through every other handle for the same key.
#[derive(Clone)]
pub struct EntityHandle(Arc<RwLock<Entity>>);

impl EntityHandle {
  fn new(entity: Entity) -> Self {
    Self(Arc::new(RwLock::new(entity)))
  }

  /// Whether both handles refer to the same live entity.
  pub fn ptr_eq(a: &Self, b: &Self) -> bool {
    Arc::ptr_eq(&a.0, &b.0)
  }

  pub fn read(&self) -> RwLockReadGuard<'_, Entity> {
    self.0.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Entity> {
    self.0.write().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn kind(&self) -> EntityKind {
    self.read().kind()
  }

  pub fn id(&self) -> Option<EntityId> {
    self.read().id().cloned()
  }

  pub fn get(&self, attr: &str) -> Option<Value> {
    self.read().get(attr).cloned()
  }

  /// Merge attributes into the live entity.
  pub fn set(&self, attrs: &Attributes) {
    self.write().set(attrs);
  }

  /// Point-in-time copy of the entity.
  pub fn snapshot(&self) -> Entity {
    self.read().clone()
  }

  pub fn to_json(&self) -> Attributes {
    self.read().to_json()
  }

  fn mark_synced(&self) {
    self.write().mark_synced();
  }
}

impl fmt::Debug for EntityHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("EntityHandle").field(&*self.read()).finish()
  }
}

// ============================================================================
// Registry
// ============================================================================

/// Session-scoped identity map of entities keyed by `"{kind}:{id}"`.
pub struct ModelRegistry {
  entries: RwLock<HashMap<CacheKey, EntityHandle>>,
  transport: Arc<dyn Transport>,
}

impl ModelRegistry {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      transport,
    }
  }

  pub fn transport(&self) -> &Arc<dyn Transport> {
    &self.transport
  }

  pub fn mode(&self) -> RenderMode {
    self.transport.mode()
  }

  fn entries(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, EntityHandle>> {
    self.entries.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, EntityHandle>> {
    self.entries.write().unwrap_or_else(PoisonError::into_inner)
  }

  fn lookup(&self, key: &CacheKey) -> Option<EntityHandle> {
    self.entries().get(key).cloned()
  }

  /// Canonical entity for `(kind, id)`, created from the kind's defaults if
  /// absent. `attrs` is shallow-merged either way. No I/O.
  pub fn get_or_create(
    &self,
    kind: EntityKind,
    id: impl Into<EntityId>,
    attrs: Option<&Attributes>,
  ) -> EntityHandle {
    let id = id.into();
    let key = CacheKey::new(kind, &id);

    let handle = {
      let mut entries = self.entries_mut();
      entries
        .entry(key.clone())
        .or_insert_with(|| {
          debug!(%key, "cache: new entity");
          EntityHandle::new(Entity::new(kind, Some(id)))
        })
        .clone()
    };

    if let Some(attrs) = attrs {
      handle.set(attrs);
    }
    handle
  }

  /// Read `(kind, id)` through the transport and merge the answer into the
  /// canonical entity. A failed read leaves the cache untouched.
  pub async fn fetch(&self, kind: EntityKind, id: impl Into<EntityId>) -> SyncResult<EntityHandle> {
    self.fetch_with(kind, id, SyncOptions::new()).await
  }

  pub async fn fetch_with(
    &self,
    kind: EntityKind,
    id: impl Into<EntityId>,
    options: SyncOptions,
  ) -> SyncResult<EntityHandle> {
    let id = id.into();
    let target = SyncTarget::entity(kind, Some(id.clone()), Attributes::new());

    let response = self
      .transport
      .sync(Verb::Read, &target, options)
      .await
      .inspect_err(|e| warn!(entity = %target.describe(), error = %e, "cache: fetch failed"))?;

    // Strip `success` acknowledgements and record wrappers before merging.
    let body = match response {
      SyncResponse::Json(value @ Value::Object(_)) => {
        unwrap_record(value).ok_or_else(|| SyncError::NotFound(target.describe()))?
      }
      SyncResponse::Json(Value::Null) | SyncResponse::NoContent => {
        return Err(SyncError::NotFound(target.describe()))
      }
      SyncResponse::Json(_) => {
        return Err(SyncError::Decode(format!(
          "expected a record for {}",
          target.describe()
        )))
      }
    };

    let handle = self.get_or_create(kind, id, Some(&body));
    handle.mark_synced();
    debug!(entity = %target.describe(), "cache: fetched");
    Ok(handle)
  }

  /// Resolve an entity by slug through the kind's `by-slug` lookup.
  ///
  /// A record carrying an id is merged into the identity map; one without is
  /// returned detached.
  pub async fn fetch_by_slug(&self, kind: EntityKind, slug: &str) -> SyncResult<EntityHandle> {
    let target = SyncTarget::collection(kind);
    let options = SyncOptions::new().url(format!("{}/by-slug/{}", kind.base_path(), slug));

    let response = self
      .transport
      .sync(Verb::Read, &target, options)
      .await
      .inspect_err(|e| warn!(%kind, slug, error = %e, "cache: slug lookup failed"))?;

    let record = unwrap_record(response.into_value())
      .ok_or_else(|| SyncError::NotFound(format!("{} {}", kind, slug)))?;

    let handle = match kind.identifier_from(&record) {
      Some(id) => self.get_or_create(kind, id, Some(&record)),
      None => EntityHandle::new(Entity::from_attributes(kind, record)),
    };
    handle.mark_synced();
    Ok(handle)
  }

  /// Persist `attrs`: an update when they carry an id, a create otherwise.
  ///
  /// The cache is only touched once the transport has accepted the write.
  pub async fn save(&self, kind: EntityKind, attrs: Attributes) -> SyncResult<EntityHandle> {
    self.save_with(kind, attrs, SyncOptions::new()).await
  }

  pub async fn save_with(
    &self,
    kind: EntityKind,
    attrs: Attributes,
    options: SyncOptions,
  ) -> SyncResult<EntityHandle> {
    match kind.identifier_from(&attrs) {
      Some(id) => self.update(kind, id, attrs, options).await,
      None => self.create(kind, attrs, options).await,
    }
  }

  async fn update(
    &self,
    kind: EntityKind,
    id: EntityId,
    attrs: Attributes,
    options: SyncOptions,
  ) -> SyncResult<EntityHandle> {
    let key = CacheKey::new(kind, &id);

    // Build the payload from a copy so a rejected write leaves the entity as it was.
    let mut draft = match self.lookup(&key) {
      Some(existing) => existing.snapshot(),
      None => Entity::new(kind, Some(id.clone())),
    };
    draft.set(&attrs);
    let target = SyncTarget::entity(kind, Some(id.clone()), draft.to_json());

    let response = self
      .transport
      .sync(Verb::Update, &target, options)
      .await
      .inspect_err(|e| warn!(%key, error = %e, "cache: update failed"))?;

    let handle = self.get_or_create(kind, id, Some(&attrs));
    if let Some(body) = response.into_attributes() {
      handle.set(&normalize_saved(body));
    }
    handle.mark_synced();
    debug!(%key, "cache: updated");
    Ok(handle)
  }

  async fn create(
    &self,
    kind: EntityKind,
    attrs: Attributes,
    options: SyncOptions,
  ) -> SyncResult<EntityHandle> {
    let mut entity = Entity::new(kind, None);
    entity.set(&attrs);
    let target = SyncTarget::entity(kind, None, entity.to_json());

    let response = self
      .transport
      .sync(Verb::Create, &target, options)
      .await
      .inspect_err(|e| warn!(%kind, error = %e, "cache: create failed"))?;

    let body = response
      .into_attributes()
      .ok_or(SyncError::MissingIdentifier)?;
    let id = kind
      .identifier_from(&body)
      .ok_or(SyncError::MissingIdentifier)?;

    let mut merged = entity.to_json();
    merge_attributes(&mut merged, &normalize_saved(body));

    let key = CacheKey::new(kind, &id);
    let handle = self.get_or_create(kind, id, Some(&merged));
    handle.mark_synced();
    debug!(%key, "cache: created");
    Ok(handle)
  }

  /// Delete `(kind, id)` remotely, then drop the entry whether or not it was
  /// cached. A failed delete leaves the cache untouched.
  pub async fn delete(&self, kind: EntityKind, id: impl Into<EntityId>) -> SyncResult<bool> {
    let id = id.into();
    let key = CacheKey::new(kind, &id);

    let body = match self.lookup(&key) {
      Some(existing) => existing.to_json(),
      None => {
        let mut body = Attributes::new();
        body.insert("id".into(), id.to_value());
        body
      }
    };
    let target = SyncTarget::entity(kind, Some(id), body);

    self
      .transport
      .sync(Verb::Delete, &target, SyncOptions::new())
      .await
      .inspect_err(|e| warn!(%key, error = %e, "cache: delete failed"))?;

    self.entries_mut().remove(&key);
    debug!(%key, "cache: deleted");
    Ok(true)
  }

  /// Drop every entry, or only those of `kind`. No I/O.
  pub fn clear(&self, kind: Option<EntityKind>) {
    let mut entries = self.entries_mut();
    match kind {
      Some(kind) => entries.retain(|key, _| !key.has_kind(kind)),
      None => entries.clear(),
    }
  }

  /// Snapshots of the cached entities of `kind`, ordered by key. Never fetches.
  pub fn list_by_type(&self, kind: EntityKind) -> Vec<Entity> {
    let entries = self.entries();
    let mut matching: Vec<(&CacheKey, &EntityHandle)> =
      entries.iter().filter(|(key, _)| key.has_kind(kind)).collect();
    matching.sort_by(|a, b| a.0.cmp(b.0));
    matching.into_iter().map(|(_, h)| h.snapshot()).collect()
  }

  pub fn has_entity(&self, kind: EntityKind, id: impl Into<EntityId>) -> bool {
    self.entries().contains_key(&CacheKey::new(kind, &id.into()))
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }
}
