//! Context-aware list views.
//!
//! An [`EntityCollection`] exposes the same operations whether it is backed by
//! a live transport or by a snapshot handed in for server rendering. Which one
//! it is gets decided once, from the transport's [`RenderMode`], when the
//! collection is built.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::cache::Model;
use crate::entity::wire::PageEnvelope;
use crate::entity::{Attributes, Entity, EntityId, EntityKind};
use crate::error::SyncResult;
use crate::sync::{RenderMode, SyncOptions, SyncTarget, Transport, Verb};

pub const DEFAULT_PAGE_SIZE: u64 = 10;

// ============================================================================
// Pagination
// ============================================================================

/// Page metadata composed from a page request and the total item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
  pub page: u64,
  pub page_size: u64,
  pub total_items: u64,
  pub total_pages: u64,
}

impl Pagination {
  /// `total_pages = ceil(total_items / page_size)`; a zero page size yields no pages.
  pub fn compose(page: u64, page_size: u64, total_items: u64) -> Self {
    let total_pages = if page_size == 0 {
      0
    } else {
      total_items.div_ceil(page_size)
    };
    Self {
      page,
      page_size,
      total_items,
      total_pages,
    }
  }
}

/// Page request for a list endpoint: `page`, `per_page` and an optional `search` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
  pub page: u64,
  pub per_page: u64,
  pub search: Option<String>,
}

impl PageQuery {
  pub fn new(page: u64, per_page: u64) -> Self {
    Self {
      page: page.max(1),
      per_page,
      search: None,
    }
  }

  pub fn search(mut self, term: impl Into<String>) -> Self {
    let term = term.into();
    self.search = (!term.trim().is_empty()).then_some(term);
    self
  }

  /// Append the query parameters onto `options`.
  pub fn apply(&self, options: SyncOptions) -> SyncOptions {
    let options = match &self.search {
      Some(term) => options.query("search", term),
      None => options,
    };
    options
      .query("page", self.page)
      .query("per_page", self.per_page)
  }
}

impl Default for PageQuery {
  fn default() -> Self {
    Self::new(1, DEFAULT_PAGE_SIZE)
  }
}

// ============================================================================
// Collection
// ============================================================================

enum CollectionSource {
  /// Network-capable: `fetch` repopulates from the transport
  Live(Arc<dyn Transport>),
  /// Server rendering: the list only ever changes through local operations
  Snapshot,
}

/// Ordered list of entities of one kind.
pub struct EntityCollection {
  kind: EntityKind,
  items: Vec<Entity>,
  source: CollectionSource,
  /// Last total reported by the backend, or set alongside a snapshot
  total_items: Option<u64>,
  total_pages: Option<u64>,
}

impl EntityCollection {
  /// Build a collection seeded with `initial`. The transport's render mode
  /// decides whether `fetch` goes to the network or returns the snapshot.
  pub fn new(kind: EntityKind, initial: Vec<Attributes>, transport: Arc<dyn Transport>) -> Self {
    let source = match transport.mode() {
      RenderMode::Interactive => CollectionSource::Live(transport),
      RenderMode::Server => CollectionSource::Snapshot,
    };
    Self {
      kind,
      items: to_entities(kind, initial),
      source,
      total_items: None,
      total_pages: None,
    }
  }

  /// A frozen collection that never touches a transport.
  pub fn snapshot(kind: EntityKind, initial: Vec<Attributes>) -> Self {
    Self {
      kind,
      items: to_entities(kind, initial),
      source: CollectionSource::Snapshot,
      total_items: None,
      total_pages: None,
    }
  }

  /// Known total for paging a snapshot.
  pub fn with_total(mut self, total_items: u64) -> Self {
    self.total_items = Some(total_items);
    self
  }

  pub fn kind(&self) -> EntityKind {
    self.kind
  }

  pub fn is_live(&self) -> bool {
    matches!(self.source, CollectionSource::Live(_))
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Total reported by the last fetch (or given with the snapshot), else the list length.
  pub fn total_items(&self) -> u64 {
    self.total_items.unwrap_or(self.items.len() as u64)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
    self.items.iter()
  }

  pub fn filter<P>(&self, mut predicate: P) -> Vec<&Entity>
  where
    P: FnMut(&Entity) -> bool,
  {
    self.items.iter().filter(|e| predicate(*e)).collect()
  }

  pub fn map<T, F>(&self, f: F) -> Vec<T>
  where
    F: FnMut(&Entity) -> T,
  {
    self.items.iter().map(f).collect()
  }

  pub fn at(&self, index: usize) -> Option<&Entity> {
    self.items.get(index)
  }

  pub fn get(&self, id: &EntityId) -> Option<&Entity> {
    self.items.iter().find(|e| e.id() == Some(id))
  }

  /// Append a record. A record whose id is already present is merged in place.
  pub fn add(&mut self, attrs: Attributes) -> &Entity {
    let incoming = Entity::from_attributes(self.kind, attrs);
    let existing = incoming
      .id()
      .and_then(|id| self.items.iter().position(|e| e.id() == Some(id)));

    let index = match existing {
      Some(index) => {
        self.items[index].set(incoming.attributes());
        index
      }
      None => {
        self.items.push(incoming);
        self.items.len() - 1
      }
    };
    &self.items[index]
  }

  pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
    let index = self.items.iter().position(|e| e.id() == Some(id))?;
    Some(self.items.remove(index))
  }

  /// Replace the whole list.
  pub fn reset(&mut self, records: Vec<Attributes>) {
    self.items = to_entities(self.kind, records);
  }

  pub fn to_json(&self) -> Vec<Attributes> {
    self.items.iter().map(Model::to_json).collect()
  }

  /// Repopulate from the backend. On a snapshot this resolves immediately
  /// with the current list and performs no I/O.
  pub async fn fetch(&mut self, options: SyncOptions) -> SyncResult<&[Entity]> {
    let transport = match &self.source {
      CollectionSource::Live(transport) => Arc::clone(transport),
      CollectionSource::Snapshot => {
        debug!(kind = %self.kind, items = self.items.len(), "collection: snapshot fetch");
        return Ok(&self.items);
      }
    };

    let target = SyncTarget::collection(self.kind);
    let response = transport.sync(Verb::Read, &target, options).await?;
    let envelope = PageEnvelope::decode(response.into_value())?;

    debug!(
      kind = %self.kind,
      items = envelope.items.len(),
      total = ?envelope.total_items,
      "collection: fetched"
    );
    self.items = to_entities(self.kind, envelope.items);
    self.total_items = envelope.total_items;
    self.total_pages = envelope.total_pages;
    Ok(&self.items)
  }

  /// Fetch one page and describe it.
  ///
  /// A live page without an item count is assumed to follow full pages, so a
  /// non-empty page never lies beyond `total_pages`. A reported `total_pages`
  /// is kept when it is larger.
  pub async fn paginated(&mut self, query: &PageQuery) -> SyncResult<Pagination> {
    let options = query.apply(SyncOptions::new());
    self.fetch(options).await?;

    let total_items = match self.total_items {
      Some(total) => total,
      None if self.is_live() => {
        query.page.saturating_sub(1) * query.per_page + self.items.len() as u64
      }
      None => self.total_items(),
    };
    let mut pagination = Pagination::compose(query.page, query.per_page, total_items);
    if let (None, Some(pages)) = (self.total_items, self.total_pages) {
      pagination.total_pages = pagination.total_pages.max(pages);
    }
    Ok(pagination)
  }

  /// Fetch, then keep the records matching `predicate` as plain attribute bags.
  pub async fn filtered<P>(&mut self, options: SyncOptions, predicate: P) -> SyncResult<Vec<Attributes>>
  where
    P: FnMut(&Entity) -> bool,
  {
    self.fetch(options).await?;
    Ok(
      self
        .filter(predicate)
        .into_iter()
        .map(Model::to_json)
        .collect(),
    )
  }
}

impl<'a> IntoIterator for &'a EntityCollection {
  type Item = &'a Entity;
  type IntoIter = std::slice::Iter<'a, Entity>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

impl fmt::Debug for EntityCollection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EntityCollection")
      .field("kind", &self.kind)
      .field("live", &self.is_live())
      .field("items", &self.items)
      .field("total_items", &self.total_items)
      .finish()
  }
}

fn to_entities(kind: EntityKind, records: Vec<Attributes>) -> Vec<Entity> {
  records
    .into_iter()
    .map(|attrs| Entity::from_attributes(kind, attrs))
    .collect()
}
