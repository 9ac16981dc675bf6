//! Observable per-kind workflow over the model registry.
//!
//! A [`Workflow`] owns one "current entity" focus and one search-result
//! slice, and publishes a [`WorkflowState`] through a `watch` channel so views
//! can render loading, success and error uniformly. Terminal phases fall back
//! to idle after a delay unless another transition happens first.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cache::{EntityHandle, ModelRegistry};
use crate::collection::{EntityCollection, PageQuery, Pagination};
use crate::entity::{merge_attributes, Attributes, EntityId, EntityKind};
use crate::error::{FieldErrors, SyncError, SyncResult};
use crate::validation::Validator;

pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(3000);

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  #[default]
  Idle,
  Loading,
  Saving,
  Deleting,
  Success,
  Error,
}

impl Phase {
  /// Phases that schedule the fall-back to idle.
  pub fn is_terminal(self) -> bool {
    matches!(self, Phase::Success | Phase::Error)
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Idle => "idle",
      Phase::Loading => "loading",
      Phase::Saving => "saving",
      Phase::Deleting => "deleting",
      Phase::Success => "success",
      Phase::Error => "error",
    };
    f.write_str(name)
  }
}

/// A page of list or search results. Never absent; failures yield [`SearchResults::empty`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
  pub items: Vec<Attributes>,
  pub pagination: Pagination,
}

impl SearchResults {
  /// Renderable empty page: no items, page 1 of 1.
  pub fn empty(per_page: u64) -> Self {
    Self {
      items: Vec::new(),
      pagination: Pagination {
        page: 1,
        page_size: per_page,
        total_items: 0,
        total_pages: 1,
      },
    }
  }
}

/// Snapshot of a workflow, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowState {
  pub phase: Phase,
  /// Plain-data form of the entity in focus
  pub current: Attributes,
  pub search_results: SearchResults,
  pub error: Option<String>,
  pub validation_errors: Option<FieldErrors>,
}

impl WorkflowState {
  fn initial(kind: EntityKind) -> Self {
    Self {
      phase: Phase::Idle,
      current: kind.defaults(),
      search_results: SearchResults::empty(crate::collection::DEFAULT_PAGE_SIZE),
      error: None,
      validation_errors: None,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.phase == Phase::Loading
  }

  pub fn is_saving(&self) -> bool {
    self.phase == Phase::Saving
  }

  pub fn is_deleting(&self) -> bool {
    self.phase == Phase::Deleting
  }

  pub fn has_error(&self) -> bool {
    self.phase == Phase::Error
  }

  pub fn is_success(&self) -> bool {
    self.phase == Phase::Success
  }

  /// Identifier of the entity in focus, if it has one.
  pub fn current_id(&self) -> Option<EntityId> {
    self.current.get("id").and_then(EntityId::from_value)
  }
}

// ============================================================================
// Workflow
// ============================================================================

struct Shared {
  state: watch::Sender<WorkflowState>,
  /// Bumped on every transition; a pending reset only fires if it still matches.
  epoch: AtomicU64,
}

/// Loading/saving/deleting state machine for one entity kind.
#[derive(Clone)]
pub struct Workflow {
  kind: EntityKind,
  registry: Arc<ModelRegistry>,
  validator: Arc<dyn Validator>,
  reset_delay: Duration,
  shared: Arc<Shared>,
}

impl Workflow {
  pub fn new(kind: EntityKind, registry: Arc<ModelRegistry>, validator: Arc<dyn Validator>) -> Self {
    let (state, _) = watch::channel(WorkflowState::initial(kind));
    Self {
      kind,
      registry,
      validator,
      reset_delay: DEFAULT_RESET_DELAY,
      shared: Arc::new(Shared {
        state,
        epoch: AtomicU64::new(0),
      }),
    }
  }

  pub fn with_reset_delay(mut self, delay: Duration) -> Self {
    self.reset_delay = delay;
    self
  }

  pub fn kind(&self) -> EntityKind {
    self.kind
  }

  /// Current state, cloned.
  pub fn state(&self) -> WorkflowState {
    self.shared.state.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
    self.shared.state.subscribe()
  }

  // --------------------------------------------------------------------------
  // Reads
  // --------------------------------------------------------------------------

  pub async fn fetch_by_id(&self, id: impl Into<EntityId>) -> SyncResult<EntityHandle> {
    self.begin(Phase::Loading);
    let result = self.registry.fetch(self.kind, id).await;
    self.finish_focus(result)
  }

  pub async fn fetch_by_slug(&self, slug: &str) -> SyncResult<EntityHandle> {
    self.begin(Phase::Loading);
    let result = self.registry.fetch_by_slug(self.kind, slug).await;
    self.finish_focus(result)
  }

  /// Free-text search, one page at a time.
  pub async fn search(&self, query: &str, page: u64, per_page: u64) -> SearchResults {
    self.load_page(PageQuery::new(page, per_page).search(query)).await
  }

  pub async fn list(&self, page: u64, per_page: u64) -> SearchResults {
    self.load_page(PageQuery::new(page, per_page)).await
  }

  async fn load_page(&self, query: PageQuery) -> SearchResults {
    self.begin(Phase::Loading);

    let mut collection =
      EntityCollection::new(self.kind, Vec::new(), Arc::clone(self.registry.transport()));
    match collection.paginated(&query).await {
      Ok(pagination) => {
        let results = SearchResults {
          items: collection.to_json(),
          pagination,
        };
        let published = results.clone();
        self.transition(move |s| {
          s.phase = Phase::Success;
          s.search_results = published;
        });
        results
      }
      Err(e) => {
        let results = SearchResults::empty(query.per_page);
        let published = results.clone();
        self.transition(move |s| {
          s.phase = Phase::Error;
          s.error = Some(e.message());
          s.search_results = published;
        });
        results
      }
    }
  }

  // --------------------------------------------------------------------------
  // Writes
  // --------------------------------------------------------------------------

  /// Validate and create. A rejected bag never reaches the registry.
  pub async fn create(&self, attrs: Attributes) -> SyncResult<EntityHandle> {
    self.validated(&attrs)?;
    self.begin(Phase::Saving);
    let result = self.registry.save(self.kind, attrs).await;
    self.finish_focus(result)
  }

  /// Validate the focus merged with `attrs`, then update `id` with `attrs`.
  pub async fn update(&self, id: impl Into<EntityId>, attrs: Attributes) -> SyncResult<EntityHandle> {
    let mut candidate = self.shared.state.borrow().current.clone();
    merge_attributes(&mut candidate, &attrs);
    self.validated(&candidate)?;

    self.begin(Phase::Saving);
    let mut payload = attrs;
    payload.insert("id".into(), id.into().to_value());
    let result = self.registry.save(self.kind, payload).await;
    self.finish_focus(result)
  }

  /// Delete `id`; the focus is cleared if it pointed at the deleted entity.
  pub async fn delete(&self, id: impl Into<EntityId>) -> SyncResult<bool> {
    let id = id.into();
    self.begin(Phase::Deleting);

    match self.registry.delete(self.kind, id.clone()).await {
      Ok(deleted) => {
        let kind = self.kind;
        self.transition(move |s| {
          if s.current_id().as_ref() == Some(&id) {
            s.current = kind.defaults();
          }
          s.phase = Phase::Success;
        });
        Ok(deleted)
      }
      Err(e) => {
        self.fail(&e);
        Err(e)
      }
    }
  }

  /// Back to idle with an empty focus and no errors. Cancels a pending reset.
  pub fn reset(&self) {
    let kind = self.kind;
    self.transition(move |s| {
      s.phase = Phase::Idle;
      s.current = kind.defaults();
      s.error = None;
      s.validation_errors = None;
    });
  }

  // --------------------------------------------------------------------------
  // Transitions
  // --------------------------------------------------------------------------

  fn validated(&self, attrs: &Attributes) -> SyncResult<()> {
    match self.validator.validate(self.kind, attrs) {
      None => Ok(()),
      Some(fields) => {
        let message = SyncError::Validation(fields.clone()).message();
        debug!(kind = %self.kind, fields = ?fields.keys().collect::<Vec<_>>(), "workflow: validation failed");
        let published = fields.clone();
        self.transition(move |s| {
          s.phase = Phase::Error;
          s.error = Some(message);
          s.validation_errors = Some(published);
        });
        Err(SyncError::Validation(fields))
      }
    }
  }

  fn begin(&self, phase: Phase) {
    self.transition(|s| {
      s.phase = phase;
      s.error = None;
      s.validation_errors = None;
    });
  }

  fn finish_focus(&self, result: SyncResult<EntityHandle>) -> SyncResult<EntityHandle> {
    match result {
      Ok(handle) => {
        let current = handle.to_json();
        self.transition(move |s| {
          s.phase = Phase::Success;
          s.current = current;
        });
        Ok(handle)
      }
      Err(e) => {
        self.fail(&e);
        Err(e)
      }
    }
  }

  fn fail(&self, error: &SyncError) {
    let message = error.message();
    self.transition(move |s| {
      s.phase = Phase::Error;
      s.error = Some(message);
    });
  }

  fn transition(&self, apply: impl FnOnce(&mut WorkflowState)) {
    let mut epoch = 0;
    let mut phase = Phase::Idle;
    self.shared.state.send_modify(|s| {
      epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
      apply(s);
      phase = s.phase;
    });

    if phase.is_terminal() {
      info!(kind = %self.kind, %phase, "workflow settled");
      self.schedule_reset(epoch);
    }
  }

  fn schedule_reset(&self, epoch: u64) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      debug!(kind = %self.kind, "workflow: no runtime, auto-reset skipped");
      return;
    };

    let shared = Arc::clone(&self.shared);
    let delay = self.reset_delay;
    runtime.spawn(async move {
      tokio::time::sleep(delay).await;
      shared.state.send_if_modified(|s| {
        if shared.epoch.load(Ordering::SeqCst) != epoch {
          return false;
        }
        s.phase = Phase::Idle;
        true
      });
    });
  }
}

impl fmt::Debug for Workflow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Workflow")
      .field("kind", &self.kind)
      .field("phase", &self.shared.state.borrow().phase)
      .field("reset_delay", &self.reset_delay)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::attrs;
  use crate::sync::NullTransport;
  use crate::validation::default_rules;
  use serde_json::json;

  fn workflow(kind: EntityKind) -> Workflow {
    let registry = Arc::new(ModelRegistry::new(Arc::new(NullTransport::default())));
    Workflow::new(kind, registry, Arc::new(default_rules()))
  }

  #[test]
  fn starts_idle_with_default_focus() {
    let state = workflow(EntityKind::Tribute).state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.current, EntityKind::Tribute.defaults());
    assert_eq!(state.search_results, SearchResults::empty(10));
  }

  #[test]
  fn reset_without_runtime_is_synchronous() {
    let workflow = workflow(EntityKind::Post);
    workflow.reset();
    assert_eq!(workflow.state().phase, Phase::Idle);
  }

  #[tokio::test]
  async fn invalid_create_sets_field_errors() {
    let workflow = workflow(EntityKind::Tribute);
    let result = workflow.create(attrs(json!({ "phone_number": "555-123-4567" }))).await;
    assert!(matches!(result, Err(SyncError::Validation(_))));

    let state = workflow.state();
    assert!(state.has_error());
    assert_eq!(state.error.as_deref(), Some("Validation failed"));
    assert_eq!(
      state
        .validation_errors
        .as_ref()
        .and_then(|f| f.get("loved_one_name"))
        .map(String::as_str),
      Some("Loved one's name is required")
    );
  }

  #[tokio::test]
  async fn fetch_sets_focus() {
    let workflow = workflow(EntityKind::Post);
    workflow.fetch_by_id(4u64).await.unwrap();
    let state = workflow.state();
    assert!(state.is_success());
    assert_eq!(state.current["title"], json!({ "rendered": "Post 4" }));
    assert_eq!(state.current_id(), Some(EntityId::Num(4)));
  }

  #[tokio::test]
  async fn deleting_the_focus_clears_it() {
    let workflow = workflow(EntityKind::Post);
    workflow.fetch_by_id(4u64).await.unwrap();
    workflow.delete(4u64).await.unwrap();
    let state = workflow.state();
    assert!(state.is_success());
    assert_eq!(state.current, EntityKind::Post.defaults());
  }

  #[tokio::test]
  async fn server_render_list_is_empty_but_well_formed() {
    let workflow = workflow(EntityKind::Tribute);
    let results = workflow.list(1, 10).await;
    assert!(results.items.is_empty());
    assert_eq!(results.pagination.page, 1);
    assert_eq!(workflow.state().search_results, results);
  }
}
