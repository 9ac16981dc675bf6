mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::MemoryTransport;
use tribute_sync::entity::attrs;
use tribute_sync::validation::{FieldRule, RuleTable};
use tribute_sync::{
  EntityId, EntityKind, Phase, SearchResults, SyncError, SyncSession, Transport, Workflow,
};

fn tributes() -> Arc<MemoryTransport> {
  Arc::new(MemoryTransport::new().with_records(
    EntityKind::Tribute,
    vec![
      json!({ "id": 1, "loved_one_name": "Alpha Centauri", "phone_number": "555-000-0001" }),
      json!({ "id": 2, "loved_one_name": "Beta Pictoris", "phone_number": "555-000-0002" }),
      json!({ "id": 3, "loved_one_name": "Alpha Orionis", "phone_number": "555-000-0003" }),
    ],
  ))
}

fn session(transport: &Arc<MemoryTransport>) -> SyncSession {
  SyncSession::with_transport(Arc::clone(transport) as Arc<dyn Transport>)
}

// ── Validation ──────────────────────────────────────────────────

#[tokio::test]
async fn validation_failure_never_reaches_the_transport() {
  let transport = Arc::new(MemoryTransport::new());
  let rules = RuleTable::new().rule(
    EntityKind::User,
    FieldRule::new("name").required("Name is required"),
  );
  let workflow = session(&transport)
    .validator(Arc::new(rules))
    .workflow(EntityKind::User);

  let result = workflow.create(attrs(json!({}))).await;
  assert!(matches!(result, Err(SyncError::Validation(_))));

  let state = workflow.state();
  assert_eq!(state.phase, Phase::Error);
  assert_eq!(
    state.validation_errors,
    Some([("name".to_string(), "Name is required".to_string())].into())
  );
  assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn update_validates_against_the_current_focus() {
  let transport = tributes();
  let workflow = session(&transport).workflow(EntityKind::Tribute);
  workflow.fetch_by_id(2u64).await.unwrap();

  // Name and phone come from the focus; only the status changes.
  let updated = workflow
    .update(2u64, attrs(json!({ "status": "published" })))
    .await
    .unwrap();
  assert_eq!(updated.get("status"), Some(json!("published")));
  assert_eq!(workflow.state().current["status"], json!("published"));

  let err = workflow
    .update(2u64, attrs(json!({ "phone_number": "5550000002" })))
    .await
    .unwrap_err();
  assert!(matches!(err, SyncError::Validation(_)));
  assert_eq!(transport.call_count(), 2);
}

// ── Search ──────────────────────────────────────────────────────

#[tokio::test]
async fn search_pages_through_matching_records() {
  let transport = tributes();
  let workflow = session(&transport).workflow(EntityKind::Tribute);

  let first = workflow.search("Alpha", 1, 1).await;
  assert_eq!(first.items.len(), 1);
  assert_eq!((first.pagination.page, first.pagination.page_size), (1, 1));
  assert_eq!(first.pagination.total_pages, 2);

  let second = workflow.search("Alpha", 2, 1).await;
  assert_eq!(second.items.len(), 1);
  assert_eq!(second.pagination.page, 2);
  assert_ne!(first.items[0]["id"], second.items[0]["id"]);

  let state = workflow.state();
  assert!(state.is_success());
  assert_eq!(state.search_results, second);
}

#[tokio::test]
async fn failed_search_yields_an_empty_page() {
  let transport = tributes();
  let workflow = session(&transport).workflow(EntityKind::Tribute);

  transport.fail_next(SyncError::transport(502, "Search failed: Bad Gateway"));
  let results = workflow.search("Alpha", 3, 5).await;
  assert_eq!(results, SearchResults::empty(5));

  let state = workflow.state();
  assert_eq!(state.phase, Phase::Error);
  assert_eq!(state.error.as_deref(), Some("Search failed: Bad Gateway"));
  assert_eq!(state.search_results, SearchResults::empty(5));
}

// ── Focus ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_delete_clears_the_focus() {
  let transport = tributes();
  let workflow = session(&transport).workflow(EntityKind::Tribute);

  let created = workflow
    .create(attrs(json!({ "loved_one_name": "Gamma Draconis", "phone_number": "555-000-0004" })))
    .await
    .unwrap();
  let id = created.id().unwrap();
  assert_eq!(workflow.state().current_id(), Some(id.clone()));

  workflow.delete(id).await.unwrap();
  let state = workflow.state();
  assert!(state.is_success());
  assert_eq!(state.current, EntityKind::Tribute.defaults());
}

#[tokio::test]
async fn failed_delete_keeps_the_focus() {
  let transport = tributes();
  let workflow = session(&transport).workflow(EntityKind::Tribute);
  workflow.fetch_by_id(1u64).await.unwrap();

  transport.fail_next(SyncError::transport(403, "Forbidden"));
  assert!(workflow.delete(1u64).await.is_err());

  let state = workflow.state();
  assert!(state.has_error());
  assert_eq!(state.error.as_deref(), Some("Forbidden"));
  assert_eq!(state.current_id(), Some(EntityId::Num(1)));
}

#[tokio::test]
async fn missing_entity_reports_not_found() {
  let transport = tributes();
  let workflow = session(&transport).workflow(EntityKind::Tribute);
  assert!(workflow.fetch_by_slug("nobody").await.is_err());
  assert_eq!(workflow.state().error.as_deref(), Some("tribute nobody not found"));
}

// ── Auto-reset ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn terminal_states_fall_back_to_idle() {
  let transport = tributes();
  let workflow = session(&transport)
    .reset_delay(Duration::from_secs(3))
    .workflow(EntityKind::Tribute);

  workflow.fetch_by_id(1u64).await.unwrap();
  assert_eq!(workflow.state().phase, Phase::Success);

  tokio::time::sleep(Duration::from_millis(2900)).await;
  assert_eq!(workflow.state().phase, Phase::Success);

  tokio::time::sleep(Duration::from_millis(200)).await;
  let state = workflow.state();
  assert_eq!(state.phase, Phase::Idle);
  assert_eq!(state.current_id(), Some(EntityId::Num(1)));
}

#[tokio::test(start_paused = true)]
async fn a_new_transition_cancels_the_pending_reset() {
  let transport = tributes();
  let workflow: Workflow = session(&transport)
    .reset_delay(Duration::from_secs(3))
    .workflow(EntityKind::Tribute);

  workflow.fetch_by_id(1u64).await.unwrap();
  tokio::time::sleep(Duration::from_secs(2)).await;

  // Second success two seconds in; the first timer must not cut it short.
  workflow.fetch_by_id(2u64).await.unwrap();
  tokio::time::sleep(Duration::from_millis(1500)).await;
  assert_eq!(workflow.state().phase, Phase::Success);

  tokio::time::sleep(Duration::from_secs(2)).await;
  assert_eq!(workflow.state().phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn subscribers_observe_each_transition() {
  let transport = tributes();
  let workflow = session(&transport).workflow(EntityKind::Tribute);
  let mut rx = workflow.subscribe();

  workflow.fetch_by_id(3u64).await.unwrap();
  rx.changed().await.unwrap();
  assert_eq!(rx.borrow_and_update().phase, Phase::Success);

  rx.changed().await.unwrap();
  assert_eq!(rx.borrow_and_update().phase, Phase::Idle);
}
