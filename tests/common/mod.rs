#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use tribute_sync::entity::{attrs, merge_attributes};
use tribute_sync::{
  Attributes, EntityId, EntityKind, RenderMode, SyncError, SyncOptions, SyncResponse, SyncResult,
  SyncTarget, Transport, Verb,
};

/// One call as the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
  pub verb: Verb,
  pub address: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
}

/// In-memory backend: records every call and answers from a per-kind record
/// list, supporting `search`, `page` and `per_page` on collection reads.
pub struct MemoryTransport {
  mode: RenderMode,
  records: Mutex<BTreeMap<EntityKind, Vec<Attributes>>>,
  calls: Mutex<Vec<Call>>,
  failure: Mutex<Option<SyncError>>,
  next_id: AtomicU64,
}

impl MemoryTransport {
  pub fn new() -> Self {
    Self {
      mode: RenderMode::Interactive,
      records: Mutex::new(BTreeMap::new()),
      calls: Mutex::new(Vec::new()),
      failure: Mutex::new(None),
      next_id: AtomicU64::new(100),
    }
  }

  /// Same backend, but reporting the server-rendering mode.
  pub fn server() -> Self {
    Self {
      mode: RenderMode::Server,
      ..Self::new()
    }
  }

  pub fn with_records(self, kind: EntityKind, records: Vec<Value>) -> Self {
    self
      .records
      .lock()
      .unwrap()
      .insert(kind, records.into_iter().map(attrs).collect());
    self
  }

  /// Make the next call fail with `error`.
  pub fn fail_next(&self, error: SyncError) {
    *self.failure.lock().unwrap() = Some(error);
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn stored(&self, kind: EntityKind, id: u64) -> Option<Attributes> {
    let records = self.records.lock().unwrap();
    records
      .get(&kind)?
      .iter()
      .find(|r| r.get("id") == Some(&json!(id)))
      .cloned()
  }

  fn record(&self, verb: Verb, target: &SyncTarget, options: &SyncOptions) {
    self.calls.lock().unwrap().push(Call {
      verb,
      address: options.address_for(target),
      query: options.query.clone(),
      body: verb.sends_body().then(|| options.payload_for(target)),
    });
  }

  fn position(records: &[Attributes], id: &EntityId) -> Option<usize> {
    records
      .iter()
      .position(|r| r.get("id").and_then(EntityId::from_value).as_ref() == Some(id))
  }

  fn read_one(&self, kind: EntityKind, id: &EntityId) -> SyncResult<SyncResponse> {
    let records = self.records.lock().unwrap();
    let list = records.get(&kind).map(Vec::as_slice).unwrap_or_default();
    match Self::position(list, id) {
      Some(i) => Ok(SyncResponse::Json(Value::Object(list[i].clone()))),
      None => Err(SyncError::NotFound(format!("{} {}", kind, id))),
    }
  }

  fn read_slug(&self, kind: EntityKind, slug: &str) -> SyncResponse {
    let records = self.records.lock().unwrap();
    let found = records
      .get(&kind)
      .and_then(|list| list.iter().find(|r| r.get("slug") == Some(&json!(slug))));
    match found {
      Some(record) => SyncResponse::Json(json!({ "success": true, "tribute": record })),
      None => SyncResponse::Json(json!({ "success": false, "tribute": null })),
    }
  }

  fn read_page(&self, kind: EntityKind, options: &SyncOptions) -> SyncResponse {
    let param = |name: &str| {
      options
        .query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
    };
    let page: usize = param("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: usize = param("per_page").and_then(|p| p.parse().ok()).unwrap_or(10);
    let search = param("search").map(|s| s.to_lowercase());

    let records = self.records.lock().unwrap();
    let matching: Vec<Attributes> = records
      .get(&kind)
      .cloned()
      .unwrap_or_default()
      .into_iter()
      .filter(|r| match &search {
        Some(term) => r
          .values()
          .any(|v| v.as_str().is_some_and(|s| s.to_lowercase().contains(term))),
        None => true,
      })
      .collect();

    let total = matching.len();
    let items: Vec<Attributes> = matching
      .into_iter()
      .skip((page.max(1) - 1) * per_page)
      .take(per_page)
      .collect();

    SyncResponse::Json(json!({
      "items": items,
      "total_items": total,
      "total_pages": total.div_ceil(per_page.max(1)),
      "current_page": page,
    }))
  }

  fn write(&self, verb: Verb, target: &SyncTarget, options: &SyncOptions) -> SyncResult<SyncResponse> {
    let kind = target.kind();
    let Value::Object(mut payload) = options.payload_for(target) else {
      return Err(SyncError::Decode("payload must be an object".into()));
    };

    let mut records = self.records.lock().unwrap();
    let list = records.entry(kind).or_default();

    let id = match (verb, payload.get("id").and_then(EntityId::from_value)) {
      (Verb::Create, _) | (_, None) => {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        payload.insert("id".into(), json!(id));
        list.push(payload.clone());
        return Ok(SyncResponse::Json(Value::Object(payload)));
      }
      (_, Some(id)) => id,
    };

    match Self::position(list, &id) {
      Some(i) => {
        merge_attributes(&mut list[i], &payload);
        Ok(SyncResponse::Json(Value::Object(list[i].clone())))
      }
      None => Err(SyncError::transport(404, format!("{} {} does not exist", kind, id))),
    }
  }

  fn delete(&self, target: &SyncTarget) -> SyncResult<SyncResponse> {
    if let SyncTarget::Entity { kind, id: Some(id), .. } = target {
      let mut records = self.records.lock().unwrap();
      if let Some(list) = records.get_mut(kind) {
        if let Some(i) = Self::position(list, id) {
          list.remove(i);
        }
      }
    }
    Ok(SyncResponse::NoContent)
  }
}

#[async_trait]
impl Transport for MemoryTransport {
  fn mode(&self) -> RenderMode {
    self.mode
  }

  async fn sync(
    &self,
    verb: Verb,
    target: &SyncTarget,
    options: SyncOptions,
  ) -> SyncResult<SyncResponse> {
    self.record(verb, target, &options);
    if let Some(error) = self.failure.lock().unwrap().take() {
      return Err(error);
    }

    match (verb, target) {
      (Verb::Read, SyncTarget::Entity { kind, id: Some(id), .. }) => self.read_one(*kind, id),
      (Verb::Read, SyncTarget::Collection { kind }) => {
        let address = options.address_for(target);
        match address.rsplit_once("/by-slug/") {
          Some((_, slug)) => Ok(self.read_slug(*kind, slug)),
          None => Ok(self.read_page(*kind, &options)),
        }
      }
      (Verb::Read, _) => Err(SyncError::MissingAddress),
      (Verb::Delete, _) => self.delete(target),
      (_, _) => self.write(verb, target, &options),
    }
  }
}
