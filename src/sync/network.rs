use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::{OutgoingRequest, RenderMode, SyncOptions, SyncResponse, SyncTarget, Transport, Verb};
use crate::entity::wire;
use crate::error::{SyncError, SyncResult};

/// HTTP transport for the interactive context.
///
/// Every call goes through one client whose cookie jar is scoped to the
/// backend origin, so session cookies ride along on every verb.
#[derive(Clone)]
pub struct NetworkTransport {
  client: Client,
  base: Url,
  jar: Arc<Jar>,
  /// Appended to every `GET` before the per-call hook runs
  default_query: Vec<(String, String)>,
}

impl NetworkTransport {
  pub fn new(base_url: &str) -> SyncResult<Self> {
    Self::builder(base_url).build()
  }

  pub fn builder(base_url: &str) -> NetworkTransportBuilder {
    NetworkTransportBuilder {
      base_url: base_url.to_string(),
      user_agent: concat!("tribute-sync/", env!("CARGO_PKG_VERSION")).to_string(),
      session_cookie: None,
      default_query: Vec::new(),
      headers: Vec::new(),
    }
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// Seed additional cookie material for the backend origin.
  pub fn add_cookie(&self, cookie: &str) {
    self.jar.add_cookie_str(cookie, &self.base);
  }

  fn resolve(&self, address: &str) -> SyncResult<Url> {
    Ok(self.base.join(address)?)
  }

  fn prepare(
    &self,
    verb: Verb,
    target: &SyncTarget,
    options: &SyncOptions,
  ) -> SyncResult<OutgoingRequest> {
    let address = options.address_for(target);
    if address.is_empty() {
      return Err(SyncError::MissingAddress);
    }

    let mut url = self.resolve(&address)?;
    let defaults: &[(String, String)] = if verb == Verb::Read {
      &self.default_query
    } else {
      &[]
    };
    if !defaults.is_empty() || !options.query.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (k, v) in defaults.iter().chain(options.query.iter()) {
        pairs.append_pair(k, v);
      }
    }

    let body = verb.sends_body().then(|| options.payload_for(target));

    let mut outgoing = OutgoingRequest {
      verb,
      method: verb.method(),
      url,
      headers: options.headers.clone(),
      body,
    };
    if let Some(hook) = &options.before_send {
      hook(&mut outgoing);
    }
    Ok(outgoing)
  }
}

#[async_trait]
impl Transport for NetworkTransport {
  fn mode(&self) -> RenderMode {
    RenderMode::Interactive
  }

  async fn sync(
    &self,
    verb: Verb,
    target: &SyncTarget,
    options: SyncOptions,
  ) -> SyncResult<SyncResponse> {
    let outgoing = self.prepare(verb, target, &options)?;
    debug!(%verb, method = %outgoing.method, url = %outgoing.url, "sync request");

    let mut request = self
      .client
      .request(outgoing.method.clone(), outgoing.url.clone());
    for (name, value) in &outgoing.headers {
      request = request.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &outgoing.body {
      request = request.json(body);
    }

    let response = request.send().await.map_err(|e| {
      warn!(%verb, url = %outgoing.url, error = %e, "sync request failed");
      SyncError::unreachable(format!("Request to {} failed: {}", outgoing.url, e))
    })?;

    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
      warn!(%verb, url = %outgoing.url, status = status.as_u16(), "sync request rejected");
      if status == StatusCode::NOT_FOUND && verb == Verb::Read {
        return Err(SyncError::NotFound(target.describe()));
      }
      let message = wire::error_message(&bytes).unwrap_or_else(|| {
        status
          .canonical_reason()
          .unwrap_or("Request failed")
          .to_string()
      });
      return Err(SyncError::transport(status.as_u16(), message));
    }

    if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(SyncResponse::NoContent);
    }

    let value = serde_json::from_slice(&bytes)?;
    Ok(options.receive(SyncResponse::Json(value)))
  }
}

/// Builder for [`NetworkTransport`].
pub struct NetworkTransportBuilder {
  base_url: String,
  user_agent: String,
  session_cookie: Option<String>,
  default_query: Vec<(String, String)>,
  headers: Vec<(String, String)>,
}

impl NetworkTransportBuilder {
  pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
    self.user_agent = user_agent.into();
    self
  }

  /// `name=value` cookie attached to every call against the origin.
  pub fn session_cookie(mut self, cookie: impl Into<String>) -> Self {
    self.session_cookie = Some(cookie.into());
    self
  }

  pub fn default_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.default_query.push((key.into(), value.into()));
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn build(self) -> SyncResult<NetworkTransport> {
    let base = Url::parse(&self.base_url)?;

    let jar = Arc::new(Jar::default());
    if let Some(cookie) = &self.session_cookie {
      jar.add_cookie_str(cookie, &base);
    }

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in &self.headers {
      let name = HeaderName::try_from(name.as_str())
        .map_err(|e| SyncError::InvalidUrl(format!("invalid header name {}: {}", name, e)))?;
      let value = HeaderValue::try_from(value.as_str())
        .map_err(|e| SyncError::InvalidUrl(format!("invalid header value: {}", e)))?;
      headers.insert(name, value);
    }

    let client = Client::builder()
      .user_agent(self.user_agent)
      .default_headers(headers)
      .cookie_provider(Arc::clone(&jar))
      .build()?;

    Ok(NetworkTransport {
      client,
      base,
      jar,
      default_query: self.default_query,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::{attrs, Attributes, EntityId, EntityKind};
  use serde_json::json;

  fn transport() -> NetworkTransport {
    NetworkTransport::builder("https://tributes.example.com/")
      .default_query("_wpnonce", "n0nce")
      .build()
      .unwrap()
  }

  #[test]
  fn read_appends_default_query_and_has_no_body() {
    let target = SyncTarget::entity(EntityKind::Post, Some(EntityId::Num(4)), Attributes::new());
    let req = transport()
      .prepare(Verb::Read, &target, &SyncOptions::new().query("context", "edit"))
      .unwrap();
    assert_eq!(
      req.url.as_str(),
      "https://tributes.example.com/api/wp/posts/4?_wpnonce=n0nce&context=edit"
    );
    assert!(req.body.is_none());
  }

  #[test]
  fn writes_skip_default_query_and_carry_the_body() {
    let target = SyncTarget::entity(
      EntityKind::Tribute,
      None,
      attrs(json!({ "loved_one_name": "Ada" })),
    );
    let req = transport()
      .prepare(Verb::Create, &target, &SyncOptions::new())
      .unwrap();
    assert_eq!(req.url.as_str(), "https://tributes.example.com/api/tributes");
    assert_eq!(req.method, reqwest::Method::POST);
    assert_eq!(req.body, Some(json!({ "loved_one_name": "Ada" })));
  }

  #[test]
  fn before_send_can_rewrite_the_request() {
    let target = SyncTarget::collection(EntityKind::Tribute);
    let options = SyncOptions::new().before_send(|req| {
      req.url.query_pairs_mut().append_pair("page", "2");
    });
    let req = transport().prepare(Verb::Read, &target, &options).unwrap();
    assert_eq!(req.url.query(), Some("_wpnonce=n0nce&page=2"));
  }

  #[test]
  fn rejects_unparseable_base_urls() {
    assert!(matches!(
      NetworkTransport::new("not a url"),
      Err(SyncError::InvalidUrl(_))
    ));
  }
}
