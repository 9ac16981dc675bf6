//! Per-session context: one transport strategy, one identity map, and the
//! workflows built on them.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::ModelRegistry;
use crate::config::Config;
use crate::entity::EntityKind;
use crate::error::SyncResult;
use crate::sync::{NetworkTransport, NullTransport, RenderMode, Transport};
use crate::validation::{default_rules, Validator};
use crate::workflow::{Workflow, DEFAULT_RESET_DELAY};

/// Everything one session (a page render, a CLI invocation, a test) needs.
///
/// Sessions never share state; build a new one per request.
#[derive(Clone)]
pub struct SyncSession {
  registry: Arc<ModelRegistry>,
  validator: Arc<dyn Validator>,
  reset_delay: Duration,
}

impl SyncSession {
  /// Build the transport named by `config.render_mode` and a fresh registry.
  pub fn new(config: &Config) -> SyncResult<Self> {
    let transport: Arc<dyn Transport> = match config.render_mode {
      RenderMode::Interactive => {
        let mut builder = NetworkTransport::builder(&config.backend.url);
        if let Some(user_agent) = &config.backend.user_agent {
          builder = builder.user_agent(user_agent);
        }
        for (key, value) in &config.backend.default_query {
          builder = builder.default_query(key, value);
        }
        if let Some(cookie) = Config::session_cookie() {
          builder = builder.session_cookie(cookie);
        }
        Arc::new(builder.build()?)
      }
      RenderMode::Server => Arc::new(NullTransport::new(config.server_render.placeholders)),
    };
    info!(mode = ?config.render_mode, backend = %config.backend.url, "session created");

    Ok(Self::with_transport(transport).reset_delay(config.workflow.reset_delay()))
  }

  /// Session over any transport, with the built-in validation rules.
  pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
    Self {
      registry: Arc::new(ModelRegistry::new(transport)),
      validator: Arc::new(default_rules()),
      reset_delay: DEFAULT_RESET_DELAY,
    }
  }

  pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
    self.validator = validator;
    self
  }

  pub fn reset_delay(mut self, delay: Duration) -> Self {
    self.reset_delay = delay;
    self
  }

  pub fn registry(&self) -> &Arc<ModelRegistry> {
    &self.registry
  }

  pub fn mode(&self) -> RenderMode {
    self.registry.mode()
  }

  /// A fresh workflow for `kind` over this session's registry.
  pub fn workflow(&self, kind: EntityKind) -> Workflow {
    Workflow::new(kind, Arc::clone(&self.registry), Arc::clone(&self.validator))
      .with_reset_delay(self.reset_delay)
  }
}
