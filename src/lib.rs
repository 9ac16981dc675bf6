//! Client-side entity cache and synchronization layer for the tribute
//! backend: an identity-mapped model registry, pluggable transports for
//! interactive and server-rendering contexts, context-aware collections and
//! an observable workflow state machine.

pub mod cache;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod session;
pub mod sync;
pub mod validation;
pub mod workflow;

pub use cache::{EntityHandle, Model, ModelRegistry};
pub use collection::{EntityCollection, PageQuery, Pagination};
pub use entity::{Attributes, Entity, EntityId, EntityKind};
pub use error::{FieldErrors, SyncError, SyncResult};
pub use session::SyncSession;
pub use sync::{NetworkTransport, NullTransport, RenderMode, SyncOptions, SyncResponse, SyncTarget, Transport, Verb};
pub use workflow::{Phase, SearchResults, Workflow, WorkflowState};
