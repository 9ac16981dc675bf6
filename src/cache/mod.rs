//! Identity-mapped entity cache.
//!
//! Holds at most one live entity per `(kind, id)` so every holder of a key
//! observes the same object:
//! - `get_or_create` merges into or seeds the canonical entity, no I/O
//! - `fetch`/`save`/`delete` go through the injected [`Transport`](crate::sync::Transport)
//!   and only touch the cache once the transport succeeds
//! - concurrent calls for one key are not coalesced; the last answer wins

mod registry;
mod traits;

pub use registry::{EntityHandle, ModelRegistry};
pub use traits::Model;
