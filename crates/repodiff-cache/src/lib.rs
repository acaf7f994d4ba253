//! Incrementally maintained diff cache for version-controlled trees.
//!
//! Each tracked repository gets a [`DiffCacheEntry`] holding the latest
//! [`DiffSnapshot`](repodiff_snapshot::DiffSnapshot). Entries recompute in
//! full when the engine signals an index or HEAD change, and incrementally
//! (restricted to the touched paths) when filesystem change events arrive.
//! Bursts of events are debounced by an [`UpdateCoalescer`].
//!
//! # Key Types
//!
//! - [`DiffCacheRegistry`] — One entry per repository, created on demand
//! - [`DiffCacheEntry`] — Snapshot holder and recompute state machine
//! - [`UpdateCoalescer`] — Accumulate-then-delay batching of changed paths
//! - [`Scheduler`] — Delayed task execution ([`TokioScheduler`], [`ManualScheduler`])
//! - [`EventSource`] — Where change-event trees come from ([`EventHub`])
//! - [`CacheConfig`] — Debounce window and extractor settings

pub mod coalescer;
pub mod config;
pub mod entry;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod source;

pub use coalescer::{PendingChanges, UpdateCoalescer};
pub use config::CacheConfig;
pub use entry::{DiffCacheEntry, EntryState, Listener, ListenerId, RecomputeKind};
pub use error::{CacheError, CacheResult};
pub use registry::DiffCacheRegistry;
pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, TokioScheduler};
pub use source::{EventCallback, EventHub, EventSource};
