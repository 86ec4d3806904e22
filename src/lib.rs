//! # statebus - event-sourced reactive state store
//!
//! statebus keeps application state in one nested tree and routes every
//! change through a single serialized event bus. Readers subscribe to exactly
//! the slice they care about; writers publish path-addressed updates.
//!
//! ## Core Concepts
//!
//! - **Event bus**: replay-last stream of [`Event`]s; every mutation is an event
//! - **Canonical state**: left fold of the bus into a [`StateTree`], with
//!   structural sharing so untouched subtrees keep their identity
//! - **Field**: a typed lens ([`Field`]) validated once at setup
//! - **Binding**: a local value cell kept in sync with one field
//!   ([`ValueBinding`]), plus the hydration flag ([`HydrationBinding`])
//! - **Lifecycle**: `@@INIT` seed, optional asynchronous hydration and
//!   persistence, `reset`/`feed` snapshots, and an idempotent `destroy`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statebus::{BindOptions, Store, StoreOptions};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Counter { count: i64 }
//!
//! let store = Store::with_options(
//!     Counter { count: 0 },
//!     StoreOptions::new().hydrator(|| async { Ok::<_, std::io::Error>(Counter { count: 88 }) }),
//! )?;
//! let count = store.field::<i64>("count")?;
//! let binding = store.bind(&count, BindOptions::new())?;
//! binding.set(5)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// State model
pub mod accessor;
pub mod error;
pub mod event;
pub mod path;
pub mod value;

// Propagation engine
pub mod bus;
pub mod reducer;
pub mod router;
pub mod stream;

// Façade and ambient concerns
pub mod config;
pub mod diagnostics;
pub mod store;

#[cfg(feature = "persistent")]
pub mod snapshot;

pub use bus::EventBus;
pub use config::{BindOptions, StoreConfig};
pub use diagnostics::{DiagnosticSink, FailureKind, StoreId, TracingSink};
pub use error::{BoxError, PathError, StoreError, StoreResult, StreamError};
pub use event::{Event, EventKind, FailureReport};
pub use path::{Field, PropertyPath, SYSTEM_PREFIX};
pub use router::Router;
pub use store::{
    ExternalStore, HydrateFn, HydrateTrigger, HydrationBinding, PersistFn, Store, StoreOptions,
    ValueBinding, ValueSetter,
};
pub use stream::{BehaviorSubject, EventStream, Observable, Observer, Subject, Subscription};
pub use value::{ObjectMap, StateTree};

#[cfg(feature = "persistent")]
pub use error::SnapshotError;
#[cfg(feature = "persistent")]
pub use snapshot::{SnapshotEnvelope, SnapshotFile};
