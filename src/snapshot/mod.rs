//! File-backed snapshot persistence.
//!
//! [`SnapshotFile`] keeps the latest state in one checksummed file and plugs
//! into a store as both hydrator and persist hook through
//! [`crate::StoreOptions::snapshot_file`]:
//!
//! ```rust,ignore
//! let file = SnapshotFile::new("./state.sbus");
//! let store = Store::with_options(Counter::default(), StoreOptions::new().snapshot_file(file))?;
//! ```

pub mod codec;
mod file;
mod link;

pub use file::{SnapshotEnvelope, SnapshotFile};
pub(crate) use link::SnapshotLink;
