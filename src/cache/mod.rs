//! Caching layer
//!
//! Time-boxed in-memory caches for documents and credentials that are
//! expensive to fetch: the teams history document, GitHub installation
//! tokens and signing keys.

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{spawn_cleanup_task, CacheEntry, CacheStats, TtlCache};
