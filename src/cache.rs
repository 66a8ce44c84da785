//! Response cache shared by the sessions of a browser.
//!
//! See [`store`] for eviction and lifetime rules and [`policy`] for what is
//! admitted in the first place.

mod entry;
pub mod policy;
mod store;

use std::sync::Arc;

use parking_lot::RwLock;

pub use entry::{CacheEntry, CacheKey, Expiry};
pub use policy::{CacheControl, Directive, Uncacheable};
pub use store::{CacheStats, CacheStore};

/// Shared handle to a cache store. Lookups take the read lock, mutations the write lock.
pub type CacheHandle = Arc<RwLock<CacheStore>>;
