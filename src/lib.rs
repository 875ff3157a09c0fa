//! Reactive stale-while-revalidate caching of a single asynchronously
//! fetched value.
//!
//! A [`Cacheable`] wraps a fetch function and exposes the cached value as a
//! stream of [`Cached`] snapshots tagged fresh or stale. Concurrent refreshes
//! are coalesced, invalidations never wait for a fetch, and an optional push
//! feed of [`SourceUpdate`]s can update or invalidate the value directly.
//!
//! Everything is single-threaded: handles are `Rc`-based and the fetches run
//! as local tasks on the spawner the cache is created with.

pub mod macros;

mod bridge;
mod cacheable;
mod coordinator;
mod error;
mod keyed;
mod observers;
mod slot;
mod views;

pub use cacheable::{Cacheable, CacheableBuilder};
pub use coordinator::Refresh;
pub use error::CacheError;
pub use keyed::{Evict, KeyedCache};
pub use observers::Observation;
pub use slot::{Cached, Slot};
pub use views::{autorefresh, autorefresh_value, cached_list, snapshot, snapshot_value};
pub use views::{Autorefresh, Keyed, Values};

/// An event pushed by the source feed of a [`Cacheable`].
#[derive(Debug, Clone)]
pub enum SourceUpdate<T> {
	/// A new value, cached as fresh without fetching.
	Fresh(T),
	/// The current value is outdated.
	Stale,
	/// The source failed; cached like a fetch error.
	Failed(CacheError),
}
