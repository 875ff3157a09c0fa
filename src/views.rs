use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};

use enclose::enclose;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::cacheable::{boxed_fetch, CacheableBuilder};
use crate::{CacheError, Cacheable, Cached, KeyedCache, Observation, SourceUpdate};

/// A cache that pins the value of `source` as observed when it is fetched.
///
/// Its fetch reuses the current value of `source` if that is fresh, and
/// refreshes `source` otherwise. Every later change of `source` marks the
/// snapshot stale. Disposing the snapshot also disposes `source` when
/// nobody else observes it.
pub fn snapshot<T: Clone + 'static>(source: &Cacheable<T>) -> Cacheable<T> {
	let fetch = boxed_fetch(enclose!((source) move || enclose!((source) async move {
		let mut observation = source.observe()?;
		let current = observation.next().await.ok_or(CacheError::Disposed)??;
		std::mem::drop(observation);

		if current.fresh {
			Ok(current.value)
		} else {
			source.refresh().await
		}
	})));

	// subscribes to `source` only once the snapshot attaches its feed
	let feed = stream::once(future::ready(())).flat_map(enclose!((source) move |_| {
		match source.observe() {
			Ok(observation) => observation
				.skip(1)
				// a failing source only outdates the pinned value
				.map(|_| SourceUpdate::Stale)
				.left_stream(),
			Err(_) => stream::empty().right_stream(),
		}
	}));

	let derived = CacheableBuilder::with_spawner(source.spawner(), fetch)
		.name(source.name())
		.source(feed)
		.build();

	derived.on_dispose(enclose!((source) move || {
		if !source.has_observers() {
			debug!(cache = source.name(), "snapshot disposed, releasing its source");
			source.dispose();
		}
	}));

	derived
}

/// The values of a fresh [`snapshot`] of `source`.
pub fn snapshot_value<T: Clone + 'static>(source: &Cacheable<T>) -> Result<Values<T>, CacheError> {
	let derived = snapshot(source);
	Ok(Values {
		observation: derived.observe()?,
		_cache: derived,
	})
}

/// Observes `source`, refreshing it every time a stale value shows up.
///
/// The stale value is still yielded right away; the fresh one follows once
/// the refresh lands.
pub fn autorefresh<T: Clone + 'static>(source: &Cacheable<T>) -> Result<Autorefresh<T>, CacheError> {
	Ok(Autorefresh {
		observation: source.observe()?,
		source: source.clone(),
	})
}

pub fn autorefresh_value<T: Clone + 'static>(
	source: &Cacheable<T>,
) -> Result<impl Stream<Item = Result<T, CacheError>>, CacheError> {
	Ok(autorefresh(source)?.map(|item| item.map(Cached::into_value)))
}

/// Something that carries its own identity.
pub trait Keyed {
	type Key;

	fn key(&self) -> Self::Key;
}

/// Pushes every item of a freshly fetched list into its own per-item cache.
///
/// Every key is resolved before any value is pushed, so a failing key leaves
/// all caches untouched. Caches built for earlier keys stay in `cache`.
pub fn cached_list<V, I>(
	items: I,
	cache: &KeyedCache<V::Key, Cacheable<V>>,
) -> Result<Vec<Cacheable<V>>, CacheError>
where
	I: IntoIterator<Item = V>,
	V: Keyed + Clone + 'static,
	V::Key: Eq + Hash + Clone + 'static,
{
	let resolved = items
		.into_iter()
		.map(|item| Ok((cache.get(&item.key())?, item)))
		.collect::<Result<Vec<_>, CacheError>>()?;

	Ok(resolved
		.into_iter()
		.map(|(cached, item)| {
			cached.refresh_with(item);
			cached
		})
		.collect())
}

/// Stream returned by [`autorefresh`].
pub struct Autorefresh<T: Clone + 'static> {
	observation: Observation<T>,
	source: Cacheable<T>,
}

impl<T: Clone + 'static> Stream for Autorefresh<T> {
	type Item = Result<Cached<T>, CacheError>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let item = futures::ready!(self.observation.poll_next_unpin(cx));

		if let Some(Ok(Cached { fresh: false, .. })) = &item {
			// runs on the cache's spawner, no need to keep it
			std::mem::drop(self.source.refresh());
		}

		Poll::Ready(item)
	}
}

/// Plain values of a cache that lives as long as the stream.
pub struct Values<T: Clone + 'static> {
	observation: Observation<T>,
	_cache: Cacheable<T>,
}

impl<T: Clone + 'static> Stream for Values<T> {
	type Item = Result<T, CacheError>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.observation
			.poll_next_unpin(cx)
			.map(|item| item.map(|item| item.map(Cached::into_value)))
	}
}
