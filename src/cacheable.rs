use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use futures::stream::Stream;
use futures::task::{LocalSpawn, LocalSpawnExt};
use futures::{FutureExt, StreamExt};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::bridge::{Feed, SourceBridge};
use crate::coordinator::{Coordinator, Refresh};
use crate::observers::{self, Observation, Observers};
use crate::{CacheError, Cached, Slot, SourceUpdate};

pub(crate) type FetchFn<T> = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<T, CacheError>>>;

/// A single asynchronously fetched value, exposed as a live stream of
/// fresh/stale snapshots.
///
/// Handles are cheap to clone and all point to the same cache.
pub struct Cacheable<T: Clone + 'static> {
	body: Rc<CacheableBody<T>>,
}

impl<T: Clone + 'static> Clone for Cacheable<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub(crate) struct CacheableBody<T: Clone + 'static> {
	pub(crate) name: &'static str,
	pub(crate) fetch: FetchFn<T>,
	pub(crate) coordinator: RefCell<Coordinator<T>>,
	pub(crate) bridge: RefCell<SourceBridge<T>>,
	pub(crate) observers: Rc<RefCell<Observers<T>>>,
	pub(crate) this: Weak<CacheableBody<T>>,
	spawner: Rc<dyn LocalSpawn>,
	slot: RefCell<Slot<T>>,
	disposed: Cell<bool>,
	on_dispose: RefCell<SmallVec<[Box<dyn FnOnce()>; 1]>>,
}

impl<T: Clone + 'static> Drop for CacheableBody<T> {
	fn drop(&mut self) {
		let feed = self.bridge.get_mut().unsubscribe();
		std::mem::drop(feed);
	}
}

/// Configures a [`Cacheable`] before it is created.
pub struct CacheableBuilder<T: Clone + 'static> {
	name: &'static str,
	spawner: Rc<dyn LocalSpawn>,
	fetch: FetchFn<T>,
	source: Option<Feed<T>>,
}

impl<T: Clone + 'static> CacheableBuilder<T> {
	pub(crate) fn with_spawner(spawner: Rc<dyn LocalSpawn>, fetch: FetchFn<T>) -> Self {
		CacheableBuilder {
			name: "<unnamed>",
			spawner,
			fetch,
			source: None,
		}
	}

	/// Name attached to every log event of this cache.
	pub fn name(mut self, name: &'static str) -> Self {
		self.name = name;
		self
	}

	/// Push feed that updates or invalidates the value without fetching.
	pub fn source(mut self, feed: impl Stream<Item = SourceUpdate<T>> + 'static) -> Self {
		self.source = Some(feed.boxed_local());
		self
	}

	pub fn build(self) -> Cacheable<T> {
		Cacheable {
			body: Rc::new_cyclic(|this| CacheableBody {
				name: self.name,
				fetch: self.fetch,
				coordinator: RefCell::new(Coordinator::default()),
				bridge: RefCell::new(SourceBridge::new(self.source)),
				observers: Rc::new(RefCell::new(Observers::default())),
				this: this.clone(),
				spawner: self.spawner,
				slot: RefCell::new(Slot::Empty),
				disposed: Cell::new(false),
				on_dispose: RefCell::new(SmallVec::new()),
			}),
		}
	}
}

impl<T: Clone + 'static> Cacheable<T> {
	/// Creates a cache around `fetch`. Fetches and feed updates are run
	/// as tasks on `spawner`.
	pub fn new<S, F, Fut>(spawner: S, fetch: F) -> Self
	where
		S: LocalSpawn + 'static,
		F: Fn() -> Fut + 'static,
		Fut: Future<Output = Result<T, CacheError>> + 'static,
	{
		Self::builder(spawner, fetch).build()
	}

	pub fn with_source<S, F, Fut>(
		spawner: S,
		fetch: F,
		feed: impl Stream<Item = SourceUpdate<T>> + 'static,
	) -> Self
	where
		S: LocalSpawn + 'static,
		F: Fn() -> Fut + 'static,
		Fut: Future<Output = Result<T, CacheError>> + 'static,
	{
		Self::builder(spawner, fetch).source(feed).build()
	}

	pub fn builder<S, F, Fut>(spawner: S, fetch: F) -> CacheableBuilder<T>
	where
		S: LocalSpawn + 'static,
		F: Fn() -> Fut + 'static,
		Fut: Future<Output = Result<T, CacheError>> + 'static,
	{
		CacheableBuilder::with_spawner(Rc::new(spawner), boxed_fetch(fetch))
	}

	/// Subscribes to the value.
	///
	/// The first observer attaches the source feed and, if nothing was
	/// ever cached, starts a fetch. Fails once the cache is disposed.
	pub fn observe(&self) -> Result<Observation<T>, CacheError> {
		let body = &self.body;
		if body.disposed.get() {
			return Err(CacheError::Disposed);
		}

		let observation = observers::subscribe(&body.observers, &body.slot.borrow());
		body.attach_source();

		let first = body.observers.borrow().len() == 1;
		if first && body.slot.borrow().is_empty() {
			debug!(cache = body.name, "first observer, fetching");
			std::mem::drop(body.refresh());
		}

		Ok(observation)
	}

	/// Fetches a new value, coalescing with a fetch already running:
	/// while one is in flight at most one more gets queued behind it and
	/// every further call shares that queued one.
	pub fn refresh(&self) -> Refresh<T> {
		self.body.attach_source();
		self.body.refresh()
	}

	/// Marks the current value stale. Never fetches.
	pub fn invalidate(&self) {
		self.body.invalidate();
	}

	/// Caches `value` as fresh without fetching.
	pub fn refresh_with(&self, value: T) {
		self.body.attach_source();
		self.body.set_resolved(value);
	}

	/// Like [`Cacheable::refresh_with`], rejecting an absent value.
	pub fn try_refresh_with(&self, value: Option<T>) -> Result<(), CacheError> {
		let value = value.ok_or(CacheError::AbsentValue)?;
		self.refresh_with(value);
		Ok(())
	}

	/// Caches a failure without fetching.
	pub fn refresh_with_error(&self, error: CacheError) {
		self.body.attach_source();
		self.body.set_failed(error);
	}

	/// Releases the source feed and ends every observation. Idempotent.
	pub fn dispose(&self) {
		self.body.dispose();
	}

	/// Registers a callback fired once, when the cache gets disposed.
	pub fn on_dispose(&self, callback: impl FnOnce() + 'static) {
		if self.body.disposed.get() {
			return;
		}

		self.body.on_dispose.borrow_mut().push(Box::new(callback));
	}

	pub fn state(&self) -> Slot<T> {
		self.body.slot.borrow().clone()
	}

	pub fn value(&self) -> Option<Cached<T>> {
		self.body.slot.borrow().resolved().cloned()
	}

	pub fn has_observers(&self) -> bool {
		!self.body.observers.borrow().is_empty()
	}

	pub fn observer_count(&self) -> usize {
		self.body.observers.borrow().len()
	}

	pub fn is_disposed(&self) -> bool {
		self.body.disposed.get()
	}

	pub fn is_refreshing(&self) -> bool {
		self.body.coordinator.borrow().is_in_flight()
	}

	pub fn is_source_attached(&self) -> bool {
		self.body.bridge.borrow().is_attached()
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	pub fn ptr_eq(&self, other: &Cacheable<T>) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	pub(crate) fn spawner(&self) -> Rc<dyn LocalSpawn> {
		self.body.spawner.clone()
	}
}

impl<T: Clone + 'static> CacheableBody<T> {
	pub(crate) fn spawn(&self, future: impl Future<Output = ()> + 'static) {
		if let Err(error) = self.spawner.spawn_local(future) {
			warn!(cache = self.name, %error, "unable to spawn cache task");
		}
	}

	pub(crate) fn set_resolved(&self, value: T) {
		self.slot.borrow_mut().resolve(value);
		self.publish();
	}

	pub(crate) fn set_failed(&self, error: CacheError) {
		self.slot.borrow_mut().fail(error);
		self.publish();
	}

	pub(crate) fn invalidate(&self) {
		self.coordinator.borrow_mut().note_invalidation();

		let changed = self.slot.borrow_mut().invalidate();
		if changed {
			self.publish();
		}
	}

	pub(crate) fn dispose(&self) {
		if self.disposed.replace(true) {
			return;
		}

		debug!(cache = self.name, "disposing");
		self.detach_source();
		self.observers.borrow_mut().close();

		let callbacks = std::mem::take(&mut *self.on_dispose.borrow_mut());
		for callback in callbacks {
			callback();
		}
	}

	fn publish(&self) {
		let slot = self.slot.borrow();
		let mut observers = self.observers.borrow_mut();
		trace!(cache = self.name, observers = observers.len(), "broadcast");
		observers.broadcast(&slot);
	}
}

pub(crate) fn boxed_fetch<T, F, Fut>(fetch: F) -> FetchFn<T>
where
	F: Fn() -> Fut + 'static,
	Fut: Future<Output = Result<T, CacheError>> + 'static,
{
	Rc::new(move || fetch().boxed_local())
}

impl<T> std::fmt::Debug for Cacheable<T>
where
	T: Clone + std::fmt::Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Cacheable")
			.field("name", &self.body.name)
			.field("state", &*self.body.slot.borrow())
			.field("observers", &self.observer_count())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
