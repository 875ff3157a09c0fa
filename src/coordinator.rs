use std::future::Future;
use std::pin::Pin;
use std::rc::Weak;
use std::task::{Context, Poll};

use futures::future::{LocalBoxFuture, Shared};
use futures::FutureExt;
use tracing::debug;

use crate::cacheable::CacheableBody;
use crate::CacheError;

/// The pending result of [`Cacheable::refresh`](crate::Cacheable::refresh).
///
/// Every caller coalesced onto the same fetch holds a clone of the same
/// future. The fetch runs on the cache's spawner, so dropping a `Refresh`
/// never cancels it.
pub struct Refresh<T: Clone> {
	inner: Shared<LocalBoxFuture<'static, Result<T, CacheError>>>,
}

impl<T: Clone> Clone for Refresh<T> {
	fn clone(&self) -> Self {
		Refresh {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Clone + 'static> Refresh<T> {
	fn new(future: impl Future<Output = Result<T, CacheError>> + 'static) -> Self {
		Refresh {
			inner: future.boxed_local().shared(),
		}
	}

	/// `true` when both handles wait for the very same fetch.
	pub fn ptr_eq(&self, other: &Refresh<T>) -> bool {
		Shared::ptr_eq(&self.inner, &other.inner)
	}
}

impl<T: Clone> Future for Refresh<T> {
	type Output = Result<T, CacheError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.inner.poll_unpin(cx)
	}
}

impl<T: Clone> std::fmt::Debug for Refresh<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Refresh")
			.field("done", &self.inner.peek().is_some())
			.finish()
	}
}

/// What a `refresh()` call has to do, given the current flight.
pub(crate) enum Plan<T: Clone> {
	/// Nothing runs: start a fetch right away.
	Start,
	/// A fetch runs but nothing waits behind it: queue one after it.
	Queue(Refresh<T>),
	/// A refresh is already queued: share it.
	Join(Refresh<T>),
}

/// Bookkeeping for the one fetch in flight and the one refresh queued behind it.
pub(crate) struct Coordinator<T: Clone> {
	in_flight: Option<Refresh<T>>,
	queued: Option<Refresh<T>>,
	invalidated_during_flight: bool,
}

impl<T: Clone> Default for Coordinator<T> {
	fn default() -> Self {
		Coordinator {
			in_flight: None,
			queued: None,
			invalidated_during_flight: false,
		}
	}
}

impl<T: Clone> Coordinator<T> {
	pub fn plan(&self) -> Plan<T> {
		match (&self.in_flight, &self.queued) {
			(_, Some(queued)) => Plan::Join(queued.clone()),
			(Some(in_flight), None) => Plan::Queue(in_flight.clone()),
			(None, None) => Plan::Start,
		}
	}

	pub fn is_in_flight(&self) -> bool {
		self.in_flight.is_some()
	}

	fn start(&mut self, refresh: Refresh<T>) {
		debug_assert!(self.in_flight.is_none());
		self.in_flight = Some(refresh);
	}

	fn enqueue(&mut self, refresh: Refresh<T>) {
		debug_assert!(self.queued.is_none());
		self.queued = Some(refresh);
	}

	/// The queued refresh got its turn and becomes the flight.
	fn promote(&mut self) {
		self.in_flight = self.queued.take();
	}

	fn begin_fetch(&mut self) {
		self.invalidated_during_flight = false;
	}

	/// Records an invalidation. Only matters while a fetch is running.
	pub fn note_invalidation(&mut self) {
		if self.in_flight.is_some() {
			self.invalidated_during_flight = true;
		}
	}

	/// Ends the flight. Returns whether the landed value must be re-staled.
	fn land(&mut self) -> bool {
		self.in_flight = None;
		std::mem::replace(&mut self.invalidated_during_flight, false)
	}
}

impl<T: Clone + 'static> CacheableBody<T> {
	pub(crate) fn refresh(&self) -> Refresh<T> {
		let plan = self.coordinator.borrow().plan();
		match plan {
			Plan::Join(queued) => queued,
			Plan::Start => {
				let refresh = Refresh::new(fetch_turn(self.this.clone()));
				self.coordinator.borrow_mut().start(refresh.clone());
				self.spawn(refresh.clone().map(|_| ()));
				refresh
			}
			Plan::Queue(in_flight) => {
				let this = self.this.clone();
				let refresh = Refresh::new(async move {
					// the predecessor's outcome does not matter, only its end
					let _ = in_flight.await;

					let Some(body) = this.upgrade() else {
						return Err(CacheError::Abandoned);
					};
					body.coordinator.borrow_mut().promote();
					std::mem::drop(body);

					fetch_turn(this).await
				});

				debug!(cache = self.name, "refresh queued behind the running fetch");
				self.coordinator.borrow_mut().enqueue(refresh.clone());
				self.spawn(refresh.clone().map(|_| ()));
				refresh
			}
		}
	}

	fn land(&self, result: &Result<T, CacheError>) {
		let invalidated = self.coordinator.borrow_mut().land();

		match result {
			Ok(value) => {
				debug!(cache = self.name, invalidated, "fetch landed");
				self.set_resolved(value.clone());
			}
			Err(error) => {
				debug!(cache = self.name, %error, "fetch failed");
				self.set_failed(error.clone());
			}
		}

		if invalidated {
			self.invalidate();
		}
	}
}

/// Runs one invocation of the fetch function and writes its outcome to the slot.
async fn fetch_turn<T: Clone + 'static>(this: Weak<CacheableBody<T>>) -> Result<T, CacheError> {
	let fetch = {
		let Some(body) = this.upgrade() else {
			return Err(CacheError::Abandoned);
		};

		body.coordinator.borrow_mut().begin_fetch();
		debug!(cache = body.name, "fetching");
		(body.fetch)()
	};

	let result = fetch.await;

	if let Some(body) = this.upgrade() {
		body.land(&result);
	}

	result
}
