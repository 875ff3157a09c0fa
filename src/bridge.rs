use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::task::Poll;

use futures::future::poll_fn;
use futures::stream::LocalBoxStream;
use futures::StreamExt;
use tracing::{debug, trace};

use crate::cacheable::CacheableBody;
use crate::SourceUpdate;

pub(crate) type Feed<T> = LocalBoxStream<'static, SourceUpdate<T>>;

/// The feed is held behind a shared cell so that detaching can drop
/// it synchronously while the driver task is parked.
type Subscription<T> = Rc<RefCell<Option<Feed<T>>>>;

/// Connection between a cache and its optional push feed.
pub(crate) struct SourceBridge<T> {
	pending: Option<Feed<T>>,
	subscription: Option<Subscription<T>>,
}

impl<T> SourceBridge<T> {
	pub fn new(feed: Option<Feed<T>>) -> Self {
		SourceBridge {
			pending: feed,
			subscription: None,
		}
	}

	pub fn is_attached(&self) -> bool {
		self.subscription.is_some()
	}

	/// Moves the feed into a live subscription, once.
	fn subscribe(&mut self) -> Option<Subscription<T>> {
		let feed = self.pending.take()?;
		let subscription = Rc::new(RefCell::new(Some(feed)));
		self.subscription = Some(subscription.clone());
		Some(subscription)
	}

	/// Forgets the feed for good and hands it out to be dropped.
	pub fn unsubscribe(&mut self) -> Option<Feed<T>> {
		self.pending = None;
		let subscription = self.subscription.take()?;
		let feed = subscription.borrow_mut().take();
		feed
	}
}

impl<T: Clone + 'static> CacheableBody<T> {
	pub(crate) fn attach_source(&self) {
		let Some(subscription) = self.bridge.borrow_mut().subscribe() else {
			return;
		};

		debug!(cache = self.name, "source attached");
		self.spawn(drive(self.this.clone(), subscription));
	}

	pub(crate) fn detach_source(&self) {
		let feed = self.bridge.borrow_mut().unsubscribe();
		if feed.is_some() {
			debug!(cache = self.name, "source detached");
		}

		// dropped outside of the borrow, it may unsubscribe from another cache
		std::mem::drop(feed);
	}

	fn apply(&self, update: SourceUpdate<T>) {
		if self.observers.borrow().is_empty() {
			debug!(cache = self.name, "source update with no observers left");
			self.dispose();
			return;
		}

		match update {
			SourceUpdate::Fresh(value) => {
				trace!(cache = self.name, "source pushed a fresh value");
				self.set_resolved(value)
			}
			SourceUpdate::Stale => {
				trace!(cache = self.name, "source marked the value stale");
				self.invalidate()
			}
			SourceUpdate::Failed(error) => {
				trace!(cache = self.name, %error, "source pushed an error");
				self.set_failed(error)
			}
		}
	}
}

async fn drive<T: Clone + 'static>(this: Weak<CacheableBody<T>>, subscription: Subscription<T>) {
	loop {
		let update = poll_fn(|cx| match subscription.borrow_mut().as_mut() {
			Some(feed) => feed.poll_next_unpin(cx),
			None => Poll::Ready(None),
		})
		.await;

		let (Some(update), Some(body)) = (update, this.upgrade()) else {
			break;
		};

		body.apply(update);
	}
}
