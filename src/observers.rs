use std::cell::RefCell;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::{FusedStream, Stream, StreamExt};
use smallvec::SmallVec;

use crate::{CacheError, Cached, Slot};

type Delivery<T> = Result<Cached<T>, CacheError>;

/// The subscribers of a single cache, in subscription order.
pub(crate) struct Observers<T> {
	next_id: u64,
	list: SmallVec<[(u64, UnboundedSender<Delivery<T>>); 2]>,
}

impl<T> Default for Observers<T> {
	fn default() -> Self {
		Observers {
			next_id: 0,
			list: SmallVec::new(),
		}
	}
}

impl<T: Clone> Observers<T> {
	pub fn len(&self) -> usize {
		self.list.len()
	}

	pub fn is_empty(&self) -> bool {
		self.list.is_empty()
	}

	fn add(&mut self) -> (u64, UnboundedReceiver<Delivery<T>>) {
		let (tx, rx) = unbounded();
		let id = self.next_id;
		self.next_id += 1;
		self.list.push((id, tx));
		(id, rx)
	}

	pub fn remove(&mut self, id: u64) -> bool {
		let before = self.list.len();
		self.list.retain(|(it, _)| *it != id);
		before != self.list.len()
	}

	/// Sends the slot to every observer. A failed slot terminates
	/// every subscription, so the list is emptied afterwards.
	pub fn broadcast(&mut self, slot: &Slot<T>) {
		match slot {
			Slot::Empty => {}
			Slot::Resolved(cached) => {
				self.list
					.retain(|(_, tx)| tx.unbounded_send(Ok(cached.clone())).is_ok());
			}
			Slot::Failed(error) => {
				for (_, tx) in self.list.drain(..) {
					let _ = tx.unbounded_send(Err(error.clone()));
				}
			}
		}
	}

	/// Sends the slot to a single, freshly added observer. A failed slot
	/// terminates it right away.
	fn replay(&mut self, id: u64, slot: &Slot<T>) {
		let Some(index) = self.list.iter().position(|(it, _)| *it == id) else {
			return;
		};

		match slot {
			Slot::Empty => {}
			Slot::Resolved(cached) => {
				let _ = self.list[index].1.unbounded_send(Ok(cached.clone()));
			}
			Slot::Failed(error) => {
				let (_, tx) = self.list.remove(index);
				let _ = tx.unbounded_send(Err(error.clone()));
			}
		}
	}

	/// Drops every sender, which completes every open observation.
	pub fn close(&mut self) {
		self.list.clear();
	}
}

/// Registers a new observer and replays `slot` to it.
pub(crate) fn subscribe<T: Clone>(
	observers: &Rc<RefCell<Observers<T>>>,
	slot: &Slot<T>,
) -> Observation<T> {
	let mut list = observers.borrow_mut();
	let (id, receiver) = list.add();
	list.replay(id, slot);

	Observation {
		id,
		receiver,
		observers: Rc::downgrade(observers),
		done: false,
	}
}

/// A live stream of the snapshots of a [`Cacheable`](crate::Cacheable).
///
/// The stream yields the current value first (if there is one) and every
/// later transition in order. A failed fetch is delivered as a single `Err`
/// after which the stream is over. Dropping the observation unsubscribes.
pub struct Observation<T: Clone> {
	id: u64,
	receiver: UnboundedReceiver<Delivery<T>>,
	observers: Weak<RefCell<Observers<T>>>,
	done: bool,
}

impl<T: Clone> Stream for Observation<T> {
	type Item = Delivery<T>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if self.done {
			return Poll::Ready(None);
		}

		let item = futures::ready!(self.receiver.poll_next_unpin(cx));
		match &item {
			None | Some(Err(_)) => self.done = true,
			Some(Ok(_)) => {}
		}

		Poll::Ready(item)
	}
}

impl<T: Clone> FusedStream for Observation<T> {
	fn is_terminated(&self) -> bool {
		self.done
	}
}

impl<T: Clone> Drop for Observation<T> {
	fn drop(&mut self) {
		if let Some(observers) = self.observers.upgrade() {
			if let Ok(mut observers) = observers.try_borrow_mut() {
				observers.remove(self.id);
			}
		}
	}
}

impl<T: Clone> std::fmt::Debug for Observation<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Observation")
			.field("id", &self.id)
			.field("done", &self.done)
			.finish()
	}
}
