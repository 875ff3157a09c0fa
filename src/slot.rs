use crate::CacheError;

/// A resolved value together with its freshness bit.
///
/// This is what observers of a [`Cacheable`](crate::Cacheable) receive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cached<T> {
	pub value: T,
	pub fresh: bool,
}

impl<T> Cached<T> {
	pub fn fresh(value: T) -> Self {
		Cached { value, fresh: true }
	}

	pub fn stale(value: T) -> Self {
		Cached {
			value,
			fresh: false,
		}
	}

	pub fn into_value(self) -> T {
		self.value
	}
}

/// The single piece of cached state owned by a [`Cacheable`](crate::Cacheable).
#[derive(Debug, Clone)]
pub enum Slot<T> {
	Empty,
	Resolved(Cached<T>),
	Failed(CacheError),
}

impl<T> Default for Slot<T> {
	fn default() -> Self {
		Slot::Empty
	}
}

impl<T> Slot<T> {
	pub fn is_empty(&self) -> bool {
		matches!(self, Slot::Empty)
	}

	pub fn is_fresh(&self) -> bool {
		matches!(self, Slot::Resolved(Cached { fresh: true, .. }))
	}

	pub fn resolved(&self) -> Option<&Cached<T>> {
		match self {
			Slot::Resolved(cached) => Some(cached),
			_ => None,
		}
	}

	pub fn error(&self) -> Option<&CacheError> {
		match self {
			Slot::Failed(error) => Some(error),
			_ => None,
		}
	}

	/// Marks the value stale. Returns whether observers have to be told,
	/// which is the case for every state except `Empty`.
	pub(crate) fn invalidate(&mut self) -> bool {
		match self {
			Slot::Empty => false,
			Slot::Resolved(cached) => {
				cached.fresh = false;
				true
			}
			Slot::Failed(_) => true,
		}
	}

	pub(crate) fn resolve(&mut self, value: T) {
		*self = Slot::Resolved(Cached::fresh(value));
	}

	pub(crate) fn fail(&mut self, error: CacheError) {
		*self = Slot::Failed(error);
	}
}
