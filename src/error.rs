use std::fmt::Display;
use std::rc::Rc;

/// Everything that can go wrong while reading or feeding a [`Cacheable`](crate::Cacheable).
///
/// Fetch errors are shared between every observer of the failed state,
/// hence the `Rc` instead of a `Box`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
	#[error("fetch failed: {0}")]
	Fetch(Rc<dyn std::error::Error>),

	#[error("subscription to disposed cache")]
	Disposed,

	#[error("caching of absent values is unsupported")]
	AbsentValue,

	#[error("refresh abandoned: cache was dropped before it ran")]
	Abandoned,
}

impl CacheError {
	pub fn fetch<E: std::error::Error + 'static>(e: E) -> Self {
		CacheError::Fetch(Rc::new(e))
	}

	pub fn msg<M: Display>(message: M) -> Self {
		let boxed: Box<dyn std::error::Error> = message.to_string().into();
		CacheError::Fetch(Rc::from(boxed))
	}

	/// `true` for errors that come from misusing the cache
	/// rather than from the data source.
	pub fn is_usage(&self) -> bool {
		matches!(self, CacheError::Disposed | CacheError::AbsentValue)
	}
}
