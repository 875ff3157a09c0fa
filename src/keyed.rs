use std::cell::RefCell;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use fxhash::FxHashMap;
use tracing::debug;

use crate::CacheError;

type Entries<K, V> = Rc<RefCell<FxHashMap<K, V>>>;

/// Lazily built values by key.
///
/// Values are created by the factory on first access. The factory gets an
/// [`Evict`] handle it may keep to remove its value again, typically from a
/// disposal callback.
pub struct KeyedCache<K, V> {
	entries: Entries<K, V>,
	factory: Box<dyn Fn(&K, Evict<K, V>) -> Option<V>>,
}

impl<K, V> KeyedCache<K, V>
where
	K: Eq + Hash + Clone + 'static,
	V: Clone + 'static,
{
	pub fn new(factory: impl Fn(&K, Evict<K, V>) -> Option<V> + 'static) -> Self {
		KeyedCache {
			entries: Rc::new(RefCell::new(FxHashMap::default())),
			factory: Box::new(factory),
		}
	}

	pub fn try_get(&self, key: &K) -> Option<V> {
		self.entries.borrow().get(key).cloned()
	}

	/// Returns the value for `key`, building it if needed.
	///
	/// A factory that produces nothing is a usage error and leaves the
	/// cache untouched.
	pub fn get(&self, key: &K) -> Result<V, CacheError> {
		if let Some(value) = self.try_get(key) {
			return Ok(value);
		}

		let evict = Evict {
			key: key.clone(),
			entries: Rc::downgrade(&self.entries),
		};

		let value = (self.factory)(key, evict).ok_or(CacheError::AbsentValue)?;
		self.entries.borrow_mut().insert(key.clone(), value.clone());
		Ok(value)
	}

	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.borrow().is_empty()
	}

	pub fn clear(&self) {
		let entries = std::mem::take(&mut *self.entries.borrow_mut());
		debug!(entries = entries.len(), "keyed cache cleared");
		std::mem::drop(entries);
	}
}

/// Removes one key from the [`KeyedCache`] that created it.
pub struct Evict<K, V> {
	key: K,
	entries: Weak<RefCell<FxHashMap<K, V>>>,
}

impl<K: Clone, V> Clone for Evict<K, V> {
	fn clone(&self) -> Self {
		Evict {
			key: self.key.clone(),
			entries: self.entries.clone(),
		}
	}
}

impl<K: Eq + Hash, V> Evict<K, V> {
	pub fn key(&self) -> &K {
		&self.key
	}

	/// Returns whether there was something to remove.
	pub fn evict(&self) -> bool {
		let Some(entries) = self.entries.upgrade() else {
			return false;
		};

		// the value is dropped after the borrow ends
		let removed = entries.borrow_mut().remove(&self.key);
		removed.is_some()
	}
}
