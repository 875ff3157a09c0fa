use std::cell::Cell;
use std::rc::Rc;

use revalidate::{CacheError, Evict, KeyedCache};

#[test]
fn builds_each_key_once() {
	let built = Rc::new(Cell::new(0));
	let cache = KeyedCache::new({
		let built = built.clone();
		move |key: &String, _evict: Evict<String, usize>| {
			built.set(built.get() + 1);
			Some(key.len())
		}
	});

	assert!(cache.is_empty());
	assert_eq!(cache.try_get(&"abc".to_string()), None);

	assert_eq!(cache.get(&"abc".to_string()).unwrap(), 3);
	assert_eq!(cache.get(&"abc".to_string()).unwrap(), 3);
	assert_eq!(cache.get(&"hello".to_string()).unwrap(), 5);

	assert_eq!(built.get(), 2);
	assert_eq!(cache.len(), 2);
	assert_eq!(cache.try_get(&"abc".to_string()), Some(3));
}

#[test]
fn absent_values_are_not_cached() {
	let cache = KeyedCache::new(|key: &u32, _evict: Evict<u32, u32>| (*key % 2 == 0).then(|| *key));

	let error = cache.get(&3).unwrap_err();
	assert!(matches!(error, CacheError::AbsentValue));
	assert!(cache.is_empty());

	assert_eq!(cache.get(&4).unwrap(), 4);
	assert_eq!(cache.len(), 1);
}

#[test]
fn evict_removes_its_own_key() {
	let handles = Rc::new(std::cell::RefCell::new(Vec::new()));
	let cache = KeyedCache::new({
		let handles = handles.clone();
		move |key: &u32, evict: Evict<u32, u32>| {
			handles.borrow_mut().push(evict);
			Some(*key * 10)
		}
	});

	cache.get(&1).unwrap();
	cache.get(&2).unwrap();

	let evict = handles.borrow()[0].clone();
	assert_eq!(*evict.key(), 1);
	assert!(evict.evict());
	assert!(!evict.evict());

	assert_eq!(cache.try_get(&1), None);
	assert_eq!(cache.try_get(&2), Some(20));

	// rebuilt on demand
	assert_eq!(cache.get(&1).unwrap(), 10);
	assert_eq!(handles.borrow().len(), 3);
}

#[test]
fn clear_empties_and_orphans_evictions() {
	let handles = Rc::new(std::cell::RefCell::new(Vec::new()));
	let cache = KeyedCache::new({
		let handles = handles.clone();
		move |key: &u32, evict: Evict<u32, u32>| {
			handles.borrow_mut().push(evict);
			Some(*key)
		}
	});

	cache.get(&1).unwrap();
	cache.clear();
	assert!(cache.is_empty());
	assert!(!handles.borrow()[0].evict());

	std::mem::drop(cache);
	assert!(!handles.borrow()[0].evict());
}
