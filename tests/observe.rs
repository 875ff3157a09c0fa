use futures::executor::LocalPool;
use futures::StreamExt;
use revalidate::{CacheError, Cached, Slot};

use crate::mock::{self, ready_items, ready_values, Gates, SharedMock, Spy};

#[test]
fn first_observer_fetches_once() {
	crate::init_logging();

	let mut pool = LocalPool::new();
	let mock = SharedMock::new();
	let gates = Gates::new();
	mock.get().expect_fetch().times(1).return_const(0u64);

	let cache = mock::gated(&pool, &mock, &gates);

	let mut first = cache.observe().unwrap();
	let mut second = cache.observe().unwrap();
	assert_eq!(cache.observer_count(), 2);

	pool.run_until_stalled();
	assert_eq!(gates.pending(), 1);
	assert!(ready_items(&mut first).is_empty());

	gates.open(Ok(42));
	pool.run_until_stalled();

	assert_eq!(ready_values(&mut first), vec![Cached::fresh(42)]);
	assert_eq!(ready_values(&mut second), vec![Cached::fresh(42)]);

	mock.get().checkpoint();
}

#[test]
fn observers_get_the_latest_value_first() {
	let mut pool = LocalPool::new();
	let mock = SharedMock::new();
	let cache = mock::immediate(&pool, &mock);

	cache.refresh_with(1);
	cache.refresh_with(2);
	cache.invalidate();

	let mut observation = cache.observe().unwrap();
	pool.run_until_stalled();

	// a cached value means no fetch, the mock has no expectation
	assert_eq!(ready_values(&mut observation), vec![Cached::stale(2)]);
}

#[test]
fn transitions_arrive_in_order() {
	let mut pool = LocalPool::new();
	let mock = SharedMock::new();
	mock.expect_counting(1);

	let cache = mock::immediate(&pool, &mock);
	let mut observation = cache.observe().unwrap();
	pool.run_until_stalled();

	cache.invalidate();
	cache.refresh_with(7);
	cache.invalidate();

	assert_eq!(
		ready_values(&mut observation),
		vec![
			Cached::fresh(1),
			Cached::stale(1),
			Cached::fresh(7),
			Cached::stale(7),
		]
	);
}

#[test]
fn failure_ends_the_observation() {
	let mut pool = LocalPool::new();
	let mock = SharedMock::new();
	let gates = Gates::new();
	mock.get().expect_fetch().times(1).return_const(0u64);

	let cache = mock::gated(&pool, &mock, &gates);
	let mut observation = cache.observe().unwrap();
	pool.run_until_stalled();

	gates.open(Err(CacheError::msg("gone")));
	pool.run_until_stalled();

	let items = ready_items(&mut observation);
	assert_eq!(items.len(), 1);
	assert!(matches!(items[0], Err(CacheError::Fetch(_))));
	assert!(futures::executor::block_on(observation.next()).is_none());
	assert!(!cache.has_observers());

	// resubscribing sees the error again without fetching
	let mut again = cache.observe().unwrap();
	pool.run_until_stalled();
	let items = ready_items(&mut again);
	assert_eq!(items.len(), 1);
	assert!(items[0].is_err());
	assert_eq!(cache.observer_count(), 0);

	mock.get().checkpoint();
}

#[test]
fn unsubscribing_does_not_dispose() {
	let mut pool = LocalPool::new();
	let mock = SharedMock::new();
	mock.expect_counting(1);

	let cache = mock::immediate(&pool, &mock);
	let observation = cache.observe().unwrap();
	pool.run_until_stalled();
	assert!(cache.has_observers());

	std::mem::drop(observation);
	assert!(!cache.has_observers());
	assert!(!cache.is_disposed());

	// the value is still there, a new observer does not fetch again
	let mut observation = cache.observe().unwrap();
	pool.run_until_stalled();
	assert_eq!(ready_values(&mut observation), vec![Cached::fresh(1)]);
}

#[test]
fn observing_a_disposed_cache_fails() {
	let pool = LocalPool::new();
	let mock = SharedMock::new();
	let cache = mock::immediate(&pool, &mock);

	cache.dispose();
	cache.dispose();

	let error = cache.observe().unwrap_err();
	assert!(matches!(error, CacheError::Disposed));
	assert!(error.is_usage());
	assert_eq!(error.to_string(), "subscription to disposed cache");
}

#[test]
fn dispose_ends_observations_and_notifies_once() {
	let mut pool = LocalPool::new();
	let mock = SharedMock::new();
	mock.get().expect_disposed().times(1).return_const(());

	let cache = mock::immediate(&pool, &mock);
	cache.refresh_with(3);

	cache.on_dispose({
		let mock = mock.clone();
		move || {
			mock.get().disposed();
		}
	});

	let mut observation = cache.observe().unwrap();
	pool.run_until_stalled();

	cache.dispose();
	cache.dispose();

	assert_eq!(ready_values(&mut observation), vec![Cached::fresh(3)]);
	assert!(futures::executor::block_on(observation.next()).is_none());
	assert!(cache.is_disposed());
	assert!(!cache.has_observers());

	// the signal was already given
	cache.on_dispose({
		let mock = mock.clone();
		move || {
			mock.get().disposed();
		}
	});
	cache.dispose();

	mock.get().checkpoint();
}

#[test]
fn state_accessors_follow_the_slot() {
	let pool = LocalPool::new();
	let mock = SharedMock::new();
	let cache = revalidate::Cacheable::builder(pool.spawner(), {
		let mock = mock.clone();
		move || {
			let value = mock.get().fetch();
			async move { Ok(value) }
		}
	})
	.name("accessors")
	.build();

	assert_eq!(cache.name(), "accessors");
	assert!(matches!(cache.state(), Slot::Empty));

	cache.refresh_with(9);
	assert!(cache.state().is_fresh());
	assert_eq!(cache.state().resolved(), Some(&Cached::fresh(9)));

	cache.refresh_with_error(CacheError::msg("bad"));
	assert!(cache.state().error().is_some());
	assert_eq!(cache.value(), None);

	assert!(format!("{:?}", cache).contains("accessors"));
}
