//! Integration tests for rxbackpressure
//!
//! Exercises operator chains end to end, including chains driven from
//! several threads.

use std::time::Instant;

use rxbackpressure::prelude::*;

fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
  let start = Instant::now();
  while !done() {
    if start.elapsed() > timeout {
      return false;
    }
    std::thread::sleep(Duration::from_millis(1));
  }
  true
}

/// Every interleaving of `left` pushes and `right` pushes; `true` marks a
/// left push.
fn arrival_orders(left: usize, right: usize) -> Vec<Vec<bool>> {
  (0u32..1 << (left + right))
    .filter(|mask| mask.count_ones() as usize == left)
    .map(|mask| (0..left + right).map(|i| mask & (1 << i) != 0).collect())
    .collect()
}

/// Pushes the values in `order`, a side only after its previous push was
/// acknowledged with `Continue`. Returns `false` if `order` cannot happen.
fn push_in_order(
  left: &TestObservable<i32, ()>, right: &TestObservable<i32, ()>, left_values: &[i32],
  right_values: &[i32], order: &[bool],
) -> bool {
  let (mut left_index, mut right_index) = (0, 0);
  let (mut left_ack, mut right_ack): (Option<Ack>, Option<Ack>) = (None, None);
  for &from_left in order {
    let (source, values, index, last) = if from_left {
      (left, left_values, &mut left_index, &mut left_ack)
    } else {
      (right, right_values, &mut right_index, &mut right_ack)
    };
    if last.as_ref().is_some_and(|ack| ack.value() != Some(Outcome::Continue)) {
      return false;
    }
    *last = Some(source.on_next(values[*index]));
    *index += 1;
  }
  true
}

/// Runs `zip_by`-style pipelines over every feasible arrival order.
fn check_every_order<T: Clone + Send + PartialEq + std::fmt::Debug + 'static>(
  left_values: &[i32], right_values: &[i32], expected: &[T],
  build: impl Fn(TestObservable<i32, ()>, TestObservable<i32, ()>) -> BoxedObservable<T, ()>,
) {
  let mut feasible = 0;
  for order in arrival_orders(left_values.len(), right_values.len()) {
    let left = TestObservable::new();
    let right = TestObservable::new();
    let observer = TestObserver::auto();
    build(left.clone(), right.clone()).subscribe(
      observer.clone(),
      ImmediateScheduler,
      ImmediateScheduler,
    );
    if !push_in_order(&left, &right, left_values, right_values, &order) {
      continue;
    }
    feasible += 1;
    assert_eq!(observer.received(), expected, "order {order:?}");
    left.on_completed();
    right.on_completed();
    assert_eq!(observer.completed_count(), 1, "order {order:?}");
  }
  assert!(feasible >= 2);
}

#[test]
fn test_zip_output_is_independent_of_arrival_order() {
  check_every_order(&[1, 2, 3], &[1, 2, 3], &[(1, 1), (2, 2), (3, 3)], |left, right| {
    left.zip(right).box_it()
  });
}

#[test]
fn test_zip_by_output_is_independent_of_arrival_order() {
  check_every_order(&[10, 20, 30], &[5, 10, 30], &[(10, 10), (30, 30)], |left, right| {
    left.zip_by(right, |l: &i32, r: &i32| r < l, |l: &i32, r: &i32| r > l).box_it()
  });
}

#[test]
fn test_window_output_is_independent_of_arrival_order() {
  let left_values = [2, 3, 5];
  let right_values = [1, 2, 2, 4, 5];
  let mut feasible = 0;
  for order in arrival_orders(left_values.len(), right_values.len()) {
    let left = TestObservable::<i32, ()>::new();
    let right = TestObservable::<i32, ()>::new();
    let (left_half, right_half) =
      left.clone().window(right.clone(), |l: &i32, r: &i32| r < l, |l: &i32, r: &i32| r > l);
    let windows = TestObserver::<(i32, PublishSubject<i32, ()>), ()>::auto();
    let matches = TestObserver::<(bool, i32), ()>::auto();
    left_half.subscribe(windows.clone(), ImmediateScheduler, ImmediateScheduler);
    right_half.subscribe(matches.clone(), ImmediateScheduler, ImmediateScheduler);
    if !push_in_order(&left, &right, &left_values, &right_values, &order) {
      continue;
    }
    feasible += 1;
    let keys: Vec<_> = windows.received().into_iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec![2, 3, 5], "order {order:?}");
    assert_eq!(
      matches.received(),
      vec![(false, 1), (true, 2), (true, 2), (false, 4), (true, 5)],
      "order {order:?}"
    );
    left.on_completed();
    right.on_completed();
    assert_eq!(windows.completed_count(), 1, "order {order:?}");
    assert_eq!(matches.completed_count(), 1, "order {order:?}");
  }
  assert!(feasible >= 2);
}

#[test]
fn test_zip_holds_both_acks_until_downstream_acknowledges() {
  let left = TestObservable::<i32, ()>::new();
  let right = TestObservable::<i32, ()>::new();
  let observer = TestObserver::manual();
  left.clone().zip(right.clone()).subscribe(
    observer.clone(),
    ImmediateScheduler,
    ImmediateScheduler,
  );

  for v in [1, 2, 3] {
    let left_ack = left.on_next(v);
    assert!(!left_ack.has_value());
    let right_ack = right.on_next(v * 10);
    assert!(!left_ack.has_value() && !right_ack.has_value());

    observer.ack_next(Outcome::Continue);
    assert_eq!(left_ack.value(), Some(Outcome::Continue));
    assert_eq!(right_ack.value(), Some(Outcome::Continue));
  }
  assert_eq!(observer.received(), vec![(1, 10), (2, 20), (3, 30)]);
}

#[test]
fn test_zip_completes_exactly_once() {
  let observer = TestObserver::<(i32, char), ()>::auto();
  from_iter(vec![1, 2, 3])
    .zip(from_iter(vec!['a', 'b', 'c']))
    .subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);

  assert_eq!(observer.received(), vec![(1, 'a'), (2, 'b'), (3, 'c')]);
  assert_eq!(observer.completed_count(), 1);
}

#[test]
fn test_zip_by_skips_unmatched_keys() {
  let observer = TestObserver::<(i32, i32), ()>::auto();
  from_iter(vec![1, 3, 5, 7])
    .zip_by(from_iter(vec![1, 2, 3, 6, 7]), |l: &i32, r: &i32| r < l, |l: &i32, r: &i32| r > l)
    .subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);

  assert_eq!(observer.received(), vec![(1, 1), (3, 3), (7, 7)]);
  assert_eq!(observer.completed_count(), 1);
}

#[test]
fn test_flat_zip_pairs_each_inner_with_one_right_value() {
  let observer = TestObserver::<(i32, char), ()>::auto();
  from_iter(vec![2, 0, 1])
    .flat_zip(from_iter(vec!['a', 'b', 'c']), |n: i32| from_iter(0..n))
    .subscribe(observer.clone(), ImmediateScheduler, ImmediateScheduler);

  assert_eq!(observer.received(), vec![(0, 'a'), (1, 'a'), (0, 'c')]);
  assert_eq!(observer.completed_count(), 1);
}

#[test]
fn test_controlled_subject_bounds_memory() {
  let subject = ControlledSubject::<i32, ()>::with_capacity(2);
  let connectable = from_iter(0..5).multicast(subject.clone());
  let fast = TestObserver::auto();
  let slow = TestObserver::manual();
  connectable.subscribe(fast.clone(), ImmediateScheduler, ImmediateScheduler);
  connectable.subscribe(slow.clone(), ImmediateScheduler, ImmediateScheduler);
  connectable.connect(ImmediateScheduler, ImmediateScheduler);

  while slow.ack_next(Outcome::Continue) {
    assert!(subject.buffered_len() <= 2);
  }
  assert_eq!(fast.received(), vec![0, 1, 2, 3, 4]);
  assert_eq!(slow.received(), vec![0, 1, 2, 3, 4]);
  assert!(fast.is_completed() && slow.is_completed());
  assert_eq!(subject.buffered_len(), 0);
}

#[test]
fn test_ref_count_shares_one_execution() {
  let source = TestObservable::<i32, ()>::new();
  let shared = source.clone().publish().ref_count();
  let first = TestObserver::auto();
  let second = TestObserver::auto();
  let mut a = shared.subscribe(first.clone(), ImmediateScheduler, ImmediateScheduler);
  let mut b = shared.subscribe(second.clone(), ImmediateScheduler, ImmediateScheduler);

  source.on_next(1);
  a.unsubscribe();
  source.on_next(2);
  assert_eq!(first.received(), vec![1]);
  assert_eq!(second.received(), vec![1, 2]);

  b.unsubscribe();
  assert!(!source.is_subscribed());
}

#[cfg(feature = "futures-scheduler")]
#[test]
fn test_zip_across_threads() {
  let pool = thread_pool().unwrap();
  let observer = TestObserver::<(i32, i32), ()>::auto();
  let _guard = from_iter(0..1000)
    .observe_on(pool.clone())
    .zip(from_iter(0..1000).observe_on(pool.clone()))
    .subscribe(observer.clone(), pool.clone(), pool)
    .unsubscribe_when_dropped();

  assert!(wait_until(Duration::from_secs(10), || observer.is_completed()));
  let expected: Vec<_> = (0..1000).map(|v| (v, v)).collect();
  assert_eq!(observer.received(), expected);
  assert_eq!(observer.completed_count(), 1);
}

#[cfg(feature = "futures-scheduler")]
#[test]
fn test_controlled_subject_across_threads() {
  let pool = thread_pool().unwrap();
  let subject = ControlledSubject::<i32, ()>::with_capacity(4);
  let connectable = from_iter(0..500).multicast(subject.clone());
  let observers: Vec<_> = (0..3).map(|_| TestObserver::<i32, ()>::auto()).collect();
  for observer in &observers {
    connectable.clone().observe_on(pool.clone()).subscribe(
      observer.clone(),
      pool.clone(),
      ImmediateScheduler,
    );
  }
  connectable.connect(pool.clone(), pool);

  for observer in &observers {
    assert!(wait_until(Duration::from_secs(10), || observer.is_completed()));
    assert_eq!(observer.received(), (0..500).collect::<Vec<_>>());
  }
}

#[cfg(feature = "tokio-scheduler")]
#[tokio::test(flavor = "multi_thread")]
async fn test_ack_resolves_on_tokio() {
  let source = TestObservable::<i32, ()>::new();
  let observer = TestObserver::auto();
  source.clone().observe_on(tokio::runtime::Handle::current()).subscribe(
    observer.clone(),
    ImmediateScheduler,
    ImmediateScheduler,
  );

  for v in 0..10 {
    assert_eq!(source.on_next(v).await, Outcome::Continue);
  }
  assert_eq!(observer.received(), (0..10).collect::<Vec<_>>());
}
