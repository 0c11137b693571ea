use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use fruition::{retry, sequence, Operation};

use _support::{eventually, Boom};

#[test]
fn retry_passes_a_first_time_success_through() {
	let attempts = Arc::new(AtomicUsize::new(0));
	let retried = {
		let attempts = attempts.clone();
		retry(
			move || {
				attempts.fetch_add(1, Ordering::Relaxed);
				Operation::from_result(5)
			},
			Duration::from_millis(1),
			0,
		)
	};
	assert_eq!(retried.result(), Some(&5));
	assert_eq!(attempts.load(Ordering::Relaxed), 1);
}

#[test]
fn retry_retries_until_an_attempt_succeeds() {
	let attempts = Arc::new(AtomicUsize::new(0));
	let retried = {
		let attempts = attempts.clone();
		retry(
			move || {
				if attempts.fetch_add(1, Ordering::Relaxed) < 2 {
					Operation::from_exception(Boom("flaky"))
				} else {
					Operation::from_result(5)
				}
			},
			Duration::from_millis(1),
			0,
		)
	};
	retried.wait();
	assert_eq!(retried.result(), Some(&5));
	assert_eq!(attempts.load(Ordering::Relaxed), 3);
}

#[test]
fn retry_capped_at_one_attempt_runs_at_most_once() {
	let attempts = Arc::new(AtomicUsize::new(0));
	let retried = {
		let attempts = attempts.clone();
		retry(
			move || {
				attempts.fetch_add(1, Ordering::Relaxed);
				Operation::<i32>::from_exception(Boom("always"))
			},
			Duration::from_millis(1),
			1,
		)
	};
	retried.wait();
	assert!(retried.is_faulted());
	assert_eq!(attempts.load(Ordering::Relaxed), 1);
}

#[test]
fn retry_exhausts_its_attempts_then_propagates_the_last_failure() {
	let attempts = Arc::new(AtomicUsize::new(0));
	let retried = {
		let attempts = attempts.clone();
		retry(
			move || {
				attempts.fetch_add(1, Ordering::Relaxed);
				Operation::<i32>::from_exception(Boom("always"))
			},
			Duration::from_millis(1),
			3,
		)
	};
	retried.wait();
	assert!(retried.is_faulted());
	assert_eq!(retried.exception().unwrap().to_string(), "boom: always");
	assert_eq!(attempts.load(Ordering::Relaxed), 3);
}

#[test]
fn retry_faults_on_a_panicking_factory() {
	let retried: Operation<i32> = retry(
		|| panic!("factory bug"),
		Duration::from_millis(1),
		0,
	);
	retried.wait();
	assert!(retried.is_faulted());
}

#[test]
fn cancelling_a_retry_reaches_the_in_flight_attempt() {
	let in_flight = Operation::<i32>::new();
	let retried = {
		let in_flight = in_flight.clone();
		retry(move || in_flight.clone(), Duration::from_millis(1), 0)
	};
	retried.cancel();
	assert!(in_flight.is_cancellation_requested());

	in_flight.try_set_canceled();
	eventually(|| retried.is_canceled());
}

#[test]
fn sequence_runs_its_steps_in_order() {
	let started = Arc::new(AtomicUsize::new(0));
	let steps: Vec<_> = (0..3)
		.map(|index| {
			let started = started.clone();
			move || {
				assert_eq!(started.fetch_add(1, Ordering::Relaxed), index);
				Operation::from_result(index as i32)
			}
		})
		.collect();
	let sequenced = sequence(steps);
	assert_eq!(sequenced.result(), Some(&vec![0, 1, 2]));
}

#[test]
fn sequence_waits_for_each_step_before_producing_the_next() {
	let gate = Operation::<i32>::new();
	let produced_second = Arc::new(AtomicUsize::new(0));
	let sequenced = {
		let gate = gate.clone();
		let produced_second = produced_second.clone();
		sequence(vec![
			Box::new(move || gate) as Box<dyn FnOnce() -> Operation<i32> + Send>,
			Box::new(move || {
				produced_second.fetch_add(1, Ordering::Relaxed);
				Operation::from_result(2)
			}),
		])
	};
	assert!(!sequenced.is_completed());
	assert_eq!(produced_second.load(Ordering::Relaxed), 0);

	gate.try_set_result(1);
	assert_eq!(produced_second.load(Ordering::Relaxed), 1);
	assert_eq!(sequenced.result(), Some(&vec![1, 2]));
}

#[test]
fn sequence_stops_at_the_first_failure() {
	let produced_third = Arc::new(AtomicUsize::new(0));
	let sequenced = {
		let produced_third = produced_third.clone();
		sequence(vec![
			Box::new(|| Operation::from_result(1))
				as Box<dyn FnOnce() -> Operation<i32> + Send>,
			Box::new(|| Operation::from_exception(Boom("step two"))),
			Box::new(move || {
				produced_third.fetch_add(1, Ordering::Relaxed);
				Operation::from_result(3)
			}),
		])
	};
	assert!(sequenced.is_faulted());
	assert_eq!(produced_third.load(Ordering::Relaxed), 0);
}

#[test]
fn sequence_progress_counts_finished_steps_and_the_running_one() {
	let first = Operation::<i32>::new();
	let second = Operation::<i32>::new();
	let sequenced = {
		let (first, second) = (first.clone(), second.clone());
		sequence(vec![
			Box::new(move || first) as Box<dyn FnOnce() -> Operation<i32> + Send>,
			Box::new(move || second),
		])
	};

	first.try_set_progress(0.5).unwrap();
	assert!((sequenced.progress() - 0.25).abs() < 1e-6);

	first.try_set_result(1);
	assert!((sequenced.progress() - 0.5).abs() < 1e-6);

	second.try_set_progress(0.5).unwrap();
	assert!((sequenced.progress() - 0.75).abs() < 1e-6);

	second.try_set_result(2);
	assert_eq!(sequenced.progress(), 1.0);
}

#[test]
fn an_empty_sequence_completes_immediately() {
	let sequenced = sequence(Vec::<Box<dyn FnOnce() -> Operation<i32> + Send>>::new());
	assert!(sequenced.is_completed_successfully());
	assert_eq!(sequenced.result(), Some(&Vec::new()));
}

#[test]
fn cancelling_a_sequence_stops_before_the_next_step() {
	let first = Operation::<i32>::new();
	let produced_second = Arc::new(AtomicUsize::new(0));
	let sequenced = {
		let first = first.clone();
		let produced_second = produced_second.clone();
		sequence(vec![
			Box::new(move || first) as Box<dyn FnOnce() -> Operation<i32> + Send>,
			Box::new(move || {
				produced_second.fetch_add(1, Ordering::Relaxed);
				Operation::from_result(2)
			}),
		])
	};

	sequenced.cancel();
	assert!(first.is_cancellation_requested());
	first.try_set_canceled();
	assert!(sequenced.is_canceled());
	assert_eq!(produced_second.load(Ordering::Relaxed), 0);
}
