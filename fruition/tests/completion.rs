use std::{sync::Arc, thread, time::Duration};

use fruition::{ContextDescriptor, Operation, OperationError, Status};

mod _validator;
use _support::Boom;
use _validator::Validator;

#[test]
fn callbacks_fire_in_registration_order_with_the_result_visible() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());

	for name in ["cb1", "cb2", "cb3"] {
		let v = v.clone();
		operation.add_completion_callback(ContextDescriptor::Inline, move |finished| {
			assert_eq!(finished.result(), Some(&42));
			v.push(name);
		});
	}

	let producer = operation.clone();
	thread::spawn(move || {
		assert!(producer.try_set_result(42));
	})
	.join()
	.unwrap();

	assert!(operation.is_completed_successfully());
	v.expect(["cb1", "cb2", "cb3"]);
}

#[test]
fn racing_producers_resolve_to_exactly_one_consistent_outcome() {
	for _ in 0..64 {
		let operation = Operation::<i32>::new();
		let (a, b) = (operation.clone(), operation.clone());
		let first = thread::spawn(move || a.try_set_result(1));
		let second = thread::spawn(move || b.try_set_exception(Boom("race")));
		let first = first.join().unwrap();
		let second = second.join().unwrap();

		assert_ne!(first, second);
		if first {
			assert_eq!(operation.status(), Status::RanToCompletion);
			assert_eq!(operation.result(), Some(&1));
			assert!(operation.exception().is_none());
		} else {
			assert_eq!(operation.status(), Status::Faulted);
			assert!(operation.result().is_none());
			assert!(operation.exception().is_some());
		}
	}
}

#[test]
fn the_first_terminal_transition_freezes_the_state() {
	let operation = Operation::<i32>::new();
	assert!(operation.try_set_result(7));

	assert!(!operation.try_set_result(8));
	assert!(!operation.try_set_exception(Boom("late")));
	assert!(!operation.try_set_canceled());
	assert!(!operation.try_set_scheduled());
	assert!(!operation.try_set_running());

	assert_eq!(operation.status(), Status::RanToCompletion);
	assert_eq!(operation.result(), Some(&7));
}

#[test]
fn the_lifecycle_upgrades_monotonically() {
	let operation = Operation::<()>::new();
	assert_eq!(operation.status(), Status::Created);
	assert!(operation.try_set_scheduled());
	assert_eq!(operation.status(), Status::Scheduled);
	assert!(!operation.try_set_scheduled());
	assert!(operation.try_set_running());
	assert_eq!(operation.status(), Status::Running);
	assert!(operation.try_set_completed());
	assert_eq!(operation.status(), Status::RanToCompletion);
}

#[test]
fn factories_are_terminal_from_birth() {
	let succeeded = Operation::from_result("done");
	assert!(succeeded.is_completed_successfully());
	assert!(succeeded.completed_synchronously());
	assert_eq!(succeeded.result(), Some(&"done"));
	assert_eq!(succeeded.progress(), 1.0);

	let faulted = Operation::<i32>::from_exception(Boom("born broken"));
	assert!(faulted.is_faulted());
	assert!(faulted.exception().is_some());

	let canceled = Operation::<i32>::from_canceled();
	assert!(canceled.is_canceled());
	assert!(canceled.exception().is_none());
}

#[test]
fn the_completed_singleton_is_shared_and_undisposable() {
	let a = Operation::completed();
	let b = Operation::completed();
	assert!(a.ptr_eq(&b));
	assert!(a.is_completed_successfully());
	a.dispose().unwrap();
	a.dispose().unwrap();
	assert!(!a.is_disposed());
}

#[test]
fn loud_producer_calls_surface_invalid_state() {
	let operation = Operation::<i32>::new();
	operation.set_result(1).unwrap();
	match operation.set_result(2) {
		Err(OperationError::InvalidState { status }) => {
			assert_eq!(status, Status::RanToCompletion);
		}
		other => panic!("expected InvalidState, got {other:?}"),
	}
}

#[test]
fn exceptions_aggregate_in_order() {
	let operation = Operation::<i32>::new();
	let faults: Vec<fruition::Fault> =
		vec![Arc::new(Boom("first")), Arc::new(Boom("second"))];
	assert!(operation.try_set_exceptions(faults));
	let stored = operation.exceptions();
	assert_eq!(stored.len(), 2);
	assert_eq!(stored[0].to_string(), "boom: first");
	assert_eq!(stored[1].to_string(), "boom: second");
	assert_eq!(operation.exception().unwrap().to_string(), "boom: first");
}

#[test]
fn an_empty_exception_list_completes_nothing() {
	let operation = Operation::<i32>::new();
	assert!(!operation.try_set_exceptions(Vec::new()));
	assert!(!operation.is_completed());
}

#[test]
fn waiting_returns_immediately_on_terminal_operations_both_times() {
	let operation = Operation::from_result(5);
	operation.wait();
	operation.wait();
	assert!(operation.wait_timeout(Duration::from_millis(1)));
}

#[test]
fn waiting_blocks_until_another_thread_completes() {
	let operation = Operation::<i32>::new();
	let producer = operation.clone();
	let worker = thread::spawn(move || {
		thread::sleep(Duration::from_millis(50));
		producer.try_set_result(9);
	});
	assert_eq!(operation.join().unwrap(), &9);
	worker.join().unwrap();
}

#[test]
fn token_gated_waits_return_when_either_side_settles() {
	let operation = Operation::<i32>::new();
	let token = Operation::<()>::new();

	let canceler = {
		let token = token.clone();
		thread::spawn(move || {
			thread::sleep(Duration::from_millis(30));
			token.try_set_completed();
		})
	};
	assert!(!operation.wait_with_cancel(&token));
	canceler.join().unwrap();

	// With a fresh token, a completing producer wins the wait.
	let token = Operation::<()>::new();
	let producer = operation.clone();
	let worker = thread::spawn(move || {
		thread::sleep(Duration::from_millis(30));
		producer.try_set_result(2);
	});
	assert!(operation.wait_with_cancel(&token));
	worker.join().unwrap();

	// Terminal operations win immediately, token or not.
	assert!(operation.wait_with_cancel(&Operation::<()>::new()));
}

#[test]
fn bounded_waits_report_timeouts() {
	let operation = Operation::<i32>::new();
	assert!(!operation.wait_timeout(Duration::from_millis(20)));
	match operation.join_timeout(Duration::from_millis(20)) {
		Err(OperationError::Timeout) => {}
		other => panic!("expected Timeout, got {other:?}"),
	}

	operation.try_set_result(3);
	assert_eq!(operation.join_timeout(Duration::from_millis(20)).unwrap(), &3);
}

#[test]
fn join_rethrows_the_stored_failure() {
	let faulted = Operation::<i32>::from_exception(Boom("stored"));
	match faulted.join() {
		Err(OperationError::Faulted { faults }) => {
			assert_eq!(faults.len(), 1);
			assert_eq!(faults[0].to_string(), "boom: stored");
		}
		other => panic!("expected Faulted, got {other:?}"),
	}

	let canceled = Operation::<i32>::from_canceled();
	match canceled.join() {
		Err(OperationError::Canceled { fault: None }) => {}
		other => panic!("expected Canceled, got {other:?}"),
	}
}

#[test]
fn completion_is_synchronous_iff_it_happens_on_the_creating_thread() {
	let inline = Operation::<i32>::new();
	inline.try_set_result(1);
	assert!(inline.completed_synchronously());

	let crossed = Operation::<i32>::new();
	let producer = crossed.clone();
	thread::spawn(move || producer.try_set_result(1))
		.join()
		.unwrap();
	assert!(!crossed.completed_synchronously());
}

#[test]
fn cancellation_is_cooperative_and_idempotent() {
	let operation = Operation::<i32>::new();
	assert!(!operation.is_cancellation_requested());
	operation.cancel();
	operation.cancel();
	assert!(operation.is_cancellation_requested());
	// Nothing observed the request yet; the operation is still live.
	assert!(!operation.is_completed());

	// The producer notices the flag and winds down.
	if operation.is_cancellation_requested() {
		assert!(operation.try_set_canceled());
	}
	assert!(operation.is_canceled());
}

#[test]
fn disposal_requires_a_terminal_operation_and_is_idempotent() {
	let operation = Operation::<i32>::new();
	match operation.dispose() {
		Err(OperationError::InvalidState { status }) => assert_eq!(status, Status::Created),
		other => panic!("expected InvalidState, got {other:?}"),
	}

	operation.try_set_result(1);
	operation.dispose().unwrap();
	operation.dispose().unwrap();
	assert!(operation.is_disposed());
	match operation.join() {
		Err(OperationError::Disposed) => {}
		other => panic!("expected Disposed, got {other:?}"),
	}
}

#[test]
fn callbacks_are_not_accepted_after_disposal() {
	let operation = Operation::from_result(1);
	operation.dispose().unwrap();
	let v = Arc::new(Validator::new());
	let handle = {
		let v = v.clone();
		operation.add_completion_callback(ContextDescriptor::Inline, move |_| v.push("fired"))
	};
	assert!(!operation.remove_callback(handle));
	v.expect([]);
}

#[test]
fn async_state_is_readable_for_the_operations_lifetime() {
	let operation = Operation::<i32>::with_async_state("request-17");
	let state = operation
		.async_state()
		.and_then(|state| state.downcast_ref::<&str>())
		.copied();
	assert_eq!(state, Some("request-17"));
	assert!(Operation::<i32>::new().async_state().is_none());
}
