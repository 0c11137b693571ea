use std::sync::Arc;

use fruition::{ContextDescriptor, Operation, OperationError};
use fruition_extra::{observer, subscribe, subscribe_with, Observer};

mod _validator;
use _validator::Validator;

struct RecordingObserver {
	v: Arc<Validator<String>>,
}

impl Observer<i32> for RecordingObserver {
	fn on_next(&self, value: &i32) {
		self.v.push(format!("next:{value}"));
	}

	fn on_error(&self, error: &OperationError) {
		self.v.push(format!("error:{error}"));
	}

	fn on_completed(&self) {
		self.v.push("completed".to_owned());
	}
}

#[derive(Debug)]
struct Failure;

impl std::fmt::Display for Failure {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("failure")
	}
}

impl std::error::Error for Failure {}

#[test]
fn success_is_next_then_completed() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	let _subscription = subscribe(
		&operation,
		ContextDescriptor::Inline,
		RecordingObserver { v: v.clone() },
	);

	v.expect([]);
	operation.try_set_result(21);
	v.expect(["next:21".to_owned(), "completed".to_owned()]);
}

#[test]
fn faults_map_to_on_error() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	let _subscription = subscribe(
		&operation,
		ContextDescriptor::Inline,
		RecordingObserver { v: v.clone() },
	);

	operation.try_set_exception(Failure);
	v.expect(["error:operation faulted: failure".to_owned()]);
}

#[test]
fn plain_cancellation_maps_to_on_completed() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	let _subscription = subscribe(
		&operation,
		ContextDescriptor::Inline,
		RecordingObserver { v: v.clone() },
	);

	operation.try_set_canceled();
	v.expect(["completed".to_owned()]);
}

#[test]
fn cancellation_with_a_carried_error_maps_to_on_error() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	let _subscription = subscribe(
		&operation,
		ContextDescriptor::Inline,
		RecordingObserver { v: v.clone() },
	);

	operation.try_set_canceled_with(Failure);
	v.expect(["error:operation was canceled".to_owned()]);
}

#[test]
fn subscribing_to_a_terminal_operation_notifies_immediately() {
	let v = Arc::new(Validator::new());
	let _subscription = subscribe(
		&Operation::from_result(3),
		ContextDescriptor::Inline,
		RecordingObserver { v: v.clone() },
	);
	v.expect(["next:3".to_owned(), "completed".to_owned()]);
}

#[test]
fn dropping_the_subscription_unsubscribes() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	drop(subscribe(
		&operation,
		ContextDescriptor::Inline,
		RecordingObserver { v: v.clone() },
	));

	operation.try_set_result(1);
	v.expect([]);
}

#[test]
fn explicit_unsubscription_works_too() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	let subscription = subscribe(
		&operation,
		ContextDescriptor::Inline,
		RecordingObserver { v: v.clone() },
	);
	subscription.unsubscribe();
	operation.try_set_result(1);
	v.expect([]);
}

#[test]
fn closure_observers_compose_the_same_way() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	let _subscription = {
		let on_next = {
			let v = v.clone();
			move |value: &i32| v.push(format!("next:{value}"))
		};
		let on_error = {
			let v = v.clone();
			move |error: &OperationError| v.push(format!("error:{error}"))
		};
		let on_completed = {
			let v = v.clone();
			move || v.push("completed".to_owned())
		};
		subscribe(
			&operation,
			ContextDescriptor::Inline,
			observer(on_next, on_error, on_completed),
		)
	};
	operation.try_set_result(2);
	v.expect(["next:2".to_owned(), "completed".to_owned()]);
}

#[test]
fn the_two_closure_shorthand_skips_the_completion_signal() {
	let operation = Operation::<i32>::new();
	let v = Arc::new(Validator::new());
	let _subscription = {
		let on_next = {
			let v = v.clone();
			move |value: &i32| v.push(format!("next:{value}"))
		};
		let on_error = {
			let v = v.clone();
			move |error: &OperationError| v.push(format!("error:{error}"))
		};
		subscribe_with(&operation, ContextDescriptor::Inline, on_next, on_error)
	};
	operation.try_set_result(4);
	v.expect(["next:4".to_owned()]);
}
