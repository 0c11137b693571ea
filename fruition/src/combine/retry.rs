//! Repetition combinators: `retry` and `sequence`.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::Mutex;
use pedicel::context::ContextDescriptor;

use crate::{
	combine::{propagate_failure, run_user},
	operation::Operation,
	timer,
};

/// Repeatedly invokes `factory` until an attempt succeeds.
///
/// A failed attempt (fault or cancellation of the produced operation) waits
/// `delay`, then retries, up to `max_attempts` total attempts, where `0`
/// retries indefinitely. The final attempt's failure propagates. Cancelling
/// the retry operation cancels the in-flight attempt and stops the loop.
pub fn retry<T, F>(factory: F, delay: Duration, max_attempts: u32) -> Operation<T>
where
	T: Clone + Send + Sync + 'static,
	F: FnMut() -> Operation<T> + Send + 'static,
{
	let target = Operation::new();
	target.try_set_running();
	attempt(target.clone(), factory, delay, max_attempts, 1);
	target
}

fn attempt<T, F>(
	target: Operation<T>,
	mut factory: F,
	delay: Duration,
	max_attempts: u32,
	attempt_number: u32,
) where
	T: Clone + Send + Sync + 'static,
	F: FnMut() -> Operation<T> + Send + 'static,
{
	if target.is_completed() {
		return;
	}
	if target.is_cancellation_requested() {
		target.try_set_canceled();
		return;
	}
	let operation = match run_user(&mut factory) {
		Ok(operation) => operation,
		Err(fault) => {
			target.complete_faults(vec![fault]);
			return;
		}
	};
	{
		let operation = operation.clone();
		target.set_cancel_action(Box::new(move || operation.cancel()));
	}
	operation.add_completion_callback(ContextDescriptor::Inline, move |finished| {
		if finished.is_completed_successfully() {
			target.try_set_result(
				finished
					.result()
					.expect("unreachable: attempt succeeded")
					.clone(),
			);
			return;
		}
		if target.is_cancellation_requested() {
			target.try_set_canceled();
			return;
		}
		if max_attempts != 0 && attempt_number >= max_attempts {
			propagate_failure(&target, finished);
			return;
		}
		tracing::debug!(attempt = attempt_number, "attempt failed; retrying after delay");
		timer::schedule(delay, move || {
			attempt(target, factory, delay, max_attempts, attempt_number + 1);
		});
	});
}

struct SequenceState<T, F> {
	pending: VecDeque<F>,
	results: Vec<T>,
}

/// Runs factory-produced operations one after another, collecting their
/// results in order.
///
/// The first failure stops the run and propagates. Progress is the fraction
/// of finished steps plus the running step's own progress. Cancelling the
/// sequence cancels the running step and stops before producing the next.
pub fn sequence<T, F, I>(factories: I) -> Operation<Vec<T>>
where
	T: Clone + Send + Sync + 'static,
	F: FnOnce() -> Operation<T> + Send + 'static,
	I: IntoIterator<Item = F>,
{
	let pending: VecDeque<F> = factories.into_iter().collect();
	let total = pending.len();
	let target = Operation::new();
	if total == 0 {
		target.try_set_result(Vec::new());
		return target;
	}
	target.try_set_running();
	let state = Arc::new(Mutex::new(SequenceState {
		pending,
		results: Vec::with_capacity(total),
	}));
	step(target.clone(), state, total);
	target
}

fn step<T, F>(target: Operation<Vec<T>>, state: Arc<Mutex<SequenceState<T, F>>>, total: usize)
where
	T: Clone + Send + Sync + 'static,
	F: FnOnce() -> Operation<T> + Send + 'static,
{
	if target.is_completed() {
		return;
	}
	if target.is_cancellation_requested() {
		target.try_set_canceled();
		return;
	}
	let next = state.lock().pending.pop_front();
	let Some(factory) = next else {
		let results = core::mem::take(&mut state.lock().results);
		target.try_set_result(results);
		return;
	};
	let operation = match run_user(factory) {
		Ok(operation) => operation,
		Err(fault) => {
			target.complete_faults(vec![fault]);
			return;
		}
	};
	{
		let operation = operation.clone();
		target.set_cancel_action(Box::new(move || operation.cancel()));
	}
	{
		let target = target.clone();
		let state = state.clone();
		operation.add_progress_callback(ContextDescriptor::Inline, move |progress| {
			let finished = state.lock().results.len();
			target
				.try_set_progress((finished as f32 + progress) / total as f32)
				.ok();
		});
	}
	operation.add_completion_callback(ContextDescriptor::Inline, move |finished| {
		if finished.is_completed_successfully() {
			state.lock().results.push(
				finished
					.result()
					.expect("unreachable: step succeeded")
					.clone(),
			);
			step(target, state, total);
		} else {
			propagate_failure(&target, finished);
		}
	});
}
