//! Joining combinators: `when_all` and `when_any`.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pedicel::{context::ContextDescriptor, state::Status};

use crate::operation::{CallbackHandle, Operation};

/// Completes once every input is terminal.
///
/// Succeeds with the results in input order when all inputs succeeded.
/// Faults with every captured fault, aggregated in input order, when any
/// input faulted. Cancels (carrying the first cancellation's error) when no
/// input faulted but at least one was cancelled. An empty input set completes
/// immediately with an empty vector.
///
/// Progress is the arithmetic mean of the inputs' progress; cancelling the
/// joined operation forwards to every input.
pub fn when_all<T, I>(operations: I) -> Operation<Vec<T>>
where
	T: Clone + Send + Sync + 'static,
	I: IntoIterator<Item = Operation<T>>,
{
	let inputs: Arc<[Operation<T>]> = operations.into_iter().collect();
	let target = Operation::new();
	if inputs.is_empty() {
		target.try_set_result(Vec::new());
		return target;
	}
	target.try_set_running();
	{
		let inputs = inputs.clone();
		target.set_cancel_action(Box::new(move || {
			for input in inputs.iter() {
				input.cancel();
			}
		}));
	}

	let remaining = Arc::new(AtomicUsize::new(inputs.len()));
	for input in inputs.iter() {
		{
			let target = target.clone();
			let inputs = inputs.clone();
			input.add_progress_callback(ContextDescriptor::Inline, move |_| {
				let summed: f32 = inputs.iter().map(Operation::progress).sum();
				target
					.try_set_progress(summed / inputs.len() as f32)
					.ok();
			});
		}
		let target = target.clone();
		let inputs = inputs.clone();
		let remaining = remaining.clone();
		input.add_completion_callback(ContextDescriptor::Inline, move |_| {
			if remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
				return;
			}
			// Last input down; every input is terminal from here on.
			let mut faults = Vec::new();
			let mut cancellation = None;
			for input in inputs.iter() {
				match input.status() {
					Status::Faulted => faults.extend(input.exceptions()),
					Status::Canceled => {
						if cancellation.is_none() {
							cancellation = Some(input.exception());
						}
					}
					_ => {}
				}
			}
			if !faults.is_empty() {
				target.complete_faults(faults);
			} else if let Some(fault) = cancellation {
				target.complete_canceled(fault);
			} else {
				let results = inputs
					.iter()
					.map(|input| {
						input
							.result()
							.expect("unreachable: input succeeded")
							.clone()
					})
					.collect();
				target.try_set_result(results);
			}
		});
	}
	target
}

/// Completes with the first input to turn terminal, whatever its outcome.
///
/// The yielded value is the winning input itself; inspect it for the actual
/// result or failure. Progress mirrors the furthest-along input; cancelling
/// forwards to every input. An empty input set cancels immediately.
pub fn when_any<T, I>(operations: I) -> Operation<Operation<T>>
where
	T: Send + Sync + 'static,
	I: IntoIterator<Item = Operation<T>>,
{
	let inputs: Arc<[Operation<T>]> = operations.into_iter().collect();
	let target = Operation::new();
	if inputs.is_empty() {
		target.try_set_canceled();
		return target;
	}
	target.try_set_running();
	{
		let inputs = inputs.clone();
		target.set_cancel_action(Box::new(move || {
			for input in inputs.iter() {
				input.cancel();
			}
		}));
	}

	// Registrations on the losing inputs are removed once a winner lands, so
	// a long-pending loser doesn't keep the joined operation alive.
	let registrations: Arc<Mutex<Vec<(Operation<T>, CallbackHandle)>>> =
		Arc::new(Mutex::new(Vec::with_capacity(inputs.len() * 2)));

	for input in inputs.iter() {
		if target.is_completed() {
			break;
		}
		let progress_handle = {
			let target = target.clone();
			let inputs = inputs.clone();
			input.add_progress_callback(ContextDescriptor::Inline, move |_| {
				let furthest = inputs
					.iter()
					.map(Operation::progress)
					.fold(0.0_f32, f32::max);
				target.try_set_progress(furthest).ok();
			})
		};
		let completion_handle = {
			let target = target.clone();
			let registrations = registrations.clone();
			input.add_completion_callback(ContextDescriptor::Inline, move |winner| {
				if target.try_set_result(winner.clone()) {
					detach(&registrations);
				}
			})
		};
		let mut registrations = registrations.lock();
		registrations.push((input.clone(), progress_handle));
		registrations.push((input.clone(), completion_handle));
	}
	if target.is_completed() {
		// A winner landed while registrations were still being recorded.
		detach(&registrations);
	}
	target
}

fn detach<T: Send + Sync + 'static>(
	registrations: &Mutex<Vec<(Operation<T>, CallbackHandle)>>,
) {
	let detached: Vec<_> = registrations.lock().drain(..).collect();
	for (input, handle) in detached {
		input.remove_callback(handle);
	}
}
