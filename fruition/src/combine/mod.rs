//! Combinators: operations whose state is derived from input operations.
//!
//! Every combinator registers continuations on its inputs, forwards `cancel`
//! to whichever input is currently active, and captures user-closure panics
//! as faults of the combinator instead of letting them escape the notifying
//! stack.
//!
//! Inputs hold their combinator strongly through the registered callbacks;
//! those entries are dropped when the input's registry seals at completion,
//! which is what breaks the reference cycle between a combinator and its
//! inputs.

use std::panic::{catch_unwind, AssertUnwindSafe};

use pedicel::{context::ContextDescriptor, state::Status};

use crate::{
	error::{panic_fault, Fault},
	operation::Operation,
};

mod chain;
mod flatten;
mod retry;
mod when;

pub use chain::{ContinuationOptions, Then};
pub use retry::{retry, sequence};
pub use when::{when_all, when_any};

/// Runs a user closure, capturing a panic as a [`Fault`].
pub(crate) fn run_user<U>(f: impl FnOnce() -> U) -> Result<U, Fault> {
	catch_unwind(AssertUnwindSafe(f)).map_err(panic_fault)
}

/// Copies a terminal `source`'s failure onto `target`, preserving the failure
/// mode: fault lists stay ordered, cancellations keep their carried error.
pub(crate) fn propagate_failure<T, U>(target: &Operation<U>, source: &Operation<T>)
where
	T: Send + Sync + 'static,
	U: Send + Sync + 'static,
{
	match source.status() {
		Status::Faulted => {
			target.complete_faults(source.exceptions());
		}
		Status::Canceled => {
			target.complete_canceled(source.exception());
		}
		_ => debug_assert!(false, "failure propagation from a non-failed source"),
	}
}

/// Copies a terminal `source`'s outcome onto `target`, whatever it is.
pub(crate) fn adopt<T>(target: &Operation<T>, source: &Operation<T>)
where
	T: Clone + Send + Sync + 'static,
{
	if source.is_completed_successfully() {
		target.try_set_result(
			source
				.result()
				.expect("unreachable: source succeeded")
				.clone(),
		);
	} else {
		propagate_failure(target, source);
	}
}

/// Completes `target` from `inner` once `inner` turns terminal, forwarding
/// cancellation to `inner` in the meantime.
pub(crate) fn chain_into<U>(target: &Operation<U>, inner: &Operation<U>)
where
	U: Clone + Send + Sync + 'static,
{
	{
		let inner = inner.clone();
		target.set_cancel_action(Box::new(move || inner.cancel()));
	}
	let target = target.clone();
	inner.add_completion_callback(ContextDescriptor::Inline, move |inner| {
		adopt(&target, inner);
	});
}
