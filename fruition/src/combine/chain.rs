//! Sequential composition: `continue_with`, `then`, `catch`, `finally`,
//! `rebind`.

use std::{
	error::Error,
	fmt::{self, Debug, Formatter},
	ops::{BitOr, BitOrAssign},
};

use pedicel::{context::ContextDescriptor, state::Status};

use crate::{
	combine::{adopt, chain_into, propagate_failure, run_user},
	error::OperationError,
	operation::Operation,
};

/// Selects which outcomes of an input trigger its continuation, and where the
/// continuation runs.
///
/// Flags combine with `|`. When every triggering outcome is excluded for the
/// outcome that actually happened, the continuation transitions to
/// `Canceled` instead of running.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuationOptions(u32);

impl ContinuationOptions {
	/// Trigger on every outcome, run on the captured context.
	pub const NONE: Self = Self(0);
	/// Don't trigger when the input succeeded.
	pub const NOT_ON_RAN_TO_COMPLETION: Self = Self(1);
	/// Don't trigger when the input faulted.
	pub const NOT_ON_FAULTED: Self = Self(2);
	/// Don't trigger when the input was cancelled.
	pub const NOT_ON_CANCELED: Self = Self(4);
	/// Run the continuation inline on the completing thread.
	pub const EXECUTE_SYNCHRONOUSLY: Self = Self(8);
	/// Run the continuation on the context captured at registration. This is
	/// also the behavior when no execution flag is set.
	pub const EXECUTE_ON_CAPTURED_CONTEXT: Self = Self(16);
	/// Run the continuation on the shared worker pool.
	pub const EXECUTE_ON_DEFAULT_CONTEXT: Self = Self(32);

	/// Trigger only when the input succeeded.
	pub const ONLY_ON_RAN_TO_COMPLETION: Self = Self(2 | 4);
	/// Trigger only when the input faulted.
	pub const ONLY_ON_FAULTED: Self = Self(1 | 4);
	/// Trigger only when the input was cancelled.
	pub const ONLY_ON_CANCELED: Self = Self(1 | 2);

	/// Whether every flag of `other` is set in `self`.
	#[must_use]
	pub fn contains(self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}

	fn triggers(self, status: Status) -> bool {
		match status {
			Status::RanToCompletion => !self.contains(Self::NOT_ON_RAN_TO_COMPLETION),
			Status::Faulted => !self.contains(Self::NOT_ON_FAULTED),
			Status::Canceled => !self.contains(Self::NOT_ON_CANCELED),
			Status::Created | Status::Scheduled | Status::Running => false,
		}
	}

	fn context(self) -> ContextDescriptor {
		if self.contains(Self::EXECUTE_SYNCHRONOUSLY) {
			ContextDescriptor::Inline
		} else if self.contains(Self::EXECUTE_ON_DEFAULT_CONTEXT) {
			ContextDescriptor::Default
		} else {
			ContextDescriptor::Captured
		}
	}
}

impl BitOr for ContinuationOptions {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self {
		Self(self.0 | rhs.0)
	}
}

impl BitOrAssign for ContinuationOptions {
	fn bitor_assign(&mut self, rhs: Self) {
		self.0 |= rhs.0;
	}
}

impl Debug for ContinuationOptions {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "ContinuationOptions({:#b})", self.0)
	}
}

/// What a `then`-style handler resolves to: a ready value, or another
/// operation to chain onto.
pub enum Then<U> {
	/// Complete with this value.
	Value(U),
	/// Adopt the outcome of this operation once it turns terminal.
	Chain(Operation<U>),
}

impl<U> Then<U> {
	/// Complete with `value`.
	pub fn value(value: U) -> Self {
		Then::Value(value)
	}

	/// Adopt `operation`'s eventual outcome.
	pub fn chain(operation: Operation<U>) -> Self {
		Then::Chain(operation)
	}
}

impl Then<()> {
	/// Complete without a value.
	#[must_use]
	pub fn done() -> Self {
		Then::Value(())
	}
}

impl<U> From<Operation<U>> for Then<U> {
	fn from(operation: Operation<U>) -> Self {
		Then::Chain(operation)
	}
}

impl<T: Send + Sync + 'static> Operation<T> {
	/// Derives an operation from `continuation`, run once `self` turns
	/// terminal, on the context and for the outcomes `options` selects.
	///
	/// A disqualified outcome cancels the derived operation; a panicking
	/// `continuation` faults it. Cancelling the derived operation forwards to
	/// `self`.
	pub fn continue_with<U: Send + Sync + 'static>(
		&self,
		options: ContinuationOptions,
		continuation: impl FnOnce(&Operation<T>) -> U + Send + 'static,
	) -> Operation<U> {
		let target = Operation::new();
		target.try_set_running();
		{
			let input = self.clone();
			target.set_cancel_action(Box::new(move || input.cancel()));
		}
		let derived = target.clone();
		self.add_completion_callback(options.context(), move |input| {
			if !options.triggers(input.status()) {
				derived.try_set_canceled();
				return;
			}
			match run_user(|| continuation(input)) {
				Ok(value) => {
					derived.try_set_result(value);
				}
				Err(fault) => {
					derived.complete_faults(vec![fault]);
				}
			}
		});
		target
	}

	/// Chains `on_success` onto a successful `self`; failures propagate
	/// unchanged.
	///
	/// `on_success` resolves to a [`Then`]: a ready value, or another
	/// operation whose outcome the derived operation adopts. A panicking
	/// handler faults the derived operation.
	pub fn then<U: Clone + Send + Sync + 'static>(
		&self,
		on_success: impl FnOnce(&T) -> Then<U> + Send + 'static,
	) -> Operation<U> {
		let target = Operation::new();
		target.try_set_running();
		{
			let input = self.clone();
			target.set_cancel_action(Box::new(move || input.cancel()));
		}
		let derived = target.clone();
		self.add_completion_callback(ContextDescriptor::Inline, move |input| {
			if input.is_completed_successfully() {
				let value = input.result().expect("unreachable: input succeeded");
				resolve(&derived, run_user(|| on_success(value)));
			} else {
				propagate_failure(&derived, input);
			}
		});
		target
	}

	/// Like [`then`](`Operation::then`), with a recovery handler for failed
	/// inputs.
	///
	/// On a fault or cancellation of `self`, `on_error` runs with the failure
	/// and its resolution becomes the derived operation's outcome; a
	/// panicking handler faults it.
	pub fn then_or_else<U: Clone + Send + Sync + 'static>(
		&self,
		on_success: impl FnOnce(&T) -> Then<U> + Send + 'static,
		on_error: impl FnOnce(&OperationError) -> Then<U> + Send + 'static,
	) -> Operation<U> {
		let target = Operation::new();
		target.try_set_running();
		{
			let input = self.clone();
			target.set_cancel_action(Box::new(move || input.cancel()));
		}
		let derived = target.clone();
		self.add_completion_callback(ContextDescriptor::Inline, move |input| {
			if input.is_completed_successfully() {
				let value = input.result().expect("unreachable: input succeeded");
				resolve(&derived, run_user(|| on_success(value)));
			} else {
				let error = input.failure().expect("unreachable: input failed");
				resolve(&derived, run_user(|| on_error(&error)));
			}
		});
		target
	}

	/// Transforms the successful result; failures propagate unchanged.
	///
	/// A panicking `mapper` faults the derived operation.
	pub fn rebind<U: Send + Sync + 'static>(
		&self,
		mapper: impl FnOnce(&T) -> U + Send + 'static,
	) -> Operation<U> {
		let target = Operation::new();
		target.try_set_running();
		{
			let input = self.clone();
			target.set_cancel_action(Box::new(move || input.cancel()));
		}
		let derived = target.clone();
		self.add_completion_callback(ContextDescriptor::Inline, move |input| {
			if input.is_completed_successfully() {
				let value = input.result().expect("unreachable: input succeeded");
				match run_user(|| mapper(value)) {
					Ok(mapped) => {
						derived.try_set_result(mapped);
					}
					Err(fault) => {
						derived.complete_faults(vec![fault]);
					}
				}
			} else {
				propagate_failure(&derived, input);
			}
		});
		target
	}
}

impl<T: Clone + Send + Sync + 'static> Operation<T> {
	/// Recovers from faults of type `E`; everything else propagates
	/// unchanged.
	///
	/// The handler fires on the first captured fault that is an `E`,
	/// resolving the derived operation. Success, cancellation and faults of
	/// other types propagate as-is.
	pub fn catch<E>(
		&self,
		handler: impl FnOnce(&E) -> Then<T> + Send + 'static,
	) -> Operation<T>
	where
		E: Error + Send + Sync + 'static,
	{
		let target = Operation::new();
		target.try_set_running();
		{
			let input = self.clone();
			target.set_cancel_action(Box::new(move || input.cancel()));
		}
		let derived = target.clone();
		self.add_completion_callback(ContextDescriptor::Inline, move |input| {
			if input.is_faulted() {
				let faults = input.exceptions();
				if let Some(error) = faults.iter().find_map(|fault| fault.downcast_ref::<E>())
				{
					resolve(&derived, run_user(|| handler(error)));
					return;
				}
			}
			adopt(&derived, input);
		});
		target
	}

	/// Runs `action` once `self` turns terminal, whatever the outcome.
	///
	/// A panicking `action` faults the derived operation, composing with the
	/// input's own faults (the action's fault is appended) when the input had
	/// already failed.
	pub fn finally(&self, action: impl FnOnce() + Send + 'static) -> Operation<T> {
		let target = Operation::new();
		target.try_set_running();
		{
			let input = self.clone();
			target.set_cancel_action(Box::new(move || input.cancel()));
		}
		let derived = target.clone();
		self.add_completion_callback(ContextDescriptor::Inline, move |input| {
			match run_user(action) {
				Ok(()) => adopt(&derived, input),
				Err(fault) => {
					let mut faults = input.exceptions();
					faults.push(fault);
					derived.complete_faults(faults);
				}
			}
		});
		target
	}
}

fn resolve<U: Clone + Send + Sync + 'static>(
	target: &Operation<U>,
	resolution: Result<Then<U>, crate::error::Fault>,
) {
	match resolution {
		Ok(Then::Value(value)) => {
			target.try_set_result(value);
		}
		Ok(Then::Chain(inner)) => chain_into(target, &inner),
		Err(fault) => {
			target.complete_faults(vec![fault]);
		}
	}
}
