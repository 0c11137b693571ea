//! Unwrapping a nested operation.

use pedicel::context::ContextDescriptor;

use crate::{
	combine::{adopt, propagate_failure},
	operation::Operation,
};

impl<T: Clone + Send + Sync + 'static> Operation<Operation<T>> {
	/// Collapses an operation-of-an-operation into one operation.
	///
	/// Waits for the outer stage, then for the inner one it yielded; either
	/// stage's failure propagates unchanged. The outer stage contributes the
	/// first half of the reported progress, the inner one the second half.
	/// Cancellation forwards to whichever stage is active.
	#[must_use]
	pub fn flatten(&self) -> Operation<T> {
		let target = Operation::new();
		target.try_set_running();
		{
			let outer = self.clone();
			target.set_cancel_action(Box::new(move || outer.cancel()));
		}
		{
			let target = target.clone();
			self.add_progress_callback(ContextDescriptor::Inline, move |progress| {
				target.try_set_progress(progress * 0.5).ok();
			});
		}
		let derived = target.clone();
		self.add_completion_callback(ContextDescriptor::Inline, move |outer| {
			if outer.is_completed_successfully() {
				let inner = outer
					.result()
					.expect("unreachable: outer succeeded")
					.clone();
				{
					let inner = inner.clone();
					derived.set_cancel_action(Box::new(move || inner.cancel()));
				}
				{
					let derived = derived.clone();
					inner.add_progress_callback(ContextDescriptor::Inline, move |progress| {
						derived.try_set_progress(0.5 + progress * 0.5).ok();
					});
				}
				let derived = derived.clone();
				inner.add_completion_callback(ContextDescriptor::Inline, move |inner| {
					adopt(&derived, inner);
				});
			} else {
				propagate_failure(&derived, outer);
			}
		});
		target
	}
}
