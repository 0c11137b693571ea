#![warn(clippy::pedantic)]
#![warn(unreachable_pub)]

//! `Operation` <=> observer adapters.

use fruition::{CallbackHandle, ContextDescriptor, Operation, OperationError};

/// A push-style observer over an operation's outcome.
pub trait Observer<T>: Send + Sync {
	/// The operation succeeded with `value`.
	fn on_next(&self, value: &T);

	/// The operation faulted (or was cancelled carrying an error).
	fn on_error(&self, error: &OperationError);

	/// The observation finished: after `on_next`, or on a plain
	/// cancellation.
	fn on_completed(&self);
}

/// The registration of an [`Observer`] on an [`Operation`].
///
/// Dropping the subscription removes the registration; an observer whose
/// operation already notified it is unaffected.
pub struct Subscription<T: Send + Sync + 'static> {
	operation: Operation<T>,
	handle: Option<CallbackHandle>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
	/// Removes the registration explicitly.
	pub fn unsubscribe(mut self) {
		self.remove();
	}

	fn remove(&mut self) {
		if let Some(handle) = self.handle.take() {
			self.operation.remove_callback(handle);
		}
	}
}

impl<T: Send + Sync + 'static> Drop for Subscription<T> {
	fn drop(&mut self) {
		self.remove();
	}
}

/// Bridges `operation`'s terminal transition to `observer`.
///
/// On success the observer sees `on_next` with the result, then
/// `on_completed`. On a fault it sees `on_error`. A cancellation maps to
/// `on_error` when it carries an error and to a bare `on_completed`
/// otherwise. Notification happens on the context selected by `context`.
pub fn subscribe<T, O>(
	operation: &Operation<T>,
	context: ContextDescriptor,
	observer: O,
) -> Subscription<T>
where
	T: Send + Sync + 'static,
	O: Observer<T> + 'static,
{
	let handle = operation.add_completion_callback(context, move |finished| {
		if let Some(value) = finished.result() {
			observer.on_next(value);
			observer.on_completed();
			return;
		}
		match finished.failure() {
			Some(error @ OperationError::Faulted { .. }) => observer.on_error(&error),
			Some(error @ OperationError::Canceled { fault: Some(_) }) => {
				observer.on_error(&error);
			}
			_ => observer.on_completed(),
		}
	});
	Subscription {
		operation: operation.clone(),
		handle: Some(handle),
	}
}

struct FnObserver<N, E, C> {
	next: N,
	error: E,
	completed: C,
}

impl<T, N, E, C> Observer<T> for FnObserver<N, E, C>
where
	N: Fn(&T) + Send + Sync,
	E: Fn(&OperationError) + Send + Sync,
	C: Fn() + Send + Sync,
{
	fn on_next(&self, value: &T) {
		(self.next)(value);
	}

	fn on_error(&self, error: &OperationError) {
		(self.error)(error);
	}

	fn on_completed(&self) {
		(self.completed)();
	}
}

/// Builds an [`Observer`] from three closures.
pub fn observer<T>(
	on_next: impl Fn(&T) + Send + Sync + 'static,
	on_error: impl Fn(&OperationError) + Send + Sync + 'static,
	on_completed: impl Fn() + Send + Sync + 'static,
) -> impl Observer<T> + 'static {
	FnObserver {
		next: on_next,
		error: on_error,
		completed: on_completed,
	}
}

/// Convenience over [`subscribe`] taking just the value and error halves.
pub fn subscribe_with<T>(
	operation: &Operation<T>,
	context: ContextDescriptor,
	on_next: impl Fn(&T) + Send + Sync + 'static,
	on_error: impl Fn(&OperationError) + Send + Sync + 'static,
) -> Subscription<T>
where
	T: Send + Sync + 'static,
{
	subscribe(operation, context, observer(on_next, on_error, || {}))
}
