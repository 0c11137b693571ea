//! `.await` integration for [`Operation`].
//!
//! An [`OperationFuture`] is the awaiter shape over an operation: readiness
//! forwards to [`Operation::is_completed`], suspension registers the waker as
//! a completion callback under the configured context, and the output
//! reproduces [`Operation::join`]: the value on success, the original
//! failure otherwise.

use std::{
	future::{Future, IntoFuture},
	pin::Pin,
	sync::Arc,
	task::{Context, Poll, Waker},
};

use parking_lot::Mutex;
use pedicel::context::ContextDescriptor;
use pin_project::{pin_project, pinned_drop};

use crate::{
	error::OperationError,
	operation::{CallbackHandle, Operation},
};

/// How an awaited operation resumes its waiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AwaitOptions {
	/// Wake on the completing thread instead of posting to the context
	/// captured at registration.
	pub synchronous: bool,
}

impl AwaitOptions {
	/// Resume on the context ambient where the future first polled; inline
	/// when none is attached. The default.
	pub const CAPTURED: Self = Self { synchronous: false };
	/// Resume inline on the completing thread.
	pub const SYNCHRONOUS: Self = Self { synchronous: true };

	fn context(self) -> ContextDescriptor {
		if self.synchronous {
			ContextDescriptor::Inline
		} else {
			ContextDescriptor::Captured
		}
	}
}

/// The [`Future`] over an [`Operation`], with configurable resumption.
#[pin_project(PinnedDrop)]
pub struct OperationFuture<T: Send + Sync + 'static> {
	operation: Operation<T>,
	options: AwaitOptions,
	registration: Option<(CallbackHandle, Arc<Mutex<Option<Waker>>>)>,
}

impl<T: Clone + Send + Sync + 'static> Future for OperationFuture<T> {
	type Output = Result<T, OperationError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		if this.operation.is_completed() {
			return Poll::Ready(this.operation.completed_result().map(T::clone));
		}
		if let Some((_, slot)) = &*this.registration {
			*slot.lock() = Some(cx.waker().clone());
		} else {
			let slot = Arc::new(Mutex::new(Some(cx.waker().clone())));
			let handle = {
				let slot = slot.clone();
				this.operation
					.add_completion_callback(this.options.context(), move |_| {
						let waker = slot.lock().take();
						if let Some(waker) = waker {
							waker.wake();
						}
					})
			};
			*this.registration = Some((handle, slot));
		}
		// Completion may have raced the registration; the wake already
		// happened (or is posted) in that case, so re-check rather than
		// sleep forever.
		if this.operation.is_completed() {
			Poll::Ready(this.operation.completed_result().map(T::clone))
		} else {
			Poll::Pending
		}
	}
}

#[pinned_drop]
impl<T: Send + Sync + 'static> PinnedDrop for OperationFuture<T> {
	fn drop(self: Pin<&mut Self>) {
		let this = self.project();
		if let Some((handle, _)) = this.registration.take() {
			// Dropped before completion: don't leave a waker behind.
			this.operation.remove_callback(handle);
		}
	}
}

impl<T: Clone + Send + Sync + 'static> IntoFuture for Operation<T> {
	type Output = Result<T, OperationError>;
	type IntoFuture = OperationFuture<T>;

	fn into_future(self) -> Self::IntoFuture {
		self.configure_await(AwaitOptions::CAPTURED)
	}
}

impl<T: Clone + Send + Sync + 'static> Operation<T> {
	/// The awaitable over this operation with explicit [`AwaitOptions`].
	#[must_use]
	pub fn configure_await(&self, options: AwaitOptions) -> OperationFuture<T> {
		OperationFuture {
			operation: self.clone(),
			options,
			registration: None,
		}
	}
}
