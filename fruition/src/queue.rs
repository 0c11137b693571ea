//! A FIFO queue running operations one at a time.

use std::{
	collections::VecDeque,
	fmt::{self, Debug, Formatter},
	sync::Arc,
};

use parking_lot::Mutex;
use pedicel::context::{ContextDescriptor, ContextRef, ResolvedContext};

use crate::operation::{CallbackHandle, Operation};

struct QueueState<T> {
	items: VecDeque<(Operation<T>, CallbackHandle)>,
	suspended: bool,
}

struct QueueInner<T> {
	context: ResolvedContext,
	max_count: usize,
	state: Mutex<QueueState<T>>,
}

/// A FIFO of operations started one at a time on a chosen context.
///
/// Enqueued operations move to `Scheduled`; the head is upgraded to `Running`
/// and, once it turns terminal, removed, which starts the next head. For any
/// two operations `A` enqueued before `B` on the same queue, `A` reaches
/// `Running` first, and `B` does not until `A` is terminal. Nothing is
/// ordered between different queues.
///
/// The queue is a cheap shared handle; clones operate on the same FIFO.
pub struct SerialQueue<T = ()> {
	inner: Arc<QueueInner<T>>,
}

impl<T> Clone for SerialQueue<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Send + Sync + 'static> SerialQueue<T> {
	/// An unbounded queue on the context ambient at construction (inline
	/// when none is attached).
	#[must_use]
	pub fn new() -> Self {
		Self::construct(ContextDescriptor::Captured.resolve(), 0)
	}

	/// An unbounded queue dispatching on `context`.
	#[must_use]
	pub fn with_context(context: ContextRef) -> Self {
		Self::construct(ResolvedContext::Posted(context), 0)
	}

	/// A bounded queue on the ambient context. `max_count` of `0` means
	/// unbounded.
	#[must_use]
	pub fn with_max_count(max_count: usize) -> Self {
		Self::construct(ContextDescriptor::Captured.resolve(), max_count)
	}

	/// A bounded queue dispatching on `context`.
	#[must_use]
	pub fn with_context_and_max_count(context: ContextRef, max_count: usize) -> Self {
		Self::construct(ResolvedContext::Posted(context), max_count)
	}

	fn construct(context: ResolvedContext, max_count: usize) -> Self {
		Self {
			inner: Arc::new(QueueInner {
				context,
				max_count,
				state: Mutex::new(QueueState {
					items: VecDeque::new(),
					suspended: false,
				}),
			}),
		}
	}

	fn completion_context(&self) -> ContextDescriptor {
		match &self.inner.context {
			ResolvedContext::Inline => ContextDescriptor::Inline,
			ResolvedContext::Posted(context) => ContextDescriptor::Specific(context.clone()),
		}
	}

	/// Enqueues `operation`, marking it `Scheduled`.
	///
	/// **Returns** `false` without enqueueing when the queue is bounded and
	/// full, or when `operation` is disposed. Otherwise the operation starts
	/// once everything ahead of it finished (immediately, when the queue is
	/// idle and not suspended).
	pub fn try_add(&self, operation: Operation<T>) -> bool {
		if operation.is_disposed() {
			return false;
		}
		{
			let mut state = self.inner.state.lock();
			if self.inner.max_count != 0 && state.items.len() >= self.inner.max_count {
				return false;
			}
			operation.try_set_scheduled();
			state
				.items
				.push_back((operation.clone(), CallbackHandle::INERT));
		}
		// Registered outside the lock: an already-terminal operation fires
		// the callback immediately, which re-enters the queue to remove it.
		let handle = {
			let queue = self.clone();
			operation.add_completion_callback(self.completion_context(), move |finished| {
				queue.finish(finished);
			})
		};
		{
			let mut state = self.inner.state.lock();
			if let Some(slot) = state
				.items
				.iter_mut()
				.find(|(queued, _)| queued.ptr_eq(&operation))
			{
				slot.1 = handle;
			}
		}
		self.kick();
		true
	}

	fn finish(&self, finished: &Operation<T>) {
		{
			let mut state = self.inner.state.lock();
			if let Some(position) = state
				.items
				.iter()
				.position(|(queued, _)| queued.ptr_eq(finished))
			{
				state.items.remove(position);
			}
		}
		tracing::trace!("queued operation finished; starting next head");
		self.kick();
	}

	fn kick(&self) {
		let state = self.inner.state.lock();
		if state.suspended {
			return;
		}
		if let Some((head, _)) = state.items.front() {
			// Only the head is ever started; `try_set_running` is a no-op
			// when it is already running or terminal.
			head.try_set_running();
		}
	}

	/// Removes `operation` from the queue without cancelling it.
	///
	/// A removed running head keeps running; the next head starts regardless
	/// of its fate. **Returns** whether the operation was queued here.
	pub fn remove(&self, operation: &Operation<T>) -> bool {
		let removed = {
			let mut state = self.inner.state.lock();
			let position = state
				.items
				.iter()
				.position(|(queued, _)| queued.ptr_eq(operation));
			position.and_then(|position| state.items.remove(position))
		};
		match removed {
			Some((operation, handle)) => {
				operation.remove_callback(handle);
				self.kick();
				true
			}
			None => false,
		}
	}

	/// Empties the queue without cancelling anything.
	pub fn clear(&self) {
		self.release();
	}

	/// Empties the queue, returning the removed operations in queue order.
	pub fn release(&self) -> Vec<Operation<T>> {
		let drained: Vec<_> = {
			let mut state = self.inner.state.lock();
			state.items.drain(..).collect()
		};
		drained
			.into_iter()
			.map(|(operation, handle)| {
				operation.remove_callback(handle);
				operation
			})
			.collect()
	}

	/// A snapshot of the queued operations in queue order.
	#[must_use]
	pub fn to_vec(&self) -> Vec<Operation<T>> {
		self.inner
			.state
			.lock()
			.items
			.iter()
			.map(|(operation, _)| operation.clone())
			.collect()
	}

	/// The head operation, if any.
	#[must_use]
	pub fn current(&self) -> Option<Operation<T>> {
		self.inner
			.state
			.lock()
			.items
			.front()
			.map(|(operation, _)| operation.clone())
	}

	/// Whether the queue is suspended.
	#[must_use]
	pub fn is_suspended(&self) -> bool {
		self.inner.state.lock().suspended
	}

	/// Suspends or resumes head starts. While suspended, completions still
	/// dequeue but nothing new starts; resuming kicks the current head.
	pub fn set_suspended(&self, suspended: bool) {
		self.inner.state.lock().suspended = suspended;
		if !suspended {
			self.kick();
		}
	}

	/// The number of queued operations (including the running head).
	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.state.lock().items.len()
	}

	/// Whether the queue is empty.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.state.lock().items.is_empty()
	}

	/// The bound this queue was created with; `0` means unbounded.
	#[must_use]
	pub fn max_count(&self) -> usize {
		self.inner.max_count
	}
}

impl<T: Send + Sync + 'static> Default for SerialQueue<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Send + Sync + 'static> Debug for SerialQueue<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("SerialQueue")
			.field("len", &state.items.len())
			.field("suspended", &state.suspended)
			.field("max_count", &self.inner.max_count)
			.finish()
	}
}
