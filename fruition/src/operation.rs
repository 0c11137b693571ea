//! The shareable [`Operation`] handle and its completion surface.

use core::sync::atomic::{AtomicU32, Ordering};
use std::{
	any::Any,
	cell::UnsafeCell,
	error::Error,
	fmt::{self, Debug, Formatter},
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{Arc, OnceLock},
	thread::{self, ThreadId},
	time::{Duration, Instant},
};

use async_lock::OnceCell;
use event_listener::{Event, Listener as _};
use parking_lot::Mutex;
use pedicel::{
	context::{ContextDescriptor, ResolvedContext},
	registry::{self, Registry},
	state::{StateWord, Status},
};

use crate::error::{panic_message, Fault, OperationError};

/// What a terminal operation settled to.
pub(crate) enum Outcome<T> {
	Pending,
	Succeeded(T),
	Faulted(Vec<Fault>),
	Canceled(Option<Fault>),
}

pub(crate) struct CompletionEntry<T> {
	pub(crate) callback: Box<dyn FnOnce(&Operation<T>) + Send>,
	pub(crate) context: ResolvedContext,
}

#[derive(Clone)]
pub(crate) struct ProgressEntry {
	pub(crate) callback: Arc<dyn Fn(f32) + Send + Sync>,
	pub(crate) context: ResolvedContext,
}

/// A removal handle for one callback registration on one [`Operation`].
///
/// Handles returned for callbacks that were delivered immediately (because
/// the operation was already terminal, or the registration raced completion)
/// are inert: [`Operation::remove_callback`] reports `false` for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(HandleKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
	Completion(registry::CallbackHandle),
	Progress(registry::CallbackHandle),
	Inert,
}

impl CallbackHandle {
	pub(crate) const INERT: Self = Self(HandleKind::Inert);
}

struct Inner<T> {
	state: StateWord,
	/// Bit pattern of the last stored progress `f32`.
	progress: AtomicU32,
	/// Written exactly once, by the holder of the completion claim, before
	/// the terminal status is published.
	outcome: UnsafeCell<Outcome<T>>,
	completions: Registry<CompletionEntry<T>>,
	progress_callbacks: Registry<ProgressEntry>,
	wait_handle: OnceCell<Event>,
	/// Installed by combinators so `cancel` can forward to the currently
	/// active input. Cleared at the terminal transition, which also breaks
	/// the reference cycle through held inputs.
	cancel_action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
	async_state: Option<Arc<dyn Any + Send + Sync>>,
	creator: ThreadId,
}

/// # Safety
///
/// The [`UnsafeCell`] is written only between a successful completion claim
/// and its commit; after the `Release` commit every reader observes the write
/// through an `Acquire` load of the completed bit. Shared `&T` access after
/// completion is what requires `T: Sync`.
unsafe impl<T: Send + Sync> Sync for Inner<T> {}

/// A cooperative asynchronous operation yielding a `T`.
///
/// `Operation` is a cheap shared handle: clones observe and drive the same
/// underlying state. It carries both the consumer surface (status queries,
/// callbacks, waits, cancellation) and the producer surface (the `try_set_*`
/// completion source). Producers keep a clone and complete it from wherever
/// the work happens; the operation itself holds no thread.
pub struct Operation<T = ()> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for Operation<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Send + Sync + 'static> Operation<T> {
	/// A fresh operation in [`Status::Created`], to be driven through the
	/// `try_set_*` surface.
	#[must_use]
	pub fn new() -> Self {
		Self::construct(None)
	}

	/// Like [`new`](`Operation::new`), with an opaque user value readable
	/// through [`async_state`](`Operation::async_state`) for the operation's
	/// lifetime.
	#[must_use]
	pub fn with_async_state(state: impl Any + Send + Sync) -> Self {
		Self::construct(Some(Arc::new(state)))
	}

	fn construct(async_state: Option<Arc<dyn Any + Send + Sync>>) -> Self {
		Self {
			inner: Arc::new(Inner {
				state: StateWord::new(),
				progress: AtomicU32::new(0.0_f32.to_bits()),
				outcome: UnsafeCell::new(Outcome::Pending),
				completions: Registry::new(),
				progress_callbacks: Registry::new(),
				wait_handle: OnceCell::new(),
				cancel_action: Mutex::new(None),
				async_state,
				creator: thread::current().id(),
			}),
		}
	}

	fn new_terminal(status: Status, outcome: Outcome<T>) -> Self {
		Self {
			inner: Arc::new(Inner {
				state: StateWord::new_terminal(status),
				progress: AtomicU32::new(1.0_f32.to_bits()),
				outcome: UnsafeCell::new(outcome),
				completions: Registry::new_sealed(),
				progress_callbacks: Registry::new_sealed(),
				wait_handle: OnceCell::new(),
				cancel_action: Mutex::new(None),
				async_state: None,
				creator: thread::current().id(),
			}),
		}
	}

	/// An operation that already succeeded with `value`.
	#[must_use]
	pub fn from_result(value: T) -> Self {
		Self::new_terminal(Status::RanToCompletion, Outcome::Succeeded(value))
	}

	/// An operation that already faulted with `error`.
	#[must_use]
	pub fn from_exception(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
		Self::new_terminal(
			Status::Faulted,
			Outcome::Faulted(vec![Arc::from(error.into())]),
		)
	}

	/// An operation that is already cancelled.
	#[must_use]
	pub fn from_canceled() -> Self {
		Self::new_terminal(Status::Canceled, Outcome::Canceled(None))
	}

	/// Whether `self` and `other` are handles to the same operation.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// The current status.
	#[must_use]
	pub fn status(&self) -> Status {
		self.inner.state.status()
	}

	/// Whether the operation reached a terminal status.
	#[must_use]
	pub fn is_completed(&self) -> bool {
		self.inner.state.is_completed()
	}

	/// Whether the operation succeeded.
	#[must_use]
	pub fn is_completed_successfully(&self) -> bool {
		self.status() == Status::RanToCompletion
	}

	/// Whether the operation faulted.
	#[must_use]
	pub fn is_faulted(&self) -> bool {
		self.status() == Status::Faulted
	}

	/// Whether the operation was cancelled.
	#[must_use]
	pub fn is_canceled(&self) -> bool {
		self.status() == Status::Canceled
	}

	/// Whether the terminal transition happened on the thread that created
	/// the operation.
	#[must_use]
	pub fn completed_synchronously(&self) -> bool {
		self.inner.state.completed_synchronously()
	}

	/// Whether [`cancel`](`Operation::cancel`) has been called.
	#[must_use]
	pub fn is_cancellation_requested(&self) -> bool {
		self.inner.state.is_cancellation_requested()
	}

	/// Whether the operation has been disposed.
	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.inner.state.is_disposed()
	}

	/// The opaque user value attached at construction, if any.
	#[must_use]
	pub fn async_state(&self) -> Option<&(dyn Any + Send + Sync)> {
		self.inner.async_state.as_deref()
	}

	/// The operation's progress in `[0, 1]`.
	///
	/// Reads 0 before the operation runs, the last reported value while it
	/// runs, and exactly 1 once it is terminal.
	#[must_use]
	pub fn progress(&self) -> f32 {
		match self.status() {
			Status::Created | Status::Scheduled => 0.0,
			Status::Running => f32::from_bits(self.inner.progress.load(Ordering::Acquire)),
			Status::RanToCompletion | Status::Faulted | Status::Canceled => 1.0,
		}
	}

	/// The successful result, if the operation succeeded.
	#[must_use]
	pub fn result(&self) -> Option<&T> {
		match self.peek_outcome()? {
			Outcome::Succeeded(value) => Some(value),
			_ => None,
		}
	}

	/// The first captured fault: the first fault of a faulted operation, or
	/// the carried cancellation error of a cancelled one.
	#[must_use]
	pub fn exception(&self) -> Option<Fault> {
		match self.peek_outcome()? {
			Outcome::Faulted(faults) => faults.first().cloned(),
			Outcome::Canceled(fault) => fault.clone(),
			_ => None,
		}
	}

	/// All captured faults, first-seen first. Empty unless the operation
	/// faulted or carries a cancellation error.
	#[must_use]
	pub fn exceptions(&self) -> Vec<Fault> {
		match self.peek_outcome() {
			Some(Outcome::Faulted(faults)) => faults.clone(),
			Some(Outcome::Canceled(Some(fault))) => vec![fault.clone()],
			_ => Vec::new(),
		}
	}

	/// The failure of a terminal operation as an [`OperationError`], or
	/// `None` if it is pending or succeeded.
	#[must_use]
	pub fn failure(&self) -> Option<OperationError> {
		match self.peek_outcome()? {
			Outcome::Faulted(faults) => Some(OperationError::Faulted {
				faults: faults.clone(),
			}),
			Outcome::Canceled(fault) => Some(OperationError::Canceled {
				fault: fault.clone(),
			}),
			_ => None,
		}
	}

	pub(crate) fn peek_outcome(&self) -> Option<&Outcome<T>> {
		if self.is_completed() {
			// Safety: published by the `Release` commit that set the
			// completed bit we just observed with `Acquire`; never written
			// again.
			Some(unsafe { &*self.inner.outcome.get() })
		} else {
			None
		}
	}

	pub(crate) fn completed_result(&self) -> Result<&T, OperationError> {
		match self
			.peek_outcome()
			.expect("unreachable: operation is terminal")
		{
			Outcome::Succeeded(value) => Ok(value),
			Outcome::Faulted(faults) => Err(OperationError::Faulted {
				faults: faults.clone(),
			}),
			Outcome::Canceled(fault) => Err(OperationError::Canceled {
				fault: fault.clone(),
			}),
			Outcome::Pending => unreachable!("terminal operation without outcome"),
		}
	}

	/// The lazily created signaling handle blocking waiters park on.
	///
	/// If the operation completed between handle construction and this call
	/// returning, the handle has already been notified.
	pub fn wait_handle(&self) -> &Event {
		let event = self.inner.wait_handle.get_or_init_blocking(Event::new);
		if self.is_completed() {
			// Completion may have raced construction and missed the handle.
			event.notify(usize::MAX);
		}
		event
	}

	/// Blocks the calling thread until the operation is terminal.
	///
	/// Returns immediately (both times) on an already-terminal operation.
	pub fn wait(&self) {
		while !self.is_completed() {
			let listener = self.wait_handle().listen();
			if self.is_completed() {
				break;
			}
			listener.wait();
		}
	}

	/// Blocks until the operation is terminal or `timeout` elapsed.
	///
	/// **Returns** whether the operation is terminal.
	#[must_use]
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		while !self.is_completed() {
			let listener = self.wait_handle().listen();
			if self.is_completed() {
				break;
			}
			if listener.wait_deadline(deadline).is_none() {
				return self.is_completed();
			}
		}
		true
	}

	/// Blocks until the operation is terminal or `token` turns terminal,
	/// whichever happens first.
	///
	/// Any operation works as a token; pair it with
	/// [`cancel`](`Operation::cancel`)-driven producers or
	/// [`delay`](`crate::delay`) for deadline-shaped waits. **Returns**
	/// whether the operation (not the token) is terminal.
	#[must_use]
	pub fn wait_with_cancel(&self, token: &Operation<()>) -> bool {
		if self.is_completed() {
			return true;
		}
		let registration = {
			let waiter = self.clone();
			token.on_completed(ContextDescriptor::Inline, move || {
				waiter.wait_handle().notify(usize::MAX);
			})
		};
		loop {
			if self.is_completed() {
				token.remove_callback(registration);
				return true;
			}
			if token.is_completed() {
				return false;
			}
			let listener = self.wait_handle().listen();
			if self.is_completed() || token.is_completed() {
				continue;
			}
			listener.wait();
		}
	}

	/// Waits for completion, then yields the result or rethrows the stored
	/// failure.
	///
	/// # Errors
	///
	/// [`OperationError::Faulted`] or [`OperationError::Canceled`] matching
	/// the operation's outcome; [`OperationError::Disposed`] when called on a
	/// disposed operation.
	pub fn join(&self) -> Result<&T, OperationError> {
		if self.is_disposed() {
			return Err(OperationError::Disposed);
		}
		self.wait();
		self.completed_result()
	}

	/// Like [`join`](`Operation::join`), giving up after `timeout`.
	///
	/// # Errors
	///
	/// [`OperationError::Timeout`] when the operation is still pending after
	/// `timeout`; otherwise as [`join`](`Operation::join`).
	pub fn join_timeout(&self, timeout: Duration) -> Result<&T, OperationError> {
		if self.is_disposed() {
			return Err(OperationError::Disposed);
		}
		if !self.wait_timeout(timeout) {
			return Err(OperationError::Timeout);
		}
		self.completed_result()
	}

	/// Requests cooperative cancellation.
	///
	/// Sets the request flag and forwards to the active input of combinator
	/// operations. A producer that never inspects
	/// [`is_cancellation_requested`](`Operation::is_cancellation_requested`)
	/// runs to completion regardless; nothing is terminated forcibly.
	/// Idempotent: repeat calls are no-ops.
	pub fn cancel(&self) {
		if self.inner.state.request_cancellation() {
			tracing::trace!("cancellation requested");
			let action = self.inner.cancel_action.lock().take();
			if let Some(action) = action {
				action();
			}
		}
	}

	/// Installs the action `cancel` forwards to, replacing any previous one.
	///
	/// If cancellation was already requested, the action runs immediately
	/// instead of being stored.
	pub(crate) fn set_cancel_action(&self, action: Box<dyn FnOnce() + Send>) {
		if self.is_completed() {
			return;
		}
		*self.inner.cancel_action.lock() = Some(action);
		// Close the race with a `cancel` between the caller's checks and the
		// store above.
		if self.is_cancellation_requested() {
			let action = self.inner.cancel_action.lock().take();
			if let Some(action) = action {
				action();
			}
		}
	}

	/// Marks a terminal operation disposed.
	///
	/// Disposal is bookkeeping: later callback registrations return inert
	/// handles without being stored or invoked, and joins fail with
	/// [`OperationError::Disposed`]. Idempotent; a no-op on shared singleton
	/// operations.
	///
	/// # Errors
	///
	/// [`OperationError::InvalidState`] when the operation is not yet
	/// terminal.
	pub fn dispose(&self) -> Result<(), OperationError> {
		if self.inner.state.is_do_not_dispose() {
			return Ok(());
		}
		if self.inner.state.try_mark_disposed() {
			Ok(())
		} else {
			Err(OperationError::InvalidState {
				status: self.status(),
			})
		}
	}

	// === producer surface ===

	/// Upgrades `Created` to `Scheduled`. Fails after that, and after any
	/// terminal transition.
	pub fn try_set_scheduled(&self) -> bool {
		self.inner.state.try_upgrade(Status::Scheduled)
	}

	/// Upgrades `Created`/`Scheduled` to `Running`. Fails after that, and
	/// after any terminal transition.
	pub fn try_set_running(&self) -> bool {
		self.inner.state.try_upgrade(Status::Running)
	}

	/// Completes the operation successfully with `value`.
	///
	/// **Returns** `false` without any effect when another terminal
	/// transition won.
	pub fn try_set_result(&self, value: T) -> bool {
		self.complete(Status::RanToCompletion, Outcome::Succeeded(value))
	}

	/// Faults the operation with `error`.
	pub fn try_set_exception(&self, error: impl Into<Box<dyn Error + Send + Sync>>) -> bool {
		self.complete(
			Status::Faulted,
			Outcome::Faulted(vec![Arc::from(error.into())]),
		)
	}

	/// Faults the operation with every fault in `faults`, preserving their
	/// order. An empty list completes nothing and returns `false`.
	pub fn try_set_exceptions(&self, faults: impl IntoIterator<Item = Fault>) -> bool {
		let faults: Vec<Fault> = faults.into_iter().collect();
		if faults.is_empty() {
			return false;
		}
		self.complete(Status::Faulted, Outcome::Faulted(faults))
	}

	/// Cancels the operation.
	pub fn try_set_canceled(&self) -> bool {
		self.complete(Status::Canceled, Outcome::Canceled(None))
	}

	/// Cancels the operation, carrying `error` as the cancellation payload.
	pub fn try_set_canceled_with(
		&self,
		error: impl Into<Box<dyn Error + Send + Sync>>,
	) -> bool {
		self.complete(
			Status::Canceled,
			Outcome::Canceled(Some(Arc::from(error.into()))),
		)
	}

	pub(crate) fn complete_faults(&self, faults: Vec<Fault>) -> bool {
		if faults.is_empty() {
			return false;
		}
		self.complete(Status::Faulted, Outcome::Faulted(faults))
	}

	pub(crate) fn complete_canceled(&self, fault: Option<Fault>) -> bool {
		self.complete(Status::Canceled, Outcome::Canceled(fault))
	}

	/// Loud [`try_set_scheduled`](`Operation::try_set_scheduled`).
	///
	/// # Errors
	///
	/// [`OperationError::InvalidState`] when the transition is impossible.
	pub fn set_scheduled(&self) -> Result<(), OperationError> {
		if self.try_set_scheduled() {
			Ok(())
		} else {
			Err(OperationError::InvalidState {
				status: self.status(),
			})
		}
	}

	/// Loud [`try_set_running`](`Operation::try_set_running`).
	///
	/// # Errors
	///
	/// [`OperationError::InvalidState`] when the transition is impossible.
	pub fn set_running(&self) -> Result<(), OperationError> {
		if self.try_set_running() {
			Ok(())
		} else {
			Err(OperationError::InvalidState {
				status: self.status(),
			})
		}
	}

	/// Loud [`try_set_result`](`Operation::try_set_result`).
	///
	/// # Errors
	///
	/// [`OperationError::InvalidState`] when the transition is impossible.
	pub fn set_result(&self, value: T) -> Result<(), OperationError> {
		if self.try_set_result(value) {
			Ok(())
		} else {
			Err(OperationError::InvalidState {
				status: self.status(),
			})
		}
	}

	/// Loud [`try_set_exception`](`Operation::try_set_exception`).
	///
	/// # Errors
	///
	/// [`OperationError::InvalidState`] when the transition is impossible.
	pub fn set_exception(
		&self,
		error: impl Into<Box<dyn Error + Send + Sync>>,
	) -> Result<(), OperationError> {
		if self.try_set_exception(error) {
			Ok(())
		} else {
			Err(OperationError::InvalidState {
				status: self.status(),
			})
		}
	}

	/// Loud [`try_set_canceled`](`Operation::try_set_canceled`).
	///
	/// # Errors
	///
	/// [`OperationError::InvalidState`] when the transition is impossible.
	pub fn set_canceled(&self) -> Result<(), OperationError> {
		if self.try_set_canceled() {
			Ok(())
		} else {
			Err(OperationError::InvalidState {
				status: self.status(),
			})
		}
	}

	/// Reports progress, moving a `Created`/`Scheduled` operation to
	/// `Running`.
	///
	/// Stores and fans out only when the value actually changed.
	/// **Returns** whether callbacks were notified; `Ok(false)` on repeats
	/// and on terminal operations.
	///
	/// # Errors
	///
	/// [`OperationError::ArgumentOutOfRange`] when `progress` is outside
	/// `[0, 1]` (or `NaN`).
	pub fn try_set_progress(&self, progress: f32) -> Result<bool, OperationError> {
		if !(0.0..=1.0).contains(&progress) {
			return Err(OperationError::ArgumentOutOfRange {
				what: "progress must be within [0, 1]",
			});
		}
		if self.is_completed() {
			return Ok(false);
		}
		self.inner.state.try_upgrade(Status::Running);
		let bits = progress.to_bits();
		if self.inner.progress.swap(bits, Ordering::AcqRel) == bits {
			return Ok(false);
		}
		if self.is_completed() {
			// Lost against a concurrent terminal transition; its fan-out
			// delivers the final 1.
			return Ok(false);
		}
		for entry in self.inner.progress_callbacks.snapshot() {
			Self::dispatch_progress(entry, progress);
		}
		Ok(true)
	}

	fn complete(&self, status: Status, outcome: Outcome<T>) -> bool {
		let Some(claim) = self.inner.state.try_claim_completion() else {
			return false;
		};
		// Safety: the claim grants exclusive write access; the commit below
		// publishes the write.
		unsafe {
			*self.inner.outcome.get() = outcome;
		}
		let synchronous = thread::current().id() == self.inner.creator;
		claim.commit(status, synchronous);
		tracing::trace!(?status, synchronous, "operation turned terminal");

		let progress_changed =
			self.inner.progress.swap(1.0_f32.to_bits(), Ordering::AcqRel) != 1.0_f32.to_bits();
		if let Some(handle) = self.inner.wait_handle.get() {
			handle.notify(usize::MAX);
		}

		// Install the sentinels; racing registrations deliver themselves from
		// here on. Draining (rather than snapshotting) the progress registry
		// keeps a registration that raced this transition from being dropped
		// with neither a change notification nor the terminal 1.
		let sealed_progress = self.inner.progress_callbacks.seal();
		if progress_changed {
			for (_, entry) in sealed_progress {
				Self::dispatch_progress(entry, 1.0);
			}
		}
		for (_, entry) in self.inner.completions.seal() {
			self.dispatch_completion(entry);
		}

		self.inner.cancel_action.lock().take();
		true
	}

	// === callbacks ===

	/// Registers `callback` to run once at the terminal transition, on the
	/// context selected by `context`.
	///
	/// Callbacks registered before completion fire in registration order. On
	/// an already-terminal operation the callback is delivered immediately
	/// (still honoring `context`) and the returned handle is inert. On a
	/// disposed operation nothing is stored or invoked.
	pub fn add_completion_callback(
		&self,
		context: ContextDescriptor,
		callback: impl FnOnce(&Operation<T>) + Send + 'static,
	) -> CallbackHandle {
		if self.is_disposed() {
			return CallbackHandle::INERT;
		}
		let entry = CompletionEntry {
			callback: Box::new(callback),
			context: context.resolve(),
		};
		if self.is_completed() {
			self.dispatch_completion(entry);
			return CallbackHandle::INERT;
		}
		match self.inner.completions.add(entry) {
			Ok(handle) => CallbackHandle(HandleKind::Completion(handle)),
			Err(entry) => {
				// The sentinel went in concurrently; delivery is ours.
				self.dispatch_completion(entry);
				CallbackHandle::INERT
			}
		}
	}

	/// Registers an argument-less action as a completion callback.
	pub fn on_completed(
		&self,
		context: ContextDescriptor,
		action: impl FnOnce() + Send + 'static,
	) -> CallbackHandle {
		self.add_completion_callback(context, move |_| action())
	}

	/// Registers `callback` to run at each progress change.
	///
	/// On an already-terminal operation the callback is instead delivered
	/// once, immediately, with progress 1; in-flight operations do not replay
	/// the current value at registration.
	pub fn add_progress_callback(
		&self,
		context: ContextDescriptor,
		callback: impl Fn(f32) + Send + Sync + 'static,
	) -> CallbackHandle {
		if self.is_disposed() {
			return CallbackHandle::INERT;
		}
		let entry = ProgressEntry {
			callback: Arc::new(callback),
			context: context.resolve(),
		};
		if self.is_completed() {
			Self::dispatch_progress(entry, 1.0);
			return CallbackHandle::INERT;
		}
		match self.inner.progress_callbacks.add(entry) {
			Ok(handle) => CallbackHandle(HandleKind::Progress(handle)),
			Err(entry) => {
				Self::dispatch_progress(entry, 1.0);
				CallbackHandle::INERT
			}
		}
	}

	/// Removes a callback registration.
	///
	/// **Returns** `false` for inert handles and for callbacks that already
	/// fired (or are firing concurrently).
	pub fn remove_callback(&self, handle: CallbackHandle) -> bool {
		match handle.0 {
			HandleKind::Completion(handle) => self.inner.completions.remove(handle).is_some(),
			HandleKind::Progress(handle) => {
				self.inner.progress_callbacks.remove(handle).is_some()
			}
			HandleKind::Inert => false,
		}
	}

	fn dispatch_completion(&self, entry: CompletionEntry<T>) {
		let CompletionEntry { callback, context } = entry;
		match context {
			ResolvedContext::Inline => Self::invoke_completion(callback, self),
			ResolvedContext::Posted(context) => {
				let operation = self.clone();
				context.post(Box::new(move || {
					Self::invoke_completion(callback, &operation);
				}));
			}
		}
	}

	fn invoke_completion(callback: Box<dyn FnOnce(&Operation<T>) + Send>, operation: &Self) {
		if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(operation))) {
			tracing::error!(
				panic = panic_message(payload.as_ref()),
				"completion callback panicked; isolated"
			);
		}
	}

	fn dispatch_progress(entry: ProgressEntry, progress: f32) {
		let ProgressEntry { callback, context } = entry;
		match context {
			ResolvedContext::Inline => Self::invoke_progress(&callback, progress),
			ResolvedContext::Posted(context) => {
				context.post(Box::new(move || {
					Self::invoke_progress(&callback, progress);
				}));
			}
		}
	}

	fn invoke_progress(callback: &Arc<dyn Fn(f32) + Send + Sync>, progress: f32) {
		if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(progress))) {
			tracing::error!(
				panic = panic_message(payload.as_ref()),
				"progress callback panicked; isolated"
			);
		}
	}
}

impl Operation<()> {
	/// The shared, non-disposable operation that has already completed.
	#[must_use]
	pub fn completed() -> Self {
		static COMPLETED: OnceLock<Operation<()>> = OnceLock::new();
		COMPLETED
			.get_or_init(|| {
				let operation =
					Operation::new_terminal(Status::RanToCompletion, Outcome::Succeeded(()));
				operation.inner.state.set_do_not_dispose();
				operation
			})
			.clone()
	}

	/// Completes the operation successfully without a value.
	pub fn try_set_completed(&self) -> bool {
		self.try_set_result(())
	}

	/// Loud [`try_set_completed`](`Operation::try_set_completed`).
	///
	/// # Errors
	///
	/// [`OperationError::InvalidState`] when the transition is impossible.
	pub fn set_completed(&self) -> Result<(), OperationError> {
		self.set_result(())
	}
}

impl<T: Send + Sync + 'static> Default for Operation<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Send + Sync + 'static> Debug for Operation<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Operation")
			.field("status", &self.status())
			.field("progress", &self.progress())
			.field(
				"cancellation_requested",
				&self.is_cancellation_requested(),
			)
			.finish_non_exhaustive()
	}
}
