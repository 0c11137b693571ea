//! Frame-driven operations: the update interfaces and the update-driven
//! delay.
//!
//! Hosts with their own loop (a frame loop, a simulation tick) drive
//! operations by dispatching [`Updatable::update`] once per frame through an
//! [`UpdateSource`]. The library itself only consumes these interfaces;
//! [`ManualUpdateSource`] is the plain implementation hosts and tests can
//! start from.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::operation::Operation;

/// A listener driven once per frame.
pub trait Updatable: Send + Sync {
	/// Advances the listener by `frame_time` seconds.
	fn update(&self, frame_time: f32);
}

/// An externally driven tick generator.
pub trait UpdateSource {
	/// Registers `listener` to be driven each frame.
	fn add_listener(&self, listener: Arc<dyn Updatable>);

	/// Removes a previously added listener, matched by identity.
	fn remove_listener(&self, listener: &dyn Updatable);
}

/// An [`UpdateSource`] driven by explicit [`dispatch`](`ManualUpdateSource::dispatch`)
/// calls.
///
/// Listener changes from within a dispatch take effect the following frame.
#[derive(Default)]
pub struct ManualUpdateSource {
	listeners: Mutex<Vec<Arc<dyn Updatable>>>,
}

impl ManualUpdateSource {
	/// A source without listeners.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Drives every registered listener with `frame_time` seconds.
	pub fn dispatch(&self, frame_time: f32) {
		let listeners: Vec<Arc<dyn Updatable>> = self.listeners.lock().clone();
		for listener in listeners {
			listener.update(frame_time);
		}
	}

	/// The number of registered listeners.
	#[must_use]
	pub fn len(&self) -> usize {
		self.listeners.lock().len()
	}

	/// Whether no listeners are registered.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.listeners.lock().is_empty()
	}
}

impl UpdateSource for ManualUpdateSource {
	fn add_listener(&self, listener: Arc<dyn Updatable>) {
		self.listeners.lock().push(listener);
	}

	fn remove_listener(&self, listener: &dyn Updatable) {
		let mut listeners = self.listeners.lock();
		if let Some(position) = listeners
			.iter()
			.position(|candidate| std::ptr::addr_eq(Arc::as_ptr(candidate), listener))
		{
			listeners.remove(position);
		}
	}
}

/// Minimum reported-progress spacing for update-driven delays, in seconds.
const PROGRESS_THROTTLE: f32 = 0.1;

struct DelayListener<S> {
	operation: Operation<()>,
	total: f32,
	remaining: Mutex<f32>,
	since_emit: Mutex<f32>,
	source: Weak<S>,
}

impl<S: UpdateSource + Send + Sync + 'static> DelayListener<S> {
	fn detach(&self) {
		if let Some(source) = self.source.upgrade() {
			source.remove_listener(self);
		}
	}
}

impl<S: UpdateSource + Send + Sync + 'static> Updatable for DelayListener<S> {
	fn update(&self, frame_time: f32) {
		let operation = &self.operation;
		if operation.is_completed() {
			self.detach();
			return;
		}
		if operation.is_cancellation_requested() {
			operation.try_set_canceled();
			self.detach();
			return;
		}
		let remaining = {
			let mut remaining = self.remaining.lock();
			*remaining -= frame_time;
			*remaining
		};
		if remaining <= 0.0 {
			operation.try_set_result(());
			self.detach();
			return;
		}
		let mut since_emit = self.since_emit.lock();
		*since_emit += frame_time;
		if *since_emit >= PROGRESS_THROTTLE {
			*since_emit = 0.0;
			drop(since_emit);
			let fraction = ((self.total - remaining) / self.total).clamp(0.0, 1.0);
			operation.try_set_progress(fraction).ok();
		}
	}
}

/// An operation that completes after `seconds` of accumulated frame time on
/// `source`.
///
/// The delay registers itself as a listener, counts `frame_time` down each
/// tick and reports progress no more often than every 100ms of frame time.
/// Cancellation detaches the listener and cancels the operation without
/// waiting for another frame.
pub fn update_delay<S>(seconds: f32, source: &Arc<S>) -> Operation<()>
where
	S: UpdateSource + Send + Sync + 'static,
{
	let target = Operation::new();
	target.try_set_running();
	if seconds <= 0.0 {
		target.try_set_result(());
		return target;
	}
	let listener = Arc::new(DelayListener {
		operation: target.clone(),
		total: seconds,
		remaining: Mutex::new(seconds),
		since_emit: Mutex::new(0.0),
		source: Arc::downgrade(source),
	});
	source.add_listener(listener.clone());
	{
		let listener = listener.clone();
		target.set_cancel_action(Box::new(move || {
			listener.operation.try_set_canceled();
			listener.detach();
		}));
	}
	target
}
