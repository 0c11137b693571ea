//! A sealable FIFO callback registry.
//!
//! [`Registry`] stores opaque entries in registration order until it is
//! *sealed*, which atomically swaps a completion sentinel into place and hands
//! every stored entry back to the sealer, exactly once. Entries added after
//! the sentinel is installed are refused and returned to the caller, which
//! **must** then invoke them itself (typically inline). This keeps the
//! exactly-once delivery guarantee without holding any lock across callback
//! invocations.
//!
//! The registry is deliberately value-agnostic: `fruition` instantiates it
//! once for completion entries and once for progress entries per operation.

use core::{
	num::NonZeroU64,
	sync::atomic::{AtomicU64, Ordering},
};
use std::fmt::{self, Debug, Formatter};

use parking_lot::Mutex;

/// An opaque removal handle for one registered entry.
///
/// Handles are only meaningful towards the registry that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(NonZeroU64);

enum Shape<C> {
	/// Accepting registrations.
	Open(Vec<(CallbackHandle, C)>),
	/// The completion sentinel: the registry has been drained for
	/// notification and refuses storage from now on.
	Sealed,
}

/// A FIFO registry of callbacks that seals itself at notification time.
pub struct Registry<C> {
	shape: Mutex<Shape<C>>,
	next_id: AtomicU64,
}

impl<C> Registry<C> {
	/// A fresh, open registry.
	#[must_use]
	pub const fn new() -> Self {
		Self {
			shape: Mutex::new(Shape::Open(Vec::new())),
			next_id: AtomicU64::new(1),
		}
	}

	/// A registry that is born sealed, for operations that are terminal from
	/// birth.
	#[must_use]
	pub const fn new_sealed() -> Self {
		Self {
			shape: Mutex::new(Shape::Sealed),
			next_id: AtomicU64::new(1),
		}
	}

	fn issue_handle(&self) -> CallbackHandle {
		// Relaxed: handles only need uniqueness, not ordering.
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		CallbackHandle(NonZeroU64::new(id).expect("unreachable: id counter wrapped"))
	}

	/// Appends `entry` in FIFO position.
	///
	/// **Returns** the removal handle, or `Err(entry)` when the sentinel is
	/// already installed; the caller then owns the invocation.
	pub fn add(&self, entry: C) -> Result<CallbackHandle, C> {
		let mut shape = self.shape.lock();
		match &mut *shape {
			Shape::Open(entries) => {
				let handle = self.issue_handle();
				entries.push((handle, entry));
				Ok(handle)
			}
			Shape::Sealed => Err(entry),
		}
	}

	/// Removes the entry registered under `handle`, if it is still stored.
	///
	/// **Returns** `None` once the entry has been handed out by
	/// [`seal`](`Registry::seal`) (it may be firing concurrently) or was
	/// already removed.
	pub fn remove(&self, handle: CallbackHandle) -> Option<C> {
		let mut shape = self.shape.lock();
		match &mut *shape {
			Shape::Open(entries) => entries
				.iter()
				.position(|(id, _)| *id == handle)
				.map(|index| entries.remove(index).1),
			Shape::Sealed => None,
		}
	}

	/// Installs the completion sentinel and drains all stored entries in
	/// registration order.
	///
	/// Idempotent: a second call yields an empty vector. Callers **must not**
	/// invoke the returned entries while holding locks whose acquisition
	/// could block state transitions.
	#[must_use]
	pub fn seal(&self) -> Vec<(CallbackHandle, C)> {
		let mut shape = self.shape.lock();
		match core::mem::replace(&mut *shape, Shape::Sealed) {
			Shape::Open(entries) => entries,
			Shape::Sealed => Vec::new(),
		}
	}

	/// Whether the sentinel is installed.
	#[must_use]
	pub fn is_sealed(&self) -> bool {
		matches!(&*self.shape.lock(), Shape::Sealed)
	}

	/// The number of currently stored entries.
	#[must_use]
	pub fn len(&self) -> usize {
		match &*self.shape.lock() {
			Shape::Open(entries) => entries.len(),
			Shape::Sealed => 0,
		}
	}

	/// Whether no entries are stored.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<C: Clone> Registry<C> {
	/// Clones out the current entries in registration order, without sealing.
	///
	/// Used for repeated fan-out (progress notifications), where entries stay
	/// registered and the invoker must not hold the registry lock while
	/// calling them.
	#[must_use]
	pub fn snapshot(&self) -> Vec<C> {
		match &*self.shape.lock() {
			Shape::Open(entries) => entries.iter().map(|(_, entry)| entry.clone()).collect(),
			Shape::Sealed => Vec::new(),
		}
	}
}

impl<C> Default for Registry<C> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C> Debug for Registry<C> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let shape = self.shape.lock();
		let (sealed, len) = match &*shape {
			Shape::Open(entries) => (false, entries.len()),
			Shape::Sealed => (true, 0),
		};
		f.debug_struct("Registry")
			.field("sealed", &sealed)
			.field("len", &len)
			.finish()
	}
}
