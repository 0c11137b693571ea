//! The packed completion-state word and its transition protocol.
//!
//! A [`StateWord`] packs an operation's [`Status`] and its flag bits into one
//! [`AtomicUsize`], so that every observable transition is a single
//! compare-and-swap. Terminal transitions are two-phase: a producer first
//! *claims* completion (setting [`COMPLETING`](`StateWord`)), writes its
//! payload elsewhere, then *commits*, which publishes the terminal status
//! together with the completed bit in one store.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::fmt::{self, Debug, Formatter};

/// The low bits of the state word carrying the [`Status`] discriminant.
const STATUS_MASK: usize = 0b111;

/// Set while exactly one producer holds the right to complete the operation.
///
/// The holder **must** write the outcome payload before committing. While this
/// bit is set, all other terminal and non-terminal transitions fail.
const COMPLETING: usize = 1 << 3;

/// Set atomically together with the terminal status. Never cleared.
const COMPLETED: usize = 1 << 4;

/// Set iff the terminal transition happened on the thread that created the
/// operation.
const SYNCHRONOUS: usize = 1 << 5;

/// Set once the operation has been disposed. Requires [`COMPLETED`].
const DISPOSED: usize = 1 << 6;

/// Marks shared singleton operations whose disposal is a no-op.
const DO_NOT_DISPOSE: usize = 1 << 7;

/// Set by the first cancellation request. Purely cooperative.
const CANCELLATION_REQUESTED: usize = 1 << 8;

/// An operation's position in its lifecycle.
///
/// The discriminants are ordered: non-terminal transitions **must** be
/// monotonic along `Created → Scheduled → Running`, and any non-terminal
/// status may jump directly to any of the three terminal ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum Status {
	/// Constructed, not yet scheduled or running.
	Created = 0,
	/// Queued for execution (for example on a serial queue).
	Scheduled = 1,
	/// Being driven by a producer.
	Running = 2,
	/// Terminal: succeeded.
	RanToCompletion = 3,
	/// Terminal: failed with one or more faults.
	Faulted = 4,
	/// Terminal: cooperatively cancelled.
	Canceled = 5,
}

impl Status {
	/// Whether this status is one of the three terminal ones.
	#[must_use]
	pub fn is_terminal(self) -> bool {
		self >= Status::RanToCompletion
	}

	fn from_bits(bits: usize) -> Self {
		match bits & STATUS_MASK {
			0 => Status::Created,
			1 => Status::Scheduled,
			2 => Status::Running,
			3 => Status::RanToCompletion,
			4 => Status::Faulted,
			5 => Status::Canceled,
			_ => unreachable!("invalid status bits"),
		}
	}
}

/// The packed status/flags word.
///
/// # Logic
///
/// Exactly one [`try_claim_completion`](`StateWord::try_claim_completion`)
/// call over the lifetime of a word returns a claim that is then committed.
/// Payload storage written between the claim and [`CompletionClaim::commit`]
/// is published to any thread that observes
/// [`is_completed`](`StateWord::is_completed`) as `true`, because the commit
/// stores with `Release` ordering and completion reads load with `Acquire`.
pub struct StateWord(AtomicUsize);

impl StateWord {
	/// A fresh word in [`Status::Created`] with no flags set.
	#[must_use]
	pub const fn new() -> Self {
		Self(AtomicUsize::new(Status::Created as usize))
	}

	/// A word that is already terminal, as used by completed-from-birth
	/// operations. `synchronous` is set unconditionally.
	#[must_use]
	pub fn new_terminal(status: Status) -> Self {
		assert!(status.is_terminal());
		Self(AtomicUsize::new(status as usize | COMPLETED | SYNCHRONOUS))
	}

	/// The current [`Status`].
	#[must_use]
	pub fn status(&self) -> Status {
		Status::from_bits(self.0.load(Ordering::Acquire))
	}

	/// Whether a terminal transition has been committed.
	#[must_use]
	pub fn is_completed(&self) -> bool {
		self.0.load(Ordering::Acquire) & COMPLETED != 0
	}

	/// Whether the terminal transition happened on the creating thread.
	#[must_use]
	pub fn completed_synchronously(&self) -> bool {
		self.0.load(Ordering::Acquire) & SYNCHRONOUS != 0
	}

	/// Whether cancellation has been requested.
	#[must_use]
	pub fn is_cancellation_requested(&self) -> bool {
		self.0.load(Ordering::Relaxed) & CANCELLATION_REQUESTED != 0
	}

	/// Whether the word has been marked disposed.
	#[must_use]
	pub fn is_disposed(&self) -> bool {
		self.0.load(Ordering::Acquire) & DISPOSED != 0
	}

	/// Whether disposal is suppressed for this word.
	#[must_use]
	pub fn is_do_not_dispose(&self) -> bool {
		self.0.load(Ordering::Relaxed) & DO_NOT_DISPOSE != 0
	}

	/// Suppresses disposal. Used for shared singleton operations.
	pub fn set_do_not_dispose(&self) {
		self.0.fetch_or(DO_NOT_DISPOSE, Ordering::Relaxed);
	}

	/// Monotonically upgrades the status to `target`.
	///
	/// **Returns** `false` without any effect if the current status is already
	/// at or beyond `target`, or if a completion claim or commit happened.
	/// Failures are expected and are not errors.
	///
	/// # Panics
	///
	/// Panics if `target` is terminal; terminal transitions go through
	/// [`try_claim_completion`](`StateWord::try_claim_completion`).
	pub fn try_upgrade(&self, target: Status) -> bool {
		assert!(!target.is_terminal());
		let mut current = self.0.load(Ordering::Acquire);
		loop {
			if current & (COMPLETING | COMPLETED) != 0
				|| Status::from_bits(current) >= target
			{
				return false;
			}
			let next = (current & !STATUS_MASK) | target as usize;
			match self.0.compare_exchange_weak(
				current,
				next,
				Ordering::AcqRel,
				Ordering::Acquire,
			) {
				Ok(_) => return true,
				Err(now) => current = now,
			}
		}
	}

	/// Claims the exclusive right to complete this word.
	///
	/// At most one claim ever succeeds (unless an earlier claim was abandoned
	/// by dropping it uncommitted). The holder **must** write the outcome
	/// payload before calling [`CompletionClaim::commit`].
	pub fn try_claim_completion(&self) -> Option<CompletionClaim<'_>> {
		let mut current = self.0.load(Ordering::Acquire);
		loop {
			if current & (COMPLETING | COMPLETED) != 0 {
				return None;
			}
			match self.0.compare_exchange_weak(
				current,
				current | COMPLETING,
				Ordering::AcqRel,
				Ordering::Acquire,
			) {
				Ok(_) => return Some(CompletionClaim { word: self, committed: false }),
				Err(now) => current = now,
			}
		}
	}

	/// Requests cooperative cancellation.
	///
	/// **Returns** whether this call was the one that set the flag, which
	/// makes `cancel` idempotent for callers.
	pub fn request_cancellation(&self) -> bool {
		self.0.fetch_or(CANCELLATION_REQUESTED, Ordering::AcqRel) & CANCELLATION_REQUESTED == 0
	}

	/// Marks the word disposed.
	///
	/// **Returns** `false` when the word is not yet terminal (disposal is then
	/// refused), `true` otherwise. Idempotent; a repeat call is a successful
	/// no-op.
	pub fn try_mark_disposed(&self) -> bool {
		let mut current = self.0.load(Ordering::Acquire);
		loop {
			if current & COMPLETED == 0 {
				return false;
			}
			if current & DISPOSED != 0 {
				return true;
			}
			match self.0.compare_exchange_weak(
				current,
				current | DISPOSED,
				Ordering::AcqRel,
				Ordering::Acquire,
			) {
				Ok(_) => return true,
				Err(now) => current = now,
			}
		}
	}
}

impl Default for StateWord {
	fn default() -> Self {
		Self::new()
	}
}

impl Debug for StateWord {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let bits = self.0.load(Ordering::Acquire);
		f.debug_struct("StateWord")
			.field("status", &Status::from_bits(bits))
			.field("completed", &(bits & COMPLETED != 0))
			.field("completing", &(bits & COMPLETING != 0))
			.field("synchronous", &(bits & SYNCHRONOUS != 0))
			.field("disposed", &(bits & DISPOSED != 0))
			.field(
				"cancellation_requested",
				&(bits & CANCELLATION_REQUESTED != 0),
			)
			.finish()
	}
}

/// The witness of a successful completion claim.
///
/// Dropping a claim uncommitted abandons it and clears
/// [`COMPLETING`](`StateWord`), so other producers may try again. This only
/// happens when payload preparation unwinds.
pub struct CompletionClaim<'a> {
	word: &'a StateWord,
	committed: bool,
}

impl CompletionClaim<'_> {
	/// Publishes the terminal `status` and the completed bit in one store.
	///
	/// # Panics
	///
	/// Panics if `status` is not terminal.
	pub fn commit(mut self, status: Status, synchronous: bool) {
		assert!(status.is_terminal());
		self.committed = true;
		let mut current = self.word.0.load(Ordering::Relaxed);
		loop {
			let mut next =
				(current & !(STATUS_MASK | COMPLETING)) | status as usize | COMPLETED;
			if synchronous {
				next |= SYNCHRONOUS;
			}
			match self.word.0.compare_exchange_weak(
				current,
				next,
				Ordering::Release,
				Ordering::Relaxed,
			) {
				Ok(_) => return,
				Err(now) => current = now,
			}
		}
	}
}

impl Drop for CompletionClaim<'_> {
	fn drop(&mut self) {
		if !self.committed {
			self.word.0.fetch_and(!COMPLETING, Ordering::AcqRel);
		}
	}
}

impl Debug for CompletionClaim<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("CompletionClaim")
			.field("committed", &self.committed)
			.finish_non_exhaustive()
	}
}
