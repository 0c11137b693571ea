//! The shared timer thread behind [`delay`] and retry back-off.

use std::{
	cmp::Ordering as CmpOrdering,
	collections::BinaryHeap,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::OnceLock,
	thread,
	time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{error::panic_message, operation::Operation};

struct TimerEntry {
	deadline: Instant,
	/// Tie-breaker keeping same-deadline entries in scheduling order.
	sequence: u64,
	action: Box<dyn FnOnce() + Send>,
}

impl PartialEq for TimerEntry {
	fn eq(&self, other: &Self) -> bool {
		self.deadline == other.deadline && self.sequence == other.sequence
	}
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}

impl Ord for TimerEntry {
	fn cmp(&self, other: &Self) -> CmpOrdering {
		// Reversed: the binary heap is a max-heap, the earliest deadline must
		// surface first.
		other
			.deadline
			.cmp(&self.deadline)
			.then_with(|| other.sequence.cmp(&self.sequence))
	}
}

struct TimerQueue {
	entries: Mutex<(BinaryHeap<TimerEntry>, u64)>,
	changed: Condvar,
}

impl TimerQueue {
	fn run(&self) {
		loop {
			let action = {
				let mut entries = self.entries.lock();
				loop {
					match entries.0.peek() {
						None => self.changed.wait(&mut entries),
						Some(entry) if entry.deadline <= Instant::now() => {
							break entries.0.pop().expect("unreachable: peeked").action;
						}
						Some(entry) => {
							let deadline = entry.deadline;
							self.changed.wait_until(&mut entries, deadline);
						}
					}
				}
			};
			if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
				tracing::error!(
					panic = panic_message(payload.as_ref()),
					"timer action panicked; isolated"
				);
			}
		}
	}
}

fn timer() -> &'static TimerQueue {
	static TIMER: OnceLock<TimerQueue> = OnceLock::new();
	TIMER.get_or_init(|| {
		let queue = TimerQueue {
			entries: Mutex::new((BinaryHeap::new(), 0)),
			changed: Condvar::new(),
		};
		thread::Builder::new()
			.name("fruition-timer".to_owned())
			.spawn(|| timer().run())
			.expect("unreachable: timer thread failed to spawn");
		queue
	})
}

/// Runs `action` on the timer thread once `after` elapsed.
pub(crate) fn schedule(after: Duration, action: impl FnOnce() + Send + 'static) {
	let queue = timer();
	let mut entries = queue.entries.lock();
	let sequence = entries.1;
	entries.1 += 1;
	entries.0.push(TimerEntry {
		deadline: Instant::now() + after,
		sequence,
		action: Box::new(action),
	});
	drop(entries);
	queue.changed.notify_one();
}

/// How often in-flight delays refresh their reported progress.
const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// An operation that completes once `duration` elapsed.
///
/// Driven by a shared timer thread. Progress interpolates the elapsed
/// fraction, refreshed at most ten times per second. Cancellation takes
/// effect without waiting out the remainder.
#[must_use]
pub fn delay(duration: Duration) -> Operation<()> {
	let target = Operation::new();
	target.try_set_running();
	if duration.is_zero() {
		target.try_set_result(());
		return target;
	}
	{
		let canceled = target.clone();
		target.set_cancel_action(Box::new(move || {
			canceled.try_set_canceled();
		}));
	}
	let started = Instant::now();
	{
		let target = target.clone();
		schedule(duration, move || {
			target.try_set_result(());
		});
	}
	if duration > PROGRESS_TICK {
		progress_tick(target.clone(), started, duration);
	}
	target
}

fn progress_tick(target: Operation<()>, started: Instant, total: Duration) {
	schedule(PROGRESS_TICK, move || {
		if target.is_completed() {
			return;
		}
		let fraction = (started.elapsed().as_secs_f32() / total.as_secs_f32()).min(1.0);
		target.try_set_progress(fraction).ok();
		progress_tick(target, started, total);
	});
}
