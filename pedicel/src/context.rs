//! Execution contexts: where posted callbacks run.
//!
//! A *context* is anything that can accept a [`Job`] for later execution,
//! such as a worker pool or an event loop. Registrations carry a
//! [`ContextDescriptor`] naming the caller's dispatch policy, which is
//! resolved to a [`ResolvedContext`] *at registration time*: `Captured`
//! snapshots the ambient context of the registering thread (and degrades to
//! inline when none is attached), `Default` resolves to the shared worker
//! pool.
//!
//! Host adapters attach their loop to a thread by setting the ambient slot,
//! either permanently via [`set_ambient_context`] or scoped via
//! [`with_ambient_context`].

use std::{
	any::Any,
	cell::RefCell,
	collections::VecDeque,
	fmt::{self, Debug, Formatter},
	num::NonZeroUsize,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{Arc, OnceLock},
	thread,
};

use parking_lot::{Condvar, Mutex};
use scopeguard::defer;

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send>;

/// A dispatcher that callbacks can be posted onto.
///
/// # Logic
///
/// Implementations **must** eventually run every accepted job exactly once,
/// and **must not** run jobs re-entrantly from within `post`. Jobs posted
/// from the same thread **should** run in posting order.
pub trait ExecutionContext: Send + Sync {
	/// Accepts `job` for later execution.
	fn post(&self, job: Job);
}

/// A shared handle to an [`ExecutionContext`].
pub type ContextRef = Arc<dyn ExecutionContext>;

/// A caller-chosen dispatch policy, carried by callback registrations.
#[derive(Clone, Default)]
pub enum ContextDescriptor {
	/// Invoke on whichever thread triggers the notification, synchronously.
	Inline,
	/// Invoke on the context ambient at *registration* time; inline when the
	/// registering thread has none attached.
	#[default]
	Captured,
	/// Post to the shared worker pool.
	Default,
	/// Post to the given context.
	Specific(ContextRef),
}

impl ContextDescriptor {
	/// Resolves the policy against the calling thread's ambient context.
	#[must_use]
	pub fn resolve(&self) -> ResolvedContext {
		match self {
			ContextDescriptor::Inline => ResolvedContext::Inline,
			ContextDescriptor::Captured => match ambient_context() {
				Some(context) => ResolvedContext::Posted(context),
				None => ResolvedContext::Inline,
			},
			ContextDescriptor::Default => ResolvedContext::Posted(default_pool()),
			ContextDescriptor::Specific(context) => ResolvedContext::Posted(context.clone()),
		}
	}
}

impl Debug for ContextDescriptor {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			ContextDescriptor::Inline => f.write_str("Inline"),
			ContextDescriptor::Captured => f.write_str("Captured"),
			ContextDescriptor::Default => f.write_str("Default"),
			ContextDescriptor::Specific(_) => f.write_str("Specific(..)"),
		}
	}
}

/// A [`ContextDescriptor`] with `Captured`/`Default` pinned down.
#[derive(Clone)]
pub enum ResolvedContext {
	/// Run on the notifying thread.
	Inline,
	/// Post to this context.
	Posted(ContextRef),
}

impl ResolvedContext {
	/// Runs or posts `job` per this resolution.
	pub fn dispatch(&self, job: Job) {
		match self {
			ResolvedContext::Inline => job(),
			ResolvedContext::Posted(context) => context.post(job),
		}
	}

	/// Whether this resolution runs jobs on the notifying thread.
	#[must_use]
	pub fn is_inline(&self) -> bool {
		matches!(self, ResolvedContext::Inline)
	}
}

impl Debug for ResolvedContext {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			ResolvedContext::Inline => f.write_str("Inline"),
			ResolvedContext::Posted(_) => f.write_str("Posted(..)"),
		}
	}
}

thread_local! {
	static AMBIENT: RefCell<Option<ContextRef>> = const { RefCell::new(None) };
}

/// Attaches `context` as this thread's ambient context.
///
/// **Returns** the previously attached context, if any. Pass `None` to
/// detach.
pub fn set_ambient_context(context: Option<ContextRef>) -> Option<ContextRef> {
	AMBIENT.with(|slot| slot.replace(context))
}

/// The context attached to the current thread, if any.
#[must_use]
pub fn ambient_context() -> Option<ContextRef> {
	AMBIENT.with(|slot| slot.borrow().clone())
}

/// Runs `f` with `context` attached as the ambient context, restoring the
/// previous attachment afterwards (also on unwind).
pub fn with_ambient_context<T>(context: ContextRef, f: impl FnOnce() -> T) -> T {
	let previous = set_ambient_context(Some(context));
	defer! {
		set_ambient_context(previous);
	}
	f()
}

/// An [`ExecutionContext`] that runs each job immediately on the posting
/// thread.
///
/// Useful where an owner demands a [`ContextRef`] but inline execution is
/// wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineContext;

impl ExecutionContext for InlineContext {
	fn post(&self, job: Job) {
		job();
	}
}

struct WorkerPool {
	queue: Mutex<VecDeque<Job>>,
	available: Condvar,
}

impl WorkerPool {
	fn run_worker(pool: &WorkerPool) {
		loop {
			let job = {
				let mut queue = pool.queue.lock();
				loop {
					match queue.pop_front() {
						Some(job) => break job,
						None => pool.available.wait(&mut queue),
					}
				}
			};
			if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
				tracing::error!(
					panic = describe_panic(&payload),
					"posted job panicked; isolated"
				);
			}
		}
	}
}

impl ExecutionContext for WorkerPool {
	fn post(&self, job: Job) {
		self.queue.lock().push_back(job);
		self.available.notify_one();
	}
}

/// The shared worker pool that [`ContextDescriptor::Default`] posts to.
///
/// Started lazily on first use; sized to the available parallelism, capped at
/// four threads. Job panics are isolated per job and reported through
/// `tracing`.
#[must_use]
pub fn default_pool() -> ContextRef {
	static POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();
	POOL.get_or_init(|| {
		let pool = Arc::new(WorkerPool {
			queue: Mutex::new(VecDeque::new()),
			available: Condvar::new(),
		});
		let workers = thread::available_parallelism()
			.map_or(1, NonZeroUsize::get)
			.min(4);
		for index in 0..workers {
			let pool = Arc::clone(&pool);
			thread::Builder::new()
				.name(format!("pedicel-pool-{index}"))
				.spawn(move || WorkerPool::run_worker(&pool))
				.expect("unreachable: worker thread failed to spawn");
		}
		pool
	})
	.clone()
}

pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> &str {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		message
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message
	} else {
		"opaque panic payload"
	}
}
