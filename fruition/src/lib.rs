#![warn(clippy::pedantic)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]

mod error;
pub use error::{CallbackPanicked, Fault, OperationError};

mod operation;
pub use operation::{CallbackHandle, Operation};

mod future;
pub use future::{AwaitOptions, OperationFuture};

mod combine;
pub use combine::{retry, sequence, when_all, when_any, ContinuationOptions, Then};

mod timer;
pub use timer::delay;

mod queue;
pub use queue::SerialQueue;

mod update;
pub use update::{update_delay, ManualUpdateSource, Updatable, UpdateSource};

pub use pedicel::{
	context::{
		ambient_context, default_pool, set_ambient_context, with_ambient_context,
		ContextDescriptor, ContextRef, ExecutionContext, InlineContext, Job,
	},
	state::Status,
};
