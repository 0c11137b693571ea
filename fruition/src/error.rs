//! Failure payloads and the public error type.

use std::{any::Any, error::Error, fmt::Write as _, sync::Arc};

use pedicel::state::Status;

/// A single captured failure, shared between an operation and everything
/// observing it.
pub type Fault = Arc<dyn Error + Send + Sync>;

/// Why an operation did not yield a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OperationError {
	/// The operation faulted with one or more captured errors, in the order
	/// they were observed.
	#[error("operation faulted: {}", fault_list(.faults))]
	Faulted {
		/// The captured faults, first-seen first.
		faults: Vec<Fault>,
	},

	/// The operation was cooperatively cancelled.
	#[error("operation was canceled")]
	Canceled {
		/// The carried cancellation error, if any.
		fault: Option<Fault>,
	},

	/// A loud producer call requested a transition the current status
	/// forbids.
	#[error("transition not allowed from status {status:?}")]
	InvalidState {
		/// The status at the time of the call.
		status: Status,
	},

	/// The call requires a live (undisposed) operation.
	#[error("operation was disposed")]
	Disposed,

	/// An argument fell outside its allowed range.
	#[error("argument out of range: {what}")]
	ArgumentOutOfRange {
		/// What was out of range.
		what: &'static str,
	},

	/// A bounded join gave up before the operation turned terminal.
	#[error("timed out waiting for completion")]
	Timeout,
}

impl OperationError {
	/// The first captured fault, if this error carries any.
	#[must_use]
	pub fn fault(&self) -> Option<&Fault> {
		match self {
			OperationError::Faulted { faults } => faults.first(),
			OperationError::Canceled { fault } => fault.as_ref(),
			_ => None,
		}
	}
}

fn fault_list(faults: &[Fault]) -> String {
	let mut list = String::new();
	for (index, fault) in faults.iter().enumerate() {
		if index > 0 {
			list.push_str("; ");
		}
		write!(list, "{fault}").expect("unreachable: writing to a String");
	}
	list
}

/// A panic caught inside a user callback or combinator body, rendered as a
/// [`Fault`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("callback panicked: {message}")]
pub struct CallbackPanicked {
	/// The panic message, where one could be extracted.
	pub message: String,
}

pub(crate) fn panic_fault(payload: Box<dyn Any + Send>) -> Fault {
	Arc::new(CallbackPanicked {
		message: panic_message(payload.as_ref()).to_owned(),
	})
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		message
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message
	} else {
		"opaque panic payload"
	}
}
