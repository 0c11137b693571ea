#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! All three modules are freely usable from any thread. No lock is ever held
//! across a callback invocation; see the module docs for the exact protocol
//! each type follows.

pub mod context;
pub mod registry;
pub mod state;

#[doc = include_str!("../README.md")]
mod readme {}
