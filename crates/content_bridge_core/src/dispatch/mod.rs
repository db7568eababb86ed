//! Name-routed entry point for boundary calls.
//!
//! # Responsibility
//! - Decode call arguments and route each call to exactly one operation.
//! - Normalize every failure into one error envelope.
//!
//! # Invariants
//! - Unknown call names yield `NotImplemented`, never an error.
//! - A failing call never leaves a buffer it produced live.

mod dispatcher;
mod value;

pub use dispatcher::{RequestDispatcher, Route};
pub use value::{CallValue, MethodCall, MethodResponse, ERROR_CODE_EXCEPTION, ERROR_MESSAGE};
