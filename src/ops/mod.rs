//! # Operation abstractions.
//!
//! - [`Operation`] - trait for implementing async cancelable operations
//! - [`OpFn`] - function-backed implementation
//! - [`OpRef`] - shared handle to an operation (`Arc<dyn Operation>`)

mod op_fn;
mod operation;

pub use op_fn::OpFn;
pub use operation::{OpRef, Operation};
