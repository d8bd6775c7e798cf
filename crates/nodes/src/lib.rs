//! `nodes` crate: the `ExecutableNode` trait, input/output types, the retry
//! wrapper and built-in node implementations.
//!
//! Every unit computation, built-in or caller-supplied, must implement
//! [`ExecutableNode`].  The engine crate dispatches execution through this
//! trait object.

pub mod builtin;
pub mod error;
pub mod io;
pub mod mock;
pub mod retry;
pub mod traits;

pub use builtin::NodeRegistry;
pub use error::NodeError;
pub use io::{Inputs, Outputs};
pub use retry::{RetryPolicy, Retrying};
pub use traits::{ExecutableNode, ExecutionContext, FnNode};
