//! `engine` crate: component model, input resolution, validation and the
//! execution driver.

pub mod definition;
mod driver;
pub mod error;
pub mod node;
pub mod reference;
pub mod resolver;
pub mod store;
pub mod validate;
pub mod workflow;

pub use definition::{NodeDefinition, WorkflowDefinition};
pub use error::{EngineError, FailureDetails};
pub use node::{ExecutionMode, Group, Logic, LogicKind, Node, NodeKind, Subflow, Unit};
pub use reference::{Binding, Reference};
pub use store::{OutputStore, StoreView};
pub use validate::validate;
pub use workflow::{NodeExecution, NodeStatus, RunState, Workflow};
