//! Functional graph IR consumed and produced by the generators.
//!
//! The IR is deliberately small: graphs of parameters, constants and calls
//! held in a single [`GraphStore`] arena, plus named [`Primitive`] markers. It
//! carries exactly what the composite generators need to wire call sites.
pub mod graph;
pub mod primitive;
pub mod text;
pub mod topology;
pub mod value;

pub use graph::{FuncGraph, GraphFlag, GraphId, GraphStore, Node, NodeId, NodeKind};
pub use primitive::Primitive;
pub use text::GraphDisplay;
pub use topology::{free_variables, validate_closure, ClosureError};
pub use value::Value;
