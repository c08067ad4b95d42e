pub mod abstract_value;
pub mod composite;
pub mod context;
pub mod error;
pub mod ir;
pub mod session;
pub mod settings;

pub use abstract_value::{AbstractFunction, AbstractKind, AbstractValue, DType, ScalarType};
pub use composite::{MetaFuncGraph, MetaGraph};
pub use error::{CompositeError, ErrorKind, Result};
pub use ir::{GraphFlag, GraphId, GraphStore, NodeId, Primitive, Value};
pub use session::GraphSession;
