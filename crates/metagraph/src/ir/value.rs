use std::fmt;

use serde::{Deserialize, Serialize};

use crate::composite::{MetaFuncGraph, MetaGraph};

use super::graph::GraphId;
use super::primitive::Primitive;

/// Constant embedded in a value node.
///
/// Graph references are non-owning: the referenced graph lives in the same
/// [`GraphStore`](super::GraphStore) and is addressed by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// IEEE-754 bit pattern so values stay hashable.
    Float(u64),
    Str(String),
    Tuple(Vec<Value>),
    Graph(GraphId),
    Primitive(Primitive),
    Meta(MetaGraph),
    /// Reference to an externally registered type-dispatched function.
    Multitype(String),
}

impl Value {
    pub fn float(value: f64) -> Self {
        Value::Float(value.to_bits())
    }

    pub fn empty_tuple() -> Self {
        Value::Tuple(Vec::new())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(bits) => Some(f64::from_bits(*bits)),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(prim) => Some(prim),
            _ => None,
        }
    }

    pub fn as_graph(&self) -> Option<GraphId> {
        match self {
            Value::Graph(graph) => Some(*graph),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Short name used when deriving generator names (`hyper_map[<leaf>]`).
    pub fn name(&self) -> String {
        match self {
            Value::Primitive(prim) => prim.name().to_string(),
            Value::Meta(meta) => meta.name(),
            Value::Multitype(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            Value::Str(value) => write!(f, "{value:?}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Graph(graph) => write!(f, "@g{}", graph.0),
            Value::Primitive(prim) => write!(f, "{prim}"),
            Value::Meta(meta) => write!(f, "meta::{}", meta.name()),
            Value::Multitype(name) => write!(f, "multitype::{name}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        Value::Primitive(value)
    }
}

impl From<MetaGraph> for Value {
    fn from(value: MetaGraph) -> Self {
        Value::Meta(value)
    }
}
