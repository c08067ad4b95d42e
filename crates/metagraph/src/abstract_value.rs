//! Static description of generator arguments.
//!
//! Generators dispatch on the *shape* of their argument signature (a tuple of
//! three elements, a list, a constant integer) and never on runtime data. This
//! module provides the small lattice they need: structural kind, statically
//! known value, broadening and joining.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::composite::{MetaFuncGraph, MetaGraph};
use crate::context;
use crate::error::{CompositeError, Result};
use crate::ir::{GraphId, Primitive, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    Int64,
    Float32,
    Float64,
    String,
    /// Opaque environment handle threaded through backward graphs.
    EnvType,
}

impl ScalarType {
    pub fn is_number(self) -> bool {
        matches!(
            self,
            ScalarType::Bool | ScalarType::Int64 | ScalarType::Float32 | ScalarType::Float64
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Bool,
    I32,
    I64,
    F16,
    F32,
    F64,
}

/// Structural kind of an abstract value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractKind {
    Scalar,
    Tensor,
    Tuple,
    List,
    Slice,
    None,
    Function,
    Env,
    Undetermined,
}

impl AbstractKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AbstractKind::Scalar => "Scalar",
            AbstractKind::Tensor => "Tensor",
            AbstractKind::Tuple => "Tuple",
            AbstractKind::List => "List",
            AbstractKind::Slice => "Slice",
            AbstractKind::None => "None",
            AbstractKind::Function => "Function",
            AbstractKind::Env => "Env",
            AbstractKind::Undetermined => "Undetermined",
        }
    }
}

/// Callable abstract values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractFunction {
    /// Closure over a concrete graph.
    Graph(GraphId),
    Primitive(Primitive),
    Meta(MetaGraph),
    Partial {
        func: Box<AbstractFunction>,
        args: Vec<AbstractValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractValue {
    Scalar {
        ty: ScalarType,
        /// `None` when the value is only known at run time.
        value: Option<Value>,
        mutable: bool,
    },
    Tensor {
        dtype: DType,
        /// `None` entries are dynamic dimensions.
        shape: Vec<Option<usize>>,
    },
    Tuple(Vec<AbstractValue>),
    List(Vec<AbstractValue>),
    Slice {
        start: Box<AbstractValue>,
        stop: Box<AbstractValue>,
        step: Box<AbstractValue>,
    },
    None,
    Function(AbstractFunction),
    Env,
    /// Type not inferred yet (e.g. inside a recursive call being specialized).
    Undetermined,
}

impl AbstractValue {
    pub fn int(value: i64) -> Self {
        AbstractValue::Scalar {
            ty: ScalarType::Int64,
            value: Some(Value::Int(value)),
            mutable: false,
        }
    }

    pub fn float(value: f64) -> Self {
        AbstractValue::Scalar {
            ty: ScalarType::Float32,
            value: Some(Value::float(value)),
            mutable: false,
        }
    }

    pub fn bool(value: bool) -> Self {
        AbstractValue::Scalar {
            ty: ScalarType::Bool,
            value: Some(Value::Bool(value)),
            mutable: false,
        }
    }

    /// Scalar of the given type whose value is unknown.
    pub fn scalar_any(ty: ScalarType) -> Self {
        AbstractValue::Scalar {
            ty,
            value: None,
            mutable: false,
        }
    }

    /// Constant scalar that still broadens to an unknown value.
    pub fn mutable_int(value: i64) -> Self {
        AbstractValue::Scalar {
            ty: ScalarType::Int64,
            value: Some(Value::Int(value)),
            mutable: true,
        }
    }

    pub fn tensor(dtype: DType, dims: &[usize]) -> Self {
        AbstractValue::Tensor {
            dtype,
            shape: dims.iter().copied().map(Some).collect(),
        }
    }

    pub fn tuple(elements: impl Into<Vec<AbstractValue>>) -> Self {
        AbstractValue::Tuple(elements.into())
    }

    pub fn list(elements: impl Into<Vec<AbstractValue>>) -> Self {
        AbstractValue::List(elements.into())
    }

    /// Slice with optional constant members; `None` members are unset.
    pub fn slice(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        let member = |value: Option<i64>| Box::new(value.map_or(AbstractValue::None, AbstractValue::int));
        AbstractValue::Slice {
            start: member(start),
            stop: member(stop),
            step: member(step),
        }
    }

    pub fn graph(graph: GraphId) -> Self {
        AbstractValue::Function(AbstractFunction::Graph(graph))
    }

    pub fn kind(&self) -> AbstractKind {
        match self {
            AbstractValue::Scalar { .. } => AbstractKind::Scalar,
            AbstractValue::Tensor { .. } => AbstractKind::Tensor,
            AbstractValue::Tuple(_) => AbstractKind::Tuple,
            AbstractValue::List(_) => AbstractKind::List,
            AbstractValue::Slice { .. } => AbstractKind::Slice,
            AbstractValue::None => AbstractKind::None,
            AbstractValue::Function(_) => AbstractKind::Function,
            AbstractValue::Env => AbstractKind::Env,
            AbstractValue::Undetermined => AbstractKind::Undetermined,
        }
    }

    /// Elements of a tuple or list.
    pub fn elements(&self) -> Option<&[AbstractValue]> {
        match self {
            AbstractValue::Tuple(elements) | AbstractValue::List(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.elements().is_some()
    }

    /// Tensor-shaped or not-yet-inferred values.
    pub fn is_undetermined(&self) -> bool {
        matches!(self, AbstractValue::Tensor { .. } | AbstractValue::Undetermined)
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            AbstractValue::Scalar { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    /// Statically known value, or `None` when it is only known at run time.
    pub fn build_value(&self) -> Option<Value> {
        match self {
            AbstractValue::Scalar { value, .. } => value.clone(),
            AbstractValue::Tuple(elements) | AbstractValue::List(elements) => elements
                .iter()
                .map(AbstractValue::build_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Tuple),
            AbstractValue::None => Some(Value::None),
            AbstractValue::Function(AbstractFunction::Graph(graph)) => Some(Value::Graph(*graph)),
            AbstractValue::Function(AbstractFunction::Primitive(prim)) => {
                Some(Value::Primitive(prim.clone()))
            }
            AbstractValue::Function(AbstractFunction::Meta(meta)) => Some(Value::Meta(meta.clone())),
            AbstractValue::Function(AbstractFunction::Partial { .. })
            | AbstractValue::Tensor { .. }
            | AbstractValue::Slice { .. }
            | AbstractValue::Env
            | AbstractValue::Undetermined => None,
        }
    }

    /// Erases statically known values while keeping type and shape.
    ///
    /// Scalars keep their value unless grad-for-scalar is enabled or the scalar
    /// is mutable, so constant indices still specialize generated graphs.
    pub fn broaden(&self) -> AbstractValue {
        match self {
            AbstractValue::Scalar { ty, value, mutable } => {
                let erase = context::grad_for_scalar() || *mutable || *ty == ScalarType::EnvType;
                AbstractValue::Scalar {
                    ty: *ty,
                    value: if erase { None } else { value.clone() },
                    mutable: *mutable,
                }
            }
            AbstractValue::Tuple(elements) => {
                AbstractValue::Tuple(elements.iter().map(AbstractValue::broaden).collect())
            }
            AbstractValue::List(elements) => {
                AbstractValue::List(elements.iter().map(AbstractValue::broaden).collect())
            }
            AbstractValue::Slice { start, stop, step } => AbstractValue::Slice {
                start: Box::new(start.broaden()),
                stop: Box::new(stop.broaden()),
                step: Box::new(step.broaden()),
            },
            other => other.clone(),
        }
    }

    /// Least upper bound of two abstract values.
    pub fn join(&self, other: &AbstractValue) -> Result<AbstractValue> {
        if self == other {
            return Ok(self.clone());
        }
        match (self, other) {
            (
                AbstractValue::Scalar { ty, mutable, .. },
                AbstractValue::Scalar {
                    ty: other_ty,
                    mutable: other_mutable,
                    ..
                },
            ) if ty == other_ty => Ok(AbstractValue::Scalar {
                ty: *ty,
                value: None,
                mutable: *mutable || *other_mutable,
            }),
            (
                AbstractValue::Tensor { dtype, shape },
                AbstractValue::Tensor {
                    dtype: other_dtype,
                    shape: other_shape,
                },
            ) => {
                if dtype != other_dtype {
                    return Err(CompositeError::type_error(format!(
                        "cannot join tensors of dtype {dtype:?} and {other_dtype:?}"
                    )));
                }
                if shape.len() != other_shape.len() {
                    return Err(CompositeError::value(format!(
                        "cannot join tensors of rank {} and {}",
                        shape.len(),
                        other_shape.len()
                    )));
                }
                let shape = shape
                    .iter()
                    .zip(other_shape)
                    .map(|(lhs, rhs)| if lhs == rhs { *lhs } else { None })
                    .collect();
                Ok(AbstractValue::Tensor {
                    dtype: *dtype,
                    shape,
                })
            }
            (AbstractValue::Tuple(lhs), AbstractValue::Tuple(rhs)) => {
                Ok(AbstractValue::Tuple(join_elements(lhs, rhs)?))
            }
            (AbstractValue::List(lhs), AbstractValue::List(rhs)) => {
                Ok(AbstractValue::List(join_elements(lhs, rhs)?))
            }
            _ => Err(CompositeError::type_error(format!(
                "cannot join abstract values {self} and {other}"
            ))),
        }
    }
}

fn join_elements(lhs: &[AbstractValue], rhs: &[AbstractValue]) -> Result<Vec<AbstractValue>> {
    if lhs.len() != rhs.len() {
        return Err(CompositeError::value(format!(
            "cannot join sequences of length {} and {}",
            lhs.len(),
            rhs.len()
        )));
    }
    lhs.iter().zip(rhs).map(|(l, r)| l.join(r)).collect()
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Scalar { ty, value, .. } => match value {
                Some(value) => write!(f, "{ty:?}({value})"),
                None => write!(f, "{ty:?}(AnyValue)"),
            },
            AbstractValue::Tensor { dtype, shape } => {
                let dims = shape
                    .iter()
                    .map(|dim| dim.map_or_else(|| "-1".to_string(), |d| d.to_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Tensor[{dtype:?}]({dims})")
            }
            AbstractValue::Tuple(elements) => write!(f, "Tuple{}", format_elements(elements)),
            AbstractValue::List(elements) => write!(f, "List{}", format_elements(elements)),
            AbstractValue::Slice { start, stop, step } => {
                write!(f, "Slice({start}, {stop}, {step})")
            }
            AbstractValue::None => write!(f, "None"),
            AbstractValue::Function(AbstractFunction::Graph(graph)) => {
                write!(f, "FuncGraph(@g{})", graph.0)
            }
            AbstractValue::Function(AbstractFunction::Primitive(prim)) => write!(f, "{prim}"),
            AbstractValue::Function(AbstractFunction::Meta(meta)) => {
                write!(f, "MetaFuncGraph({})", meta.name())
            }
            AbstractValue::Function(AbstractFunction::Partial { .. }) => write!(f, "Partial"),
            AbstractValue::Env => write!(f, "EnvType"),
            AbstractValue::Undetermined => write!(f, "Undetermined"),
        }
    }
}

fn format_elements(elements: &[AbstractValue]) -> String {
    let inner = elements
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{inner}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_functions_display_their_name() {
        let add = AbstractValue::Function(AbstractFunction::Meta(MetaGraph::from(
            crate::composite::TupleAdd,
        )));
        assert_eq!(add.to_string(), "MetaFuncGraph(TupleAdd)");
    }

    #[test]
    fn constant_tuple_builds_value() {
        let tuple = AbstractValue::tuple(vec![AbstractValue::int(0), AbstractValue::None]);
        assert_eq!(
            tuple.build_value(),
            Some(Value::Tuple(vec![Value::Int(0), Value::None]))
        );
        let with_tensor = AbstractValue::tuple(vec![
            AbstractValue::int(0),
            AbstractValue::tensor(DType::F32, &[2]),
        ]);
        assert_eq!(with_tensor.build_value(), None);
    }

    #[test]
    fn broaden_keeps_immutable_scalars_and_erases_mutable_ones() {
        assert_eq!(AbstractValue::int(3).broaden(), AbstractValue::int(3));
        assert_eq!(AbstractValue::mutable_int(3).broaden().build_value(), None);
    }

    #[test]
    fn join_widens_scalar_values_and_dynamic_dims() {
        let joined = AbstractValue::int(1).join(&AbstractValue::int(2)).unwrap();
        assert_eq!(joined, AbstractValue::scalar_any(ScalarType::Int64));

        let joined = AbstractValue::tensor(DType::F32, &[2, 3])
            .join(&AbstractValue::tensor(DType::F32, &[2, 4]))
            .unwrap();
        assert_eq!(
            joined,
            AbstractValue::Tensor {
                dtype: DType::F32,
                shape: vec![Some(2), None],
            }
        );
    }

    #[test]
    fn join_rejects_mismatched_sequences() {
        let lhs = AbstractValue::tuple(vec![AbstractValue::int(1)]);
        let rhs = AbstractValue::tuple(vec![AbstractValue::int(1), AbstractValue::int(2)]);
        assert!(lhs.join(&rhs).is_err());
        assert!(AbstractValue::None.join(&AbstractValue::int(1)).is_err());
    }
}
