//! Graph generators ("meta graphs").
//!
//! A generator is a small immutable configuration value. Given the abstract
//! signature of a call site it builds a fresh graph in a [`GraphStore`] and
//! returns its id. Generated graphs refer to other generators (and to
//! themselves, for recursive structures) by embedding a cloned [`MetaGraph`]
//! in a value node, so no generator ever holds a reference to a graph.

mod grad;
mod hyper_map;
mod list;
mod make_tuple_grad;
mod sequence;
mod tail;
mod transform;

use serde::{Deserialize, Serialize};

use crate::abstract_value::{AbstractFunction, AbstractValue};
use crate::error::{CompositeError, Result};
use crate::ir::{GraphId, GraphStore, NodeId, Value};

pub use grad::{can_grad_argument, enable_grad_first_for_tuple, is_tuple_all_tensor, GradOperation};
pub use hyper_map::HyperMap;
pub use list::{ListAppend, ListInsert, ListPop};
pub use make_tuple_grad::{MakeListGradient, MakeTupleGradient};
pub use sequence::{
    resolve_slice, slice_member, ListSliceSetItem, SequenceKind, SequenceSliceGetItem,
    SliceBounds, TupleAdd, TupleGetItemTensor,
};
pub use tail::{Tail, TailPolicy};
pub use transform::{Shard, TaylorOperation, VmapOperation};

/// A graph generator specialized per abstract argument signature.
pub trait MetaFuncGraph {
    /// Debug name of the generator.
    fn name(&self) -> String;

    /// Rewrites the incoming signature before specialization and caching.
    fn normalize_args(&self, store: &GraphStore, args: &[AbstractValue]) -> Result<Vec<AbstractValue>> {
        let _ = store;
        Ok(args.to_vec())
    }

    /// Builds a new graph for `args` and returns its id.
    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId>;
}

/// Every generator configuration, as a hashable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaGraph {
    HyperMap(HyperMap),
    Tail(Tail),
    Grad(GradOperation),
    Vmap(VmapOperation),
    Taylor(TaylorOperation),
    Shard(Shard),
    TupleAdd(TupleAdd),
    SliceGetItem(SequenceSliceGetItem),
    ListSliceSetItem(ListSliceSetItem),
    ListAppend(ListAppend),
    ListInsert(ListInsert),
    ListPop(ListPop),
    TupleGetItemTensor(TupleGetItemTensor),
    MakeTupleGradient(MakeTupleGradient),
    MakeListGradient(MakeListGradient),
}

macro_rules! dispatch {
    ($self:expr, $meta:ident => $body:expr) => {
        match $self {
            MetaGraph::HyperMap($meta) => $body,
            MetaGraph::Tail($meta) => $body,
            MetaGraph::Grad($meta) => $body,
            MetaGraph::Vmap($meta) => $body,
            MetaGraph::Taylor($meta) => $body,
            MetaGraph::Shard($meta) => $body,
            MetaGraph::TupleAdd($meta) => $body,
            MetaGraph::SliceGetItem($meta) => $body,
            MetaGraph::ListSliceSetItem($meta) => $body,
            MetaGraph::ListAppend($meta) => $body,
            MetaGraph::ListInsert($meta) => $body,
            MetaGraph::ListPop($meta) => $body,
            MetaGraph::TupleGetItemTensor($meta) => $body,
            MetaGraph::MakeTupleGradient($meta) => $body,
            MetaGraph::MakeListGradient($meta) => $body,
        }
    };
}

impl MetaFuncGraph for MetaGraph {
    fn name(&self) -> String {
        dispatch!(self, meta => meta.name())
    }

    fn normalize_args(&self, store: &GraphStore, args: &[AbstractValue]) -> Result<Vec<AbstractValue>> {
        dispatch!(self, meta => meta.normalize_args(store, args))
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        dispatch!(self, meta => meta.generate(store, args))
    }
}

macro_rules! impl_from_meta {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for MetaGraph {
                fn from(value: $ty) -> Self {
                    MetaGraph::$variant(value)
                }
            }
        )*
    };
}

impl_from_meta! {
    HyperMap => HyperMap,
    Tail => Tail,
    Grad => GradOperation,
    Vmap => VmapOperation,
    Taylor => TaylorOperation,
    Shard => Shard,
    TupleAdd => TupleAdd,
    SliceGetItem => SequenceSliceGetItem,
    ListSliceSetItem => ListSliceSetItem,
    ListAppend => ListAppend,
    ListInsert => ListInsert,
    ListPop => ListPop,
    TupleGetItemTensor => TupleGetItemTensor,
    MakeTupleGradient => MakeTupleGradient,
    MakeListGradient => MakeListGradient,
}

/// Resolves the function argument of a wrapping transform to its graph.
pub(crate) fn graph_closure(op: &str, arg: Option<&AbstractValue>) -> Result<GraphId> {
    match arg {
        None => Err(CompositeError::precondition(format!(
            "'{op}' requires a forward network or function as an input, while the input is empty."
        ))),
        Some(AbstractValue::Function(AbstractFunction::Graph(graph))) => Ok(*graph),
        Some(AbstractValue::Function(other)) => Err(CompositeError::type_error(format!(
            "'{op}' arg0 {} cast to a graph closure failed.",
            AbstractValue::Function(other.clone())
        ))),
        Some(other) => Err(CompositeError::type_error(format!(
            "For '{op}', the first argument must be a 'Function' or 'Cell', but got {other}."
        ))),
    }
}

/// Empty-tuple constant owned by `graph`.
pub(crate) fn empty_tuple(store: &mut GraphStore, graph: GraphId) -> NodeId {
    store.new_value(graph, Value::empty_tuple())
}

/// Statically known integer argument.
pub(crate) fn const_int(op: &str, what: &str, arg: &AbstractValue) -> Result<i64> {
    match arg.build_value() {
        Some(Value::Int(value)) => Ok(value),
        _ => Err(CompositeError::type_error(format!(
            "For '{op}', the {what} must be a constant int, but got {arg}."
        ))),
    }
}

/// Elements of a list argument.
pub(crate) fn expect_list<'a>(op: &str, position: usize, arg: &'a AbstractValue) -> Result<&'a [AbstractValue]> {
    match arg {
        AbstractValue::List(elements) => Ok(elements),
        other => Err(CompositeError::type_error(format!(
            "For '{op}', the {} argument must be a list, but got {other}.",
            crate::error::ordinal(position + 1)
        ))),
    }
}
