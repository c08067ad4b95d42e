use serde::{Deserialize, Serialize};

use crate::abstract_value::AbstractValue;
use crate::error::{CompositeError, Result};
use crate::ir::{GraphFlag, GraphId, GraphStore, Primitive};

use super::grad::{can_grad_argument, enable_grad_first_for_tuple};
use super::{empty_tuple, MetaFuncGraph, SequenceKind};

/// How a [`Tail`] trims its input sequence.
///
/// The grad policies consume the raw backward result
/// `(env, d_input0, d_input1, ..)` and keep only differentiable positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TailPolicy {
    /// Drop the first element of a tuple or list.
    NotGrad,
    /// Gradient of the first input only.
    GradFirst { tuple_grad_first: bool },
    /// Gradients of every differentiable input.
    GradAll,
    /// Gradients of the inputs named by a constant position tuple.
    GradByPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tail {
    policy: TailPolicy,
}

impl Default for Tail {
    fn default() -> Self {
        Self::new(TailPolicy::NotGrad)
    }
}

impl Tail {
    pub fn new(policy: TailPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TailPolicy {
        self.policy
    }

    fn generate_tail(store: &mut GraphStore, elements: &[AbstractValue], kind: SequenceKind) -> GraphId {
        let graph = store.new_graph("tail");
        store.set_flag(graph, GraphFlag::Core);
        let seq = store.add_parameter(graph);
        let getter = kind.getter();
        let elems = (1..elements.len() as i64)
            .map(|i| store.get_item(graph, &getter, seq, i))
            .collect::<Vec<_>>();
        let out = if elems.is_empty() {
            empty_tuple(store, graph)
        } else {
            store.call_value(graph, kind.maker(), elems)
        };
        store.set_output(graph, out);
        graph
    }

    /// Backward-result slots kept by the grad policy. Fails before anything is
    /// allocated when the positions are missing, non-constant or out of range.
    fn select(&self, tuple: &[AbstractValue], position: Option<&[AbstractValue]>) -> Result<Selection> {
        match self.policy {
            TailPolicy::GradFirst { tuple_grad_first } => Ok(Selection::First(
                (can_grad_argument(tuple, 1) || enable_grad_first_for_tuple(tuple, tuple_grad_first))
                    .then_some(1),
            )),
            TailPolicy::GradAll => Ok(Selection::All(
                (1..tuple.len())
                    .filter(|i| can_grad_argument(tuple, *i))
                    .map(|i| i as i64)
                    .collect(),
            )),
            TailPolicy::GradByPosition => {
                Self::select_by_position(tuple, position).map(Selection::Positions)
            }
            TailPolicy::NotGrad => Err(CompositeError::precondition(
                "'Tail' policy NotGrad does not select gradients",
            )),
        }
    }

    fn select_by_position(tuple: &[AbstractValue], position: Option<&[AbstractValue]>) -> Result<Vec<i64>> {
        let Some(position) = position else {
            return Err(CompositeError::precondition(
                "Return grad by position, but the grad_position is empty!",
            ));
        };
        let mut selected = Vec::with_capacity(position.len());
        for entry in position {
            let Some(pos) = entry.build_value().and_then(|value| value.as_int()) else {
                return Err(CompositeError::type_error(format!(
                    "The grad_position must be a tuple of constant int, but got {entry}."
                )));
            };
            // Slot 0 of the backward result is the environment.
            let index = pos + 1;
            if pos < 0 || index as usize >= tuple.len() {
                return Err(CompositeError::index(format!(
                    "The index {pos} is out of range [0, {}).",
                    tuple.len()
                )));
            }
            if can_grad_argument(tuple, index as usize) {
                selected.push(index);
            }
        }
        Ok(selected)
    }

    fn generate_grad(
        &self,
        store: &mut GraphStore,
        tuple: &[AbstractValue],
        position: Option<&[AbstractValue]>,
    ) -> Result<GraphId> {
        let selection = self.select(tuple, position)?;

        let graph = store.new_graph("grad_tail");
        store.set_flag(graph, GraphFlag::Core);
        let param = store.add_parameter(graph);
        let getter = Primitive::tuple_getitem();
        let out = match selection {
            Selection::First(Some(index)) => store.get_item(graph, &getter, param, index),
            Selection::First(None) => empty_tuple(store, graph),
            Selection::Positions(indices) => {
                store.add_parameter(graph);
                let mut elems = indices
                    .into_iter()
                    .map(|index| store.get_item(graph, &getter, param, index))
                    .collect::<Vec<_>>();
                match elems.len() {
                    0 => empty_tuple(store, graph),
                    1 => elems.remove(0),
                    _ => store.call_value(graph, Primitive::make_tuple(), elems),
                }
            }
            Selection::All(indices) if indices.is_empty() => empty_tuple(store, graph),
            Selection::All(indices) => {
                let elems = indices
                    .into_iter()
                    .map(|index| store.get_item(graph, &getter, param, index))
                    .collect::<Vec<_>>();
                store.call_value(graph, Primitive::make_tuple(), elems)
            }
        };
        store.set_output(graph, out);
        Ok(graph)
    }
}

/// Backward-result slots a grad policy keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selection {
    /// One slot returned bare, or an empty tuple.
    First(Option<i64>),
    /// Requested slots: bare when exactly one survives, a tuple otherwise.
    Positions(Vec<i64>),
    /// Every differentiable slot, always as a tuple.
    All(Vec<i64>),
}

impl MetaFuncGraph for Tail {
    fn name(&self) -> String {
        match self.policy {
            TailPolicy::NotGrad => "tail",
            TailPolicy::GradFirst { .. } => "tail_grad_first",
            TailPolicy::GradAll => "tail_grad_all",
            TailPolicy::GradByPosition => "tail_grad_by_position",
        }
        .to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        let Some(first) = args.first() else {
            return Err(CompositeError::arg_count("Tail", 1, 0));
        };

        if self.policy == TailPolicy::NotGrad {
            return match first {
                AbstractValue::Tuple(elements) => {
                    Ok(Self::generate_tail(store, elements, SequenceKind::Tuple))
                }
                AbstractValue::List(elements) => {
                    Ok(Self::generate_tail(store, elements, SequenceKind::List))
                }
                other => Err(CompositeError::type_error(format!(
                    "'Tail' arg0 must be tuple or list, but got {other}"
                ))),
            };
        }

        if args.len() > 2 {
            return Err(CompositeError::arg_count("Tail", 2, args.len()));
        }
        let AbstractValue::Tuple(tuple) = first else {
            return Err(CompositeError::type_error(format!(
                "'Tail' arg0 must be tuple, but got {first}"
            )));
        };
        let position = match args.get(1) {
            Some(AbstractValue::Tuple(position)) => Some(position.as_slice()),
            Some(other) => {
                return Err(CompositeError::type_error(format!(
                    "'Tail' arg1 'position' must be tuple, but got {other}"
                )))
            }
            None => None,
        };
        self.generate_grad(store, tuple, position)
    }
}
