//! Reverse-mode gradient graphs.
//!
//! `GradOperation` wraps a forward graph `f` into
//!
//! ```text
//! grad{N}(fn[, weights][, position]):
//!     j = J(fn)
//!     return k_child                      # closure over j, weights, position
//! k_child(x0 .. xN-1[, sens]):
//!     (out, bprop) = j(x0 .. xN-1)
//!     dout = bprop(sens or ones_like(out))  # (env, dx0 .. dxN-1)
//!     return <selection>(dout)
//! ```
//!
//! where the selection is a [`Tail`] and/or a [`HyperMap`] over the weights
//! reading their gradients out of the environment.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::abstract_value::{AbstractValue, ScalarType};
use crate::context::{self, SparseResultRegistry};
use crate::error::Result;
use crate::ir::{GraphFlag, GraphId, GraphStore, NodeId, Primitive, Value};

use super::{graph_closure, HyperMap, MetaFuncGraph, MetaGraph, Tail, TailPolicy};

/// Every element is tensor-like or a nested tuple of tensor-like values.
pub fn is_tuple_all_tensor(elements: &[AbstractValue]) -> bool {
    elements.iter().all(|element| match element {
        AbstractValue::Tuple(nested) => is_tuple_all_tensor(nested),
        other => other.is_undetermined(),
    })
}

/// Whether the first input gradient may be a tuple of tensors.
pub fn enable_grad_first_for_tuple(elements: &[AbstractValue], enable_tuple_grad: bool) -> bool {
    enable_tuple_grad
        && matches!(elements.get(1), Some(AbstractValue::Tuple(nested)) if is_tuple_all_tensor(nested))
}

fn enable_grad_for_scalar(value: &AbstractValue) -> bool {
    context::grad_for_scalar() && value.scalar_type().is_some_and(ScalarType::is_number)
}

/// Whether position `pos` of a backward result carries a real gradient.
pub fn can_grad_argument(elements: &[AbstractValue], pos: usize) -> bool {
    elements.get(pos).is_some_and(|element| {
        element.is_undetermined() || element.build_value().is_none() || enable_grad_for_scalar(element)
    })
}

/// Marks `forward` when any primitive it (transitively) calls has a sparse
/// backward rule.
fn check_prim_bprop_return_sparse(store: &mut GraphStore, forward: GraphId) {
    let sparse = store.reachable_graphs(forward).into_iter().find_map(|graph| {
        store.topo_order(graph).into_iter().find_map(|node| {
            store
                .callee(node)
                .and_then(Value::as_primitive)
                .filter(|prim| prim.bprop_return_sparse())
                .map(|prim| prim.name().to_string())
        })
    });
    if let Some(prim) = sparse {
        debug!("prim: {prim} has attr 'bprop_return_sparse'");
        store.set_flag(forward, GraphFlag::SparseBprop);
        SparseResultRegistry::mark();
    }
}

/// Gradient transform configured by selection flags.
///
/// Input gradients come from `get_by_position` if set, else from `get_all`.
/// With `get_by_list` the weight gradients are paired with them as
/// `(inputs, weights)`, or returned alone when no input gradients are
/// selected. With no flag set only the first input's gradient is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GradOperation {
    pub get_all: bool,
    pub get_by_list: bool,
    pub sens_param: bool,
    pub get_by_position: bool,
}

impl GradOperation {
    /// Formal parameters of the generated graph.
    pub fn signature(&self) -> Vec<&'static str> {
        if self.get_by_position {
            vec!["func", "weight_list", "position_list"]
        } else if self.get_by_list {
            vec!["func", "weight_list"]
        } else {
            vec!["func"]
        }
    }

    /// Tail applied to the backward result, if any input gradients are selected.
    pub fn tail_policy(&self, tuple_grad_first: bool) -> Option<TailPolicy> {
        if self.get_by_position {
            Some(TailPolicy::GradByPosition)
        } else if self.get_all {
            Some(TailPolicy::GradAll)
        } else if self.get_by_list {
            None
        } else {
            Some(TailPolicy::GradFirst { tuple_grad_first })
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn k_child(
        &self,
        store: &mut GraphStore,
        grad_fg: GraphId,
        j: NodeId,
        weights: Option<NodeId>,
        position: Option<NodeId>,
        nparam: usize,
        tuple_grad_first: bool,
    ) -> GraphId {
        let k_child = store.new_graph(format!("grad_k{{{nparam}}}"));
        store.set_flag(k_child, GraphFlag::Core);
        store.set_flag(k_child, GraphFlag::KGraph);
        store.set_parent(k_child, grad_fg);

        let mut inputs = Vec::with_capacity(nparam + 1);
        inputs.push(j);
        for _ in 0..nparam {
            inputs.push(store.add_parameter(k_child));
        }
        let k_app = store.new_call(k_child, inputs);
        let getter = Primitive::tuple_getitem();
        let f_app = store.get_item(k_child, &getter, k_app, 0);
        let bprop = store.get_item(k_child, &getter, k_app, 1);

        let sens = if self.sens_param {
            store.add_parameter(k_child)
        } else {
            store.call_value(k_child, Primitive::ones_like(), [f_app])
        };
        let b_app = store.new_call(k_child, [bprop, sens]);
        let output = self.select_gradients(store, k_child, b_app, weights, position, tuple_grad_first);
        store.set_output(k_child, output);
        k_child
    }

    fn select_gradients(
        &self,
        store: &mut GraphStore,
        k_child: GraphId,
        b_app: NodeId,
        weights: Option<NodeId>,
        position: Option<NodeId>,
        tuple_grad_first: bool,
    ) -> NodeId {
        // grads = hyper_map(partial(env_get, env), weights)
        let fv_bprop = match (self.get_by_list, weights) {
            (true, Some(weights)) => {
                let env = store.get_item(k_child, &Primitive::tuple_getitem(), b_app, 0);
                let env_get = store.new_value(k_child, Primitive::env_get());
                let partial_env_get = store.call_value(k_child, Primitive::partial(), [env_get, env]);
                Some(store.call_value(
                    k_child,
                    MetaGraph::HyperMap(HyperMap::new()),
                    [partial_env_get, weights],
                ))
            }
            _ => None,
        };

        let tail = |policy| Value::Meta(MetaGraph::Tail(Tail::new(policy)));
        let inputs_bprop = if self.get_by_position {
            let args = std::iter::once(b_app).chain(position).collect::<Vec<_>>();
            Some(store.call_value(k_child, tail(TailPolicy::GradByPosition), args))
        } else {
            self.get_all
                .then(|| store.call_value(k_child, tail(TailPolicy::GradAll), [b_app]))
        };

        match (inputs_bprop, fv_bprop) {
            (Some(inputs), Some(fv)) => store.call_value(k_child, Primitive::make_tuple(), [inputs, fv]),
            (None, Some(fv)) => fv,
            (Some(inputs), None) => inputs,
            (None, None) => store.call_value(
                k_child,
                tail(TailPolicy::GradFirst { tuple_grad_first }),
                [b_app],
            ),
        }
    }
}

impl MetaFuncGraph for GradOperation {
    fn name(&self) -> String {
        "grad".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        let forward = graph_closure("GradOperation", args.first())?;
        store.try_graph(forward)?;
        store.set_flag(forward, GraphFlag::DeferInline);
        check_prim_bprop_return_sparse(store, forward);

        let nparam = store.parameters(forward).len();
        let tuple_grad_first = store.has_flag(forward, GraphFlag::EnableTupleGradFirst);
        let grad_fg = store.new_graph(format!("grad{{{nparam}}}"));
        store.set_flag(grad_fg, GraphFlag::Core);
        let fn_param = store.add_parameter(grad_fg);
        let weights = (self.get_by_list || self.get_by_position).then(|| store.add_parameter(grad_fg));
        let position = self.get_by_position.then(|| store.add_parameter(grad_fg));

        let j = store.call_value(grad_fg, Primitive::j(), [fn_param]);
        let k_child = self.k_child(store, grad_fg, j, weights, position, nparam, tuple_grad_first);
        let output = store.new_value(grad_fg, Value::Graph(k_child));
        store.set_output(grad_fg, output);
        Ok(grad_fg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_value::DType;

    #[test]
    fn predicate_accepts_tensors_and_unknown_values() {
        let elements = vec![
            AbstractValue::Env,
            AbstractValue::tensor(DType::F32, &[2]),
            AbstractValue::int(3),
            AbstractValue::scalar_any(ScalarType::Float32),
        ];
        assert!(can_grad_argument(&elements, 1));
        assert!(!can_grad_argument(&elements, 2));
        assert!(can_grad_argument(&elements, 3));
        assert!(!can_grad_argument(&elements, 4));
    }

    #[test]
    fn nested_all_tensor_tuples_are_detected() {
        let t = AbstractValue::tensor(DType::F32, &[]);
        assert!(is_tuple_all_tensor(&[t.clone(), AbstractValue::tuple(vec![t.clone()])]));
        assert!(!is_tuple_all_tensor(&[t, AbstractValue::int(0)]));
    }

    #[test]
    fn policy_precedence() {
        let by_position = GradOperation {
            get_by_position: true,
            get_all: true,
            ..Default::default()
        };
        assert_eq!(by_position.tail_policy(false), Some(TailPolicy::GradByPosition));
        assert_eq!(by_position.signature(), vec!["func", "weight_list", "position_list"]);

        let by_list = GradOperation {
            get_by_list: true,
            ..Default::default()
        };
        assert_eq!(by_list.tail_policy(false), None);
        assert_eq!(by_list.signature(), vec!["func", "weight_list"]);

        assert_eq!(
            GradOperation::default().tail_policy(true),
            Some(TailPolicy::GradFirst { tuple_grad_first: true })
        );
    }

    #[test]
    fn non_function_argument_is_a_type_error() {
        let mut store = GraphStore::new();
        let err = GradOperation::default()
            .generate(&mut store, &[AbstractValue::int(1)])
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("For 'GradOperation', the first argument must be a 'Function' or 'Cell'"));
    }
}
