//! Wrapping transforms: `vmap`, `Taylor` and `Shard`.
//!
//! Each builds an outer graph that applies a marker primitive to the function
//! parameter and returns a child closure forwarding the forward graph's
//! parameters through the marked function.

use log::info;
use serde::{Deserialize, Serialize};

use crate::abstract_value::AbstractValue;
use crate::error::{check_args_size, CompositeError, Result};
use crate::ir::{GraphFlag, GraphId, GraphStore, NodeId, Primitive, Value};

use super::{graph_closure, MetaFuncGraph};

/// Child closure `(x0 .. xN-1) -> marked(x0 .. xN-1)` nested in `outer`.
fn forwarding_child(
    store: &mut GraphStore,
    outer: GraphId,
    name: String,
    marked: NodeId,
    nparam: usize,
    k_graph: bool,
) -> GraphId {
    let child = store.new_graph(name);
    store.set_flag(child, GraphFlag::Core);
    if k_graph {
        store.set_flag(child, GraphFlag::KGraph);
    }
    store.set_parent(child, outer);
    let mut inputs = Vec::with_capacity(nparam + 1);
    inputs.push(marked);
    for _ in 0..nparam {
        inputs.push(store.add_parameter(child));
    }
    let app = store.new_call(child, inputs);
    store.set_output(child, app);
    child
}

fn is_axes_all_none(axes: &[Value]) -> bool {
    axes.iter().all(|axis| match axis {
        Value::Tuple(nested) => is_axes_all_none(nested),
        other => other.is_none(),
    })
}

/// Validates `in_axes`/`out_axes` and returns the value stored on the marker.
fn check_axes(name: &str, axes: &AbstractValue, nparam: Option<usize>) -> Result<Value> {
    if axes.is_sequence() {
        let Some(Value::Tuple(items)) = axes.build_value() else {
            return Err(CompositeError::type_error(format!(
                "The '{name}' of 'vmap' must be a constant, but got {axes}."
            )));
        };
        if let Some(nparam) = nparam {
            if items.len() != nparam {
                return Err(CompositeError::value(format!(
                    "When vmap`s '{name}' is a tuple or list, and its size must be equal to the number of arguments of 'fn': {nparam}, but got size: {}.",
                    items.len()
                )));
            }
        }
        if is_axes_all_none(&items) {
            return Err(CompositeError::value(format!(
                "The '{name}' of 'vmap' cannot be all None, but got {}.",
                Value::Tuple(items)
            )));
        }
        return Ok(Value::Tuple(items));
    }

    match axes.build_value() {
        Some(Value::None) => Err(CompositeError::value(format!(
            "The '{name}' of 'vmap' cannot be a single None."
        ))),
        Some(Value::Int(axis)) => Ok(Value::Int(axis)),
        _ => Err(CompositeError::type_error(format!(
            "The axis in vmap`s '{name}' can only be of type Int or None, but got {axes}."
        ))),
    }
}

/// Vectorizing map over `(fn, in_axes, out_axes)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmapOperation;

impl MetaFuncGraph for VmapOperation {
    fn name(&self) -> String {
        "vmap".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        if args.is_empty() {
            return Err(CompositeError::precondition(
                "'VmapOperation' requires a network or function as an input, while the input is empty.",
            ));
        }
        check_args_size("vmap", args, 3)?;
        let forward = graph_closure("VmapOperation", args.first())?;
        store.try_graph(forward)?;
        store.set_flag(forward, GraphFlag::DeferInline);
        let nparam = store.parameters(forward).len();

        let in_axes = check_axes("in_axes", &args[1], Some(nparam))?;
        let out_axes = check_axes("out_axes", &args[2], None)?;

        let vmap_fg = store.new_graph(format!("vmap{{{nparam}}}"));
        store.set_flag(vmap_fg, GraphFlag::Core);
        let fn_param = store.add_parameter(vmap_fg);
        store.add_parameter(vmap_fg);
        store.add_parameter(vmap_fg);

        let marker = Primitive::vmap()
            .with_attr("in_axes", in_axes)
            .with_attr("out_axes", out_axes);
        let vmap = store.call_value(vmap_fg, marker, [fn_param]);
        let child = forwarding_child(store, vmap_fg, format!("vmap_k{{{nparam}}}"), vmap, nparam, true);
        let output = store.new_value(vmap_fg, Value::Graph(child));
        store.set_output(vmap_fg, output);
        Ok(vmap_fg)
    }
}

/// Higher-order derivative marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaylorOperation;

impl MetaFuncGraph for TaylorOperation {
    fn name(&self) -> String {
        "taylor".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        let forward = graph_closure("TaylorOperation", args.first())?;
        store.try_graph(forward)?;
        store.set_flag(forward, GraphFlag::DeferInline);
        info!("'TaylorOperation' forward_graph @{}", store.graph(forward).name);
        let nparam = store.parameters(forward).len();

        let grad_fg = store.new_graph(format!("taylorgrad{{{nparam}}}"));
        store.set_flag(grad_fg, GraphFlag::Core);
        let fn_param = store.add_parameter(grad_fg);
        let mark_taylor = store.call_value(grad_fg, Primitive::taylor(), [fn_param]);
        info!("TaylorOperation forward input size {nparam}");
        let child = forwarding_child(
            store,
            grad_fg,
            format!("taylor_k{{{nparam}}}"),
            mark_taylor,
            nparam,
            false,
        );
        let output = store.new_value(grad_fg, Value::Graph(child));
        store.set_output(grad_fg, output);
        Ok(grad_fg)
    }
}

/// Sharding marker over `(fn, in_axes, out_axes, device, level)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard;

const SHARD_INPUT_SIZE: usize = 5;

impl MetaFuncGraph for Shard {
    fn name(&self) -> String {
        "shard".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        // fn, in_axes, out_axes, device, level
        check_args_size("Shard", args, SHARD_INPUT_SIZE)?;
        let forward = graph_closure("Shard", args.first())?;
        store.try_graph(forward)?;
        store.set_flag(forward, GraphFlag::DeferInline);
        let nparam = store.parameters(forward).len();

        let shard_fg = store.new_graph(format!("shard{{{nparam}}}"));
        store.set_flag(shard_fg, GraphFlag::Core);
        let params = (0..SHARD_INPUT_SIZE)
            .map(|_| store.add_parameter(shard_fg))
            .collect::<Vec<_>>();
        let shard = store.call_value(shard_fg, Primitive::shard(), params);
        let child = forwarding_child(store, shard_fg, format!("shard_k{{{nparam}}}"), shard, nparam, false);
        let output = store.new_value(shard_fg, Value::Graph(child));
        store.set_output(shard_fg, output);
        Ok(shard_fg)
    }
}
