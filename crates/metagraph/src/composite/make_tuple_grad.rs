use serde::{Deserialize, Serialize};

use crate::abstract_value::AbstractValue;
use crate::error::Result;
use crate::ir::{GraphFlag, GraphId, GraphStore, Primitive, Value};

use super::{MetaFuncGraph, SequenceKind};

/// Builds `▸make_<kind>_N(x0 .. xN-1) -> (make_<kind>(x..), ◂make_<kind>_N)`
/// where the backward graph maps `dout` to `(env, dout[0] .. dout[N-1])`.
fn generate_gradient(store: &mut GraphStore, kind: SequenceKind, size: usize) -> GraphId {
    let (label, primal) = match kind {
        SequenceKind::Tuple => ("make_tuple", Primitive::make_tuple()),
        SequenceKind::List => ("make_list", Primitive::make_list()),
    };

    let fg = store.new_graph(format!("\u{25B8}{label}_{size}"));
    let params = (0..size).map(|_| store.add_parameter(fg)).collect::<Vec<_>>();
    let out = store.call_value(fg, primal.clone(), params);

    let b = store.new_graph(format!("\u{25C2}{label}_{size}"));
    let dout = store.add_parameter(b);
    let mut grads = Vec::with_capacity(size + 1);
    grads.push(store.call_value(b, Primitive::environ_create(), std::iter::empty()));
    let getter = kind.getter();
    for i in 0..size as i64 {
        grads.push(store.get_item(b, &getter, dout, i));
    }
    store.set_flag(b, GraphFlag::Core);
    let b_out = store.call_value(b, Primitive::make_tuple(), grads);
    store.set_output(b, b_out);

    store.set_flag(fg, GraphFlag::Core);
    let b_ref = store.new_value(fg, Value::Graph(b));
    let fg_out = store.call_value(fg, Primitive::make_tuple(), [out, b_ref]);
    store.set_output(fg, fg_out);
    store.set_primal(fg, primal);
    fg
}

/// Hand-written forward/backward pair for `make_tuple`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MakeTupleGradient;

impl MetaFuncGraph for MakeTupleGradient {
    fn name(&self) -> String {
        "make_tuple_gradient".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        Ok(generate_gradient(store, SequenceKind::Tuple, args.len()))
    }
}

/// Hand-written forward/backward pair for `make_list`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MakeListGradient;

impl MetaFuncGraph for MakeListGradient {
    fn name(&self) -> String {
        "make_list_gradient".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        Ok(generate_gradient(store, SequenceKind::List, args.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::primitive::MAKE_LIST;

    #[test]
    fn list_variant_names_and_primal() {
        let mut store = GraphStore::new();
        let args = vec![AbstractValue::int(0); 2];
        let fg = MakeListGradient.generate(&mut store, &args).unwrap();
        assert_eq!(store.graph(fg).name, "\u{25B8}make_list_2");
        assert!(store.graph(fg).primal().is_some_and(|prim| prim.is(MAKE_LIST)));
        let reachable = store.reachable_graphs(fg);
        assert_eq!(reachable.len(), 2);
        assert_eq!(store.graph(reachable[1]).name, "\u{25C2}make_list_2");
    }
}
