use serde::{Deserialize, Serialize};

use crate::abstract_value::AbstractValue;
use crate::error::{check_args_size, CompositeError, Result};
use crate::ir::{GraphFlag, GraphId, GraphStore, NodeId, Primitive};

use super::{const_int, expect_list, MetaFuncGraph};

fn list_graph(store: &mut GraphStore, name: &str) -> GraphId {
    let graph = store.new_graph(name);
    store.set_flag(graph, GraphFlag::Core);
    graph
}

fn get_items(
    store: &mut GraphStore,
    graph: GraphId,
    list: NodeId,
    range: std::ops::Range<i64>,
) -> Vec<NodeId> {
    let getter = Primitive::list_getitem();
    range.map(|i| store.get_item(graph, &getter, list, i)).collect()
}

/// `list.append(value)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListAppend;

impl MetaFuncGraph for ListAppend {
    fn name(&self) -> String {
        "ListAppend".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        check_args_size("ListAppend", args, 2)?;
        let len = expect_list("ListAppend", 0, &args[0])?.len() as i64;

        let graph = list_graph(store, "append");
        let list = store.add_parameter(graph);
        let mut elems = get_items(store, graph, list, 0..len);
        elems.push(store.add_parameter(graph));
        let out = store.call_value(graph, Primitive::make_list(), elems);
        store.set_output(graph, out);
        Ok(graph)
    }
}

/// `list.insert(index, value)` with a constant index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListInsert;

impl ListInsert {
    /// Position the new element lands at; out-of-range indices saturate.
    pub fn insert_position(index: i64, len: i64) -> i64 {
        if index >= len {
            len
        } else if index > 0 {
            index
        } else if index < 0 && index > -len {
            len + index
        } else {
            0
        }
    }
}

impl MetaFuncGraph for ListInsert {
    fn name(&self) -> String {
        "ListInsert".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        check_args_size("ListInsert", args, 3)?;
        let len = expect_list("ListInsert", 0, &args[0])?.len() as i64;
        let index = const_int("ListInsert", "index", &args[1])?;
        let position = Self::insert_position(index, len);

        let graph = list_graph(store, "insert");
        let list = store.add_parameter(graph);
        store.add_parameter(graph);
        let value = store.add_parameter(graph);
        let mut elems = get_items(store, graph, list, 0..position);
        elems.push(value);
        elems.extend(get_items(store, graph, list, position..len));
        let out = store.call_value(graph, Primitive::make_list(), elems);
        store.set_output(graph, out);
        Ok(graph)
    }
}

/// `list.pop(index)` returning `(new_list, popped)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListPop;

impl MetaFuncGraph for ListPop {
    fn name(&self) -> String {
        "ListPop".to_string()
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        check_args_size("ListPop", args, 2)?;
        let len = expect_list("ListPop", 0, &args[0])?.len() as i64;
        let index = const_int("ListPop", "index", &args[1])?;
        if index >= len || index < -len {
            return Err(CompositeError::index("The pop index out of range."));
        }
        let position = if index >= 0 { index } else { len + index };

        let graph = list_graph(store, "pop");
        let list = store.add_parameter(graph);
        store.add_parameter(graph);
        let mut elems = get_items(store, graph, list, 0..position);
        let popped = store.get_item(graph, &Primitive::list_getitem(), list, position);
        elems.extend(get_items(store, graph, list, position + 1..len));
        let new_list = store.call_value(graph, Primitive::make_list(), elems);
        let out = store.call_value(graph, Primitive::make_tuple(), [new_list, popped]);
        store.set_output(graph, out);
        Ok(graph)
    }
}
