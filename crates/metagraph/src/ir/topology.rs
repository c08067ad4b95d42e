use thiserror::Error;

use super::graph::{GraphId, GraphStore, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "node %{} owned by @g{} is free in @g{} and @g{} is not an enclosing graph",
    .free_node.0, .owner.0, .graph.0, .owner.0
)]
pub struct ClosureError {
    pub graph: GraphId,
    pub free_node: NodeId,
    pub owner: GraphId,
}

/// Whether `ancestor` is `graph` itself or one of its lexical parents.
pub fn encloses(store: &GraphStore, ancestor: GraphId, graph: GraphId) -> bool {
    let mut current = Some(graph);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = store.graph(id).parent();
    }
    false
}

/// Parameters and calls reachable from the output that another graph owns.
pub fn free_variables(store: &GraphStore, graph: GraphId) -> Vec<NodeId> {
    store
        .topo_order(graph)
        .into_iter()
        .filter(|node| {
            let node_ref = store.node(*node);
            node_ref.graph != graph && !matches!(node_ref.kind, NodeKind::Value(_))
        })
        .collect()
}

/// Checks that every captured node belongs to an enclosing graph.
///
/// Value nodes are position-independent constants and may be shared freely.
pub fn validate_closure(store: &GraphStore, graph: GraphId) -> Result<(), ClosureError> {
    for node in free_variables(store, graph) {
        let owner = store.node(node).graph;
        if !encloses(store, owner, graph) {
            return Err(ClosureError {
                graph,
                free_node: node,
                owner,
            });
        }
    }
    Ok(())
}
