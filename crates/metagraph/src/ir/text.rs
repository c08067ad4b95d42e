//! Human-readable dump of generated graphs.
//!
//! ```text
//! graph @grad{1} [core] (%0) {
//!   %2 = prim::J(%0)
//!   return @g1
//! }
//! ```
//!
//! Value operands are printed inline; graph references print the referenced
//! graph's name.

use std::fmt;

use super::graph::{GraphId, GraphStore, NodeId, NodeKind};
use super::value::Value;

/// Display adapter for a single graph of a store.
pub struct GraphDisplay<'a> {
    store: &'a GraphStore,
    graph: GraphId,
}

impl GraphStore {
    pub fn display(&self, graph: GraphId) -> GraphDisplay<'_> {
        GraphDisplay { store: self, graph }
    }

    /// Renders `graph` and every graph reachable from it.
    pub fn dump(&self, graph: GraphId) -> String {
        self.reachable_graphs(graph)
            .into_iter()
            .map(|id| self.display(id).to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_operand(&self, node: NodeId) -> String {
        match &self.node(node).kind {
            NodeKind::Value(value) => self.format_value(value),
            NodeKind::Parameter { .. } | NodeKind::Call { .. } => format!("%{}", node.0),
        }
    }

    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Graph(id) => match self.try_graph(*id) {
                Ok(graph) => format!("@{}", graph.name),
                Err(_) => value.to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl fmt::Display for GraphDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.store.graph(self.graph);
        write!(f, "graph @{}", graph.name)?;
        let flags = graph.flags().map(|flag| flag.as_str()).collect::<Vec<_>>();
        if !flags.is_empty() {
            write!(f, " [{}]", flags.join(", "))?;
        }
        let params = graph
            .parameters()
            .iter()
            .map(|param| format!("%{}", param.0))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, " ({params}) {{")?;
        for node in self.store.topo_order(self.graph) {
            // Captured nodes are printed by the graph that owns them.
            if self.store.node(node).graph != self.graph {
                continue;
            }
            let NodeKind::Call { inputs } = &self.store.node(node).kind else {
                continue;
            };
            let (op, args) = match inputs.split_first() {
                Some(split) => split,
                None => continue,
            };
            let args = args
                .iter()
                .map(|arg| self.store.format_operand(*arg))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                f,
                "  %{} = {}({})",
                node.0,
                self.store.format_operand(*op),
                args
            )?;
        }
        match graph.output() {
            Some(output) => writeln!(f, "  return {}", self.store.format_operand(output))?,
            None => writeln!(f, "  <no output>")?,
        }
        write!(f, "}}")
    }
}
