//! Arena that owns every graph and node built during one compilation session.
//!
//! Graphs and nodes are addressed by index. A node always records the graph it
//! was created in; a call inside one graph may read nodes of a lexically
//! enclosing graph (recorded through [`FuncGraph::parent`]), which is how
//! generated closures capture values such as the `J` application of
//! `GradOperation`. References from a value node to another graph
//! ([`Value::Graph`]) are non-owning, so no ownership cycles can form.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{CompositeError, Result};

use super::primitive::Primitive;
use super::value::Value;

/// Index of a graph inside a [`GraphStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub u32);

/// Index of a node inside a [`GraphStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Named boolean markers attached to graphs and consumed by later passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GraphFlag {
    Core,
    SpecializeParameter,
    DeferInline,
    KGraph,
    SparseBprop,
    EnableTupleGradFirst,
    Stub,
}

impl GraphFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            GraphFlag::Core => "core",
            GraphFlag::SpecializeParameter => "spec_param",
            GraphFlag::DeferInline => "defer_inline",
            GraphFlag::KGraph => "k_graph",
            GraphFlag::SparseBprop => "sparse_bprop",
            GraphFlag::EnableTupleGradFirst => "enable_tuple_grad_first",
            GraphFlag::Stub => "stub",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Graph input at the given position.
    Parameter { index: usize },
    /// Embedded constant.
    Value(Value),
    /// `inputs[0]` is the operator, the rest are ordered arguments.
    Call { inputs: SmallVec<[NodeId; 4]> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub graph: GraphId,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_call(&self) -> bool {
        matches!(self.kind, NodeKind::Call { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn inputs(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Call { inputs } => inputs,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncGraph {
    pub name: String,
    flags: BTreeSet<GraphFlag>,
    parameters: Vec<NodeId>,
    output: Option<NodeId>,
    parent: Option<GraphId>,
    /// Primitive this hand-written backward pair differentiates.
    primal: Option<Primitive>,
}

impl FuncGraph {
    fn new(name: String) -> Self {
        Self {
            name,
            flags: BTreeSet::new(),
            parameters: Vec::new(),
            output: None,
            parent: None,
            primal: None,
        }
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    pub fn parent(&self) -> Option<GraphId> {
        self.parent
    }

    pub fn primal(&self) -> Option<&Primitive> {
        self.primal.as_ref()
    }

    pub fn flags(&self) -> impl Iterator<Item = GraphFlag> + '_ {
        self.flags.iter().copied()
    }

    pub fn has_flag(&self, flag: GraphFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Session-wide storage for graphs and nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStore {
    graphs: Vec<FuncGraph>,
    nodes: Vec<Node>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_graph(&mut self, name: impl Into<String>) -> GraphId {
        let id = GraphId(self.graphs.len() as u32);
        self.graphs.push(FuncGraph::new(name.into()));
        id
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    pub fn graph_ids(&self) -> impl Iterator<Item = GraphId> {
        (0..self.graphs.len() as u32).map(GraphId)
    }

    /// Panics on an id that was not produced by this store.
    pub fn graph(&self, id: GraphId) -> &FuncGraph {
        &self.graphs[id.0 as usize]
    }

    pub fn try_graph(&self, id: GraphId) -> Result<&FuncGraph> {
        self.graphs
            .get(id.0 as usize)
            .ok_or_else(|| CompositeError::graph(format!("unknown graph @g{}", id.0)))
    }

    fn graph_mut(&mut self, id: GraphId) -> &mut FuncGraph {
        &mut self.graphs[id.0 as usize]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn push_node(&mut self, graph: GraphId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { graph, kind });
        id
    }

    pub fn add_parameter(&mut self, graph: GraphId) -> NodeId {
        let index = self.graph(graph).parameters.len();
        let id = self.push_node(graph, NodeKind::Parameter { index });
        self.graph_mut(graph).parameters.push(id);
        id
    }

    pub fn new_value(&mut self, graph: GraphId, value: impl Into<Value>) -> NodeId {
        self.push_node(graph, NodeKind::Value(value.into()))
    }

    /// Appends a call node; `inputs[0]` is the operator.
    pub fn new_call(&mut self, graph: GraphId, inputs: impl IntoIterator<Item = NodeId>) -> NodeId {
        let inputs: SmallVec<[NodeId; 4]> = inputs.into_iter().collect();
        debug_assert!(!inputs.is_empty(), "call node requires an operator");
        self.push_node(graph, NodeKind::Call { inputs })
    }

    /// Emits `op(args...)` where `op` is embedded as a fresh value node.
    pub fn call_value(
        &mut self,
        graph: GraphId,
        op: impl Into<Value>,
        args: impl IntoIterator<Item = NodeId>,
    ) -> NodeId {
        let op = self.new_value(graph, op);
        let inputs = std::iter::once(op).chain(args).collect::<SmallVec<[NodeId; 4]>>();
        self.new_call(graph, inputs)
    }

    /// Emits `getitem(sequence, index)` with the given element-access primitive.
    pub fn get_item(
        &mut self,
        graph: GraphId,
        getter: &Primitive,
        sequence: NodeId,
        index: i64,
    ) -> NodeId {
        let index = self.new_value(graph, Value::Int(index));
        self.call_value(graph, getter.clone(), [sequence, index])
    }

    pub fn set_output(&mut self, graph: GraphId, node: NodeId) {
        self.graph_mut(graph).output = Some(node);
    }

    pub fn set_flag(&mut self, graph: GraphId, flag: GraphFlag) {
        self.graph_mut(graph).flags.insert(flag);
    }

    pub fn has_flag(&self, graph: GraphId, flag: GraphFlag) -> bool {
        self.graph(graph).has_flag(flag)
    }

    pub fn set_parent(&mut self, graph: GraphId, parent: GraphId) {
        self.graph_mut(graph).parent = Some(parent);
    }

    pub fn set_primal(&mut self, graph: GraphId, primal: Primitive) {
        self.graph_mut(graph).primal = Some(primal);
    }

    pub fn set_name(&mut self, graph: GraphId, name: impl Into<String>) {
        self.graph_mut(graph).name = name.into();
    }

    pub fn parameters(&self, graph: GraphId) -> &[NodeId] {
        self.graph(graph).parameters()
    }

    /// Output node of a finished graph.
    pub fn output(&self, graph: GraphId) -> Result<NodeId> {
        self.graph(graph).output.ok_or_else(|| {
            CompositeError::graph(format!("graph @{} has no output", self.graph(graph).name))
        })
    }

    /// Constant embedded at `node`, if it is a value node.
    pub fn value_of(&self, node: NodeId) -> Option<&Value> {
        self.node(node).value()
    }

    /// Operator value of a call node, when the operator is a constant.
    pub fn callee(&self, node: NodeId) -> Option<&Value> {
        self.node(node)
            .inputs()
            .first()
            .and_then(|op| self.value_of(*op))
    }

    /// Arguments of a call node (operator excluded).
    pub fn call_args(&self, node: NodeId) -> &[NodeId] {
        match self.node(node).inputs() {
            [] => &[],
            [_, rest @ ..] => rest,
        }
    }

    /// Nodes reachable from the graph output in post-order, without entering
    /// graphs referenced through value nodes.
    pub fn topo_order(&self, graph: GraphId) -> Vec<NodeId> {
        let Some(root) = self.graph(graph).output else {
            return Vec::new();
        };
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.push((node, true));
            for input in self.node(node).inputs().iter().rev() {
                if !seen.contains(input) {
                    stack.push((*input, false));
                }
            }
        }
        order
    }

    /// Graphs reachable from `graph` through graph-valued constants, `graph` included.
    pub fn reachable_graphs(&self, graph: GraphId) -> Vec<GraphId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = vec![graph];
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            result.push(current);
            for node in self.topo_order(current) {
                if let Some(Value::Graph(nested)) = self.value_of(node) {
                    pending.push(*nested);
                }
            }
        }
        result
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| CompositeError::graph(format!("json error: {err}")))
    }

    pub fn from_json_str(src: &str) -> Result<Self> {
        serde_json::from_str(src).map_err(|err| CompositeError::graph(format!("json error: {err}")))
    }
}
