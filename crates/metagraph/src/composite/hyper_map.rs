use log::debug;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::abstract_value::{AbstractFunction, AbstractKind, AbstractValue};
use crate::error::{CompositeError, Result};
use crate::ir::{GraphFlag, GraphId, GraphStore, NodeId, Primitive, Value};

use super::{empty_tuple, MetaFuncGraph, MetaGraph};

/// Maps a leaf function over nested tuples and lists of matching structure.
///
/// Without a bound leaf the generated graph takes the function as its first
/// parameter. Recursion into nested containers calls a fresh copy of this
/// configuration, so the generated graphs never point back at a shared mapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HyperMap {
    fn_leaf: Option<Box<Value>>,
    reverse: bool,
    nonleaf: SmallVec<[AbstractKind; 2]>,
}

impl Default for HyperMap {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperMap {
    pub fn new() -> Self {
        Self {
            fn_leaf: None,
            reverse: false,
            nonleaf: smallvec![AbstractKind::List, AbstractKind::Tuple],
        }
    }

    /// Mapper with a leaf function fixed at construction time.
    pub fn with_leaf(leaf: impl Into<Value>) -> Self {
        Self {
            fn_leaf: Some(Box::new(leaf.into())),
            ..Self::new()
        }
    }

    /// Builds child calls tail-first.
    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Overrides the container kinds the mapper descends into.
    pub fn with_nonleaf(mut self, kinds: impl IntoIterator<Item = AbstractKind>) -> Self {
        self.nonleaf = kinds.into_iter().collect();
        self
    }

    pub fn fn_leaf(&self) -> Option<&Value> {
        self.fn_leaf.as_deref()
    }

    pub fn reverse(&self) -> bool {
        self.reverse
    }

    fn is_nonleaf(&self, kind: AbstractKind) -> bool {
        self.nonleaf.contains(&kind)
    }

    /// Validates one signature and decides how it is mapped.
    fn expansion(&self, args: &[AbstractValue]) -> Result<Expansion> {
        let Some(last) = args.last() else {
            return Ok(Expansion::Leaf);
        };
        if args.iter().any(|abs| !self.is_nonleaf(abs.kind())) {
            return Ok(Expansion::Leaf);
        }
        let kind = last.kind();
        if args.iter().any(|abs| abs.kind() != kind) {
            return Err(self.inconsistent_types(args));
        }
        match kind {
            AbstractKind::Tuple | AbstractKind::List => Ok(Expansion::Sequence {
                kind,
                size: check_sequences(args, kind)?,
            }),
            _ => Ok(Expansion::Leaf),
        }
    }

    fn make(
        &self,
        store: &mut GraphStore,
        graph: GraphId,
        fn_arg: Option<NodeId>,
        params: &[NodeId],
        expansion: Expansion,
    ) -> NodeId {
        match expansion {
            Expansion::Leaf => self.full_make_leaf(store, graph, fn_arg, params),
            Expansion::Sequence { kind, size } => {
                self.full_make_sequence(store, graph, fn_arg, params, kind, size)
            }
        }
    }

    fn full_make_leaf(
        &self,
        store: &mut GraphStore,
        graph: GraphId,
        fn_arg: Option<NodeId>,
        params: &[NodeId],
    ) -> NodeId {
        let callee = match (fn_arg, self.fn_leaf()) {
            (Some(node), _) => node,
            (None, Some(leaf)) => store.new_value(graph, leaf.clone()),
            (None, None) => store.new_value(graph, Value::None),
        };
        let inputs = std::iter::once(callee)
            .chain(params.iter().copied())
            .collect::<Vec<_>>();
        store.new_call(graph, inputs)
    }

    fn full_make_sequence(
        &self,
        store: &mut GraphStore,
        graph: GraphId,
        fn_arg: Option<NodeId>,
        params: &[NodeId],
        kind: AbstractKind,
        size: usize,
    ) -> NodeId {
        let (container, maker, getter) = match kind {
            AbstractKind::List => ("List", Primitive::make_list(), Primitive::list_getitem()),
            _ => ("Tuple", Primitive::make_tuple(), Primitive::tuple_getitem()),
        };
        if size == 0 {
            return empty_tuple(store, graph);
        }

        let fn_rec = Value::Meta(MetaGraph::HyperMap(self.clone()));
        let mut items = Vec::with_capacity(size);
        for i in 0..size {
            debug!(
                "hyper_map expands element {i} of {container} target, reverse: {}",
                self.reverse
            );
            let pos = if self.reverse { size - 1 - i } else { i };
            let mut call_args = Vec::with_capacity(params.len() + 1);
            call_args.extend(fn_arg);
            for param in params {
                call_args.push(store.get_item(graph, &getter, *param, pos as i64));
            }
            let call = store.call_value(graph, fn_rec.clone(), call_args);
            if self.reverse {
                items.insert(0, call);
            } else {
                items.push(call);
            }
        }
        store.call_value(graph, maker, items)
    }

    fn inconsistent_types(&self, args: &[AbstractValue]) -> CompositeError {
        let mut msg = format!(
            "In a nonleaf situation, the types of arguments in HyperMap must be consistent, but the types of arguments are inconsistent.\nThere are {} inputs of `{}`, corresponding type info:\n",
            args.len(),
            self.name()
        );
        for (idx, abs) in args.iter().enumerate() {
            // Position 0 of the user-facing call is the function itself.
            let label = match idx {
                0 => "second".to_string(),
                1 => "third".to_string(),
                n => format!("{}th", n + 2),
            };
            msg.push_str(&format!(
                "The type of the {label} argument in HyperMap is {}.\n",
                abs.kind().as_str()
            ));
        }
        CompositeError::type_error(msg)
    }
}

/// How a signature is mapped: one leaf call, or a fan-out over containers of
/// `size` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expansion {
    Leaf,
    Sequence { kind: AbstractKind, size: usize },
}

/// Common length of same-kind containers, measured against the first one.
fn check_sequences(args: &[AbstractValue], kind: AbstractKind) -> Result<usize> {
    let size = args
        .first()
        .and_then(AbstractValue::elements)
        .map_or(0, <[AbstractValue]>::len);
    let container = match kind {
        AbstractKind::List => "List",
        _ => "Tuple",
    };
    for (num, abs) in args.iter().enumerate().map(|(i, abs)| (i + 1, abs)) {
        let (error_index, next_index) = input_index(num);
        let elements = match abs.elements() {
            Some(elements) if abs.kind() == kind => elements,
            _ => {
                return Err(CompositeError::type_error(format!(
                    "The {error_index} element in HyperMap has wrong type, expected a {container}, but got {abs}."
                )))
            }
        };
        if elements.len() != size {
            let header = match kind {
                AbstractKind::List => "The lists in HyperMap should have the same length.",
                _ => "The length of tuples in HyperMap must be the same.",
            };
            return Err(CompositeError::type_error(format!(
                "{header} \nThe length of the {error_index} element in HyperMap is {size}, but the length of the {next_index} element in HyperMap is {}.\n",
                elements.len()
            )));
        }
    }
    Ok(size)
}

fn input_index(num: usize) -> (String, String) {
    match num {
        1 => ("first".to_string(), "second".to_string()),
        2 => ("second".to_string(), "third".to_string()),
        n => (format!("{n}th"), format!("{}th", n + 1)),
    }
}

impl MetaFuncGraph for HyperMap {
    fn name(&self) -> String {
        match self.fn_leaf() {
            Some(leaf) => format!("hyper_map[{}]", leaf.name()),
            None => "hyper_map".to_string(),
        }
    }

    fn normalize_args(&self, store: &GraphStore, args: &[AbstractValue]) -> Result<Vec<AbstractValue>> {
        if self.fn_leaf.is_none() {
            let Some(first) = args.first() else {
                return Err(CompositeError::precondition(
                    "The size of arguments in list should not be empty. But the size of arguments is 0.",
                ));
            };
            if let AbstractValue::Function(AbstractFunction::Graph(graph)) = first {
                if store.try_graph(*graph)?.parent().is_some() {
                    return Err(CompositeError::type_error(
                        "HyperMap don't support Closure with free variable yet.",
                    ));
                }
            }
        }
        Ok(args.iter().map(AbstractValue::broaden).collect())
    }

    fn generate(&self, store: &mut GraphStore, args: &[AbstractValue]) -> Result<GraphId> {
        let rest = match self.fn_leaf {
            Some(_) => args,
            None => args.get(1..).ok_or_else(|| {
                CompositeError::precondition("'hyper_map' requires the function as its first argument")
            })?,
        };

        let expansion = self.expansion(rest)?;

        let graph = store.new_graph("hyper_map");
        store.set_flag(graph, GraphFlag::Core);
        store.set_flag(graph, GraphFlag::SpecializeParameter);
        let fn_arg = self.fn_leaf.is_none().then(|| store.add_parameter(graph));
        let params = rest
            .iter()
            .map(|_| store.add_parameter(graph))
            .collect::<Vec<_>>();

        let output = self.make(store, graph, fn_arg, &params, expansion);
        store.set_output(graph, output);
        Ok(graph)
    }
}
