#![allow(dead_code)]

//! Symbolic interpreter for generated graphs.
//!
//! Structural primitives (tuple/list construction and indexing, partial
//! application, switch_layer) are evaluated; every other primitive becomes an
//! opaque [`Sym::Apply`]. Calls to generators are specialized through the
//! session from the abstract types of the symbolic arguments. `J(f)` follows
//! a simple model: applied to `xs` it yields `(f_out, bprop)`, and `bprop`
//! returns `(env, d0 .. dN-1)` where `di` has the abstract type of `xs[i]`.

use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, bail, Result};
use metagraph::ir::primitive::{
    ENVIRON_CREATE, J, LIST_GETITEM, MAKE_LIST, MAKE_TUPLE, PARTIAL, SWITCH_LAYER, TUPLE_GETITEM,
};
use metagraph::ir::NodeKind;
use metagraph::{
    AbstractFunction, AbstractValue, DType, GraphId, GraphSession, NodeId, Primitive, Value,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Sym {
    Leaf { name: String, abs: AbstractValue },
    Int(i64),
    None,
    Const(Value),
    Tuple(Vec<Sym>),
    List(Vec<Sym>),
    Func(Value),
    Closure { graph: GraphId, env: HashMap<NodeId, Sym> },
    Partial { func: Box<Sym>, args: Vec<Sym> },
    Apply { op: String, args: Vec<Sym> },
    Bprop { inputs: Vec<Sym> },
    Env,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Tensor-typed symbolic leaf.
pub fn leaf(name: &str) -> Sym {
    Sym::Leaf {
        name: name.to_string(),
        abs: AbstractValue::tensor(DType::F32, &[2]),
    }
}

pub fn tuple(items: Vec<Sym>) -> Sym {
    Sym::Tuple(items)
}

pub fn list(items: Vec<Sym>) -> Sym {
    Sym::List(items)
}

pub fn leaves(prefix: &str, n: usize) -> Vec<Sym> {
    (0..n).map(|i| leaf(&format!("{prefix}{i}"))).collect()
}

pub fn abstract_of(sym: &Sym) -> AbstractValue {
    match sym {
        Sym::Leaf { abs, .. } => abs.clone(),
        Sym::Int(value) => AbstractValue::int(*value),
        Sym::None => AbstractValue::None,
        Sym::Const(Value::Bool(value)) => AbstractValue::bool(*value),
        Sym::Const(_) => AbstractValue::Undetermined,
        Sym::Tuple(items) => AbstractValue::tuple(items.iter().map(abstract_of).collect::<Vec<_>>()),
        Sym::List(items) => AbstractValue::list(items.iter().map(abstract_of).collect::<Vec<_>>()),
        Sym::Func(_) | Sym::Closure { .. } | Sym::Partial { .. } => {
            AbstractValue::Function(function_of(sym))
        }
        Sym::Env => AbstractValue::Env,
        Sym::Apply { .. } | Sym::Bprop { .. } => AbstractValue::tensor(DType::F32, &[2]),
    }
}

fn function_of(sym: &Sym) -> AbstractFunction {
    match sym {
        Sym::Func(Value::Graph(graph)) | Sym::Closure { graph, .. } => AbstractFunction::Graph(*graph),
        Sym::Func(Value::Primitive(prim)) => AbstractFunction::Primitive(prim.clone()),
        Sym::Func(Value::Meta(meta)) => AbstractFunction::Meta(meta.clone()),
        Sym::Func(Value::Multitype(name)) => AbstractFunction::Primitive(Primitive::new(name.clone())),
        Sym::Partial { func, args } => AbstractFunction::Partial {
            func: Box::new(function_of(func)),
            args: args.iter().map(abstract_of).collect(),
        },
        _ => AbstractFunction::Primitive(Primitive::new("call")),
    }
}

pub struct Evaluator<'a> {
    session: &'a mut GraphSession,
}

impl<'a> Evaluator<'a> {
    pub fn new(session: &'a mut GraphSession) -> Self {
        Self { session }
    }

    pub fn call_graph(&mut self, graph: GraphId, args: Vec<Sym>) -> Result<Sym> {
        self.eval(graph, args, HashMap::new())
    }

    /// Calls any function-valued symbol.
    pub fn call(&mut self, callee: Sym, args: Vec<Sym>) -> Result<Sym> {
        self.apply(callee, args)
    }

    fn eval(&mut self, graph: GraphId, args: Vec<Sym>, env: HashMap<NodeId, Sym>) -> Result<Sym> {
        let params = self.session.store().parameters(graph).to_vec();
        if params.len() != args.len() {
            bail!(
                "graph @{} takes {} argument(s), got {}",
                self.session.store().graph(graph).name,
                params.len(),
                args.len()
            );
        }
        let mut frame = env;
        frame.extend(params.into_iter().zip(args));
        let output = self.session.store().output(graph)?;
        self.eval_node(output, &mut frame)
    }

    fn eval_node(&mut self, node: NodeId, frame: &mut HashMap<NodeId, Sym>) -> Result<Sym> {
        if let Some(value) = frame.get(&node) {
            return Ok(value.clone());
        }
        let kind = self.session.store().node(node).kind.clone();
        let value = match kind {
            NodeKind::Parameter { index } => bail!("unbound parameter %{} (#{index})", node.0),
            NodeKind::Value(value) => from_value(&value, frame),
            NodeKind::Call { inputs } => {
                let mut evaluated = Vec::with_capacity(inputs.len());
                for input in inputs.iter() {
                    evaluated.push(self.eval_node(*input, frame)?);
                }
                let op = evaluated.remove(0);
                self.apply(op, evaluated)?
            }
        };
        frame.insert(node, value.clone());
        Ok(value)
    }

    fn apply(&mut self, op: Sym, args: Vec<Sym>) -> Result<Sym> {
        match op {
            Sym::Func(Value::Primitive(prim)) => apply_primitive(&prim, args),
            Sym::Func(Value::Meta(meta)) => {
                let abs = args.iter().map(abstract_of).collect::<Vec<_>>();
                let graph = self.session.generate(&meta, &abs)?;
                self.eval(graph, args, HashMap::new())
            }
            Sym::Func(Value::Graph(graph)) => self.eval(graph, args, HashMap::new()),
            Sym::Func(Value::Multitype(name)) => Ok(Sym::Apply { op: name, args }),
            Sym::Closure { graph, env } => self.eval(graph, args, env),
            Sym::Partial { func, args: bound } => {
                let mut all = bound;
                all.extend(args);
                self.apply(*func, all)
            }
            Sym::Apply { op, args: marked } if op == J => {
                let forward = marked.into_iter().next().ok_or_else(|| anyhow!("J without function"))?;
                Ok(Sym::Tuple(vec![
                    Sym::Apply {
                        op: "f_out".to_string(),
                        args: vec![forward],
                    },
                    Sym::Bprop { inputs: args },
                ]))
            }
            Sym::Bprop { inputs } => {
                let mut result = vec![Sym::Env];
                result.extend(inputs.iter().enumerate().map(|(i, input)| Sym::Leaf {
                    name: format!("d{i}"),
                    abs: abstract_of(input),
                }));
                Ok(Sym::Tuple(result))
            }
            other => {
                let mut all = vec![other];
                all.extend(args);
                Ok(Sym::Apply {
                    op: "call".to_string(),
                    args: all,
                })
            }
        }
    }
}

fn from_value(value: &Value, frame: &HashMap<NodeId, Sym>) -> Sym {
    match value {
        Value::Int(value) => Sym::Int(*value),
        Value::None => Sym::None,
        Value::Tuple(items) => Sym::Tuple(items.iter().map(|item| from_value(item, frame)).collect()),
        Value::Graph(graph) => Sym::Closure {
            graph: *graph,
            env: frame.clone(),
        },
        Value::Primitive(_) | Value::Meta(_) | Value::Multitype(_) => Sym::Func(value.clone()),
        other => Sym::Const(other.clone()),
    }
}

fn index_into(seq: &Sym, index: &Sym) -> Option<Sym> {
    let (Sym::Tuple(items) | Sym::List(items)) = seq else {
        return None;
    };
    let Sym::Int(index) = index else {
        return None;
    };
    usize::try_from(*index).ok().and_then(|i| items.get(i).cloned())
}

fn apply_primitive(prim: &Primitive, args: Vec<Sym>) -> Result<Sym> {
    let name = prim.name();
    Ok(match name {
        MAKE_TUPLE => Sym::Tuple(args),
        MAKE_LIST => Sym::List(args),
        TUPLE_GETITEM | LIST_GETITEM => match args.as_slice() {
            [seq, index] => index_into(seq, index)
                .ok_or_else(|| anyhow!("{name}: cannot index {seq} with {index}"))?,
            _ => bail!("{name} expects 2 arguments"),
        },
        SWITCH_LAYER => match args.as_slice() {
            [index, functions] => index_into(functions, index)
                .ok_or_else(|| anyhow!("switch_layer: cannot select {index} from {functions}"))?,
            _ => bail!("switch_layer expects 2 arguments"),
        },
        PARTIAL => {
            let mut args = args.into_iter();
            let func = args.next().ok_or_else(|| anyhow!("Partial without function"))?;
            Sym::Partial {
                func: Box::new(func),
                args: args.collect(),
            }
        }
        ENVIRON_CREATE => Sym::Env,
        _ => Sym::Apply {
            op: name.to_string(),
            args,
        },
    })
}

fn join(items: &[Sym]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sym::Leaf { name, .. } => write!(f, "{name}"),
            Sym::Int(value) => write!(f, "{value}"),
            Sym::None => write!(f, "None"),
            Sym::Const(value) => write!(f, "{value}"),
            Sym::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Sym::Tuple(items) => write!(f, "({})", join(items)),
            Sym::List(items) => write!(f, "[{}]", join(items)),
            Sym::Func(value) => write!(f, "{value}"),
            Sym::Closure { graph, .. } => write!(f, "<closure @g{}>", graph.0),
            Sym::Partial { func, args } => write!(f, "partial({func}, {})", join(args)),
            Sym::Apply { op, args } => write!(f, "{op}({})", join(args)),
            Sym::Bprop { .. } => write!(f, "bprop"),
            Sym::Env => write!(f, "env"),
        }
    }
}
