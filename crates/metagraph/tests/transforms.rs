mod common;

use common::{init_logging, leaves, tuple, Evaluator, Sym};
use metagraph::composite::{Shard, TaylorOperation, VmapOperation};
use metagraph::ir::primitive::VMAP;
use metagraph::ir::validate_closure;
use metagraph::{
    AbstractValue, CompositeError, ErrorKind, GraphFlag, GraphId, GraphSession, MetaGraph,
    Primitive, Value,
};

fn forward(session: &mut GraphSession, nparam: usize) -> GraphId {
    let store = session.store_mut();
    let f = store.new_graph("f");
    let params = (0..nparam).map(|_| store.add_parameter(f)).collect::<Vec<_>>();
    let out = store.call_value(f, Primitive::new("mul"), params);
    store.set_output(f, out);
    f
}

fn child_of(session: &GraphSession, outer: GraphId) -> GraphId {
    let store = session.store();
    store
        .value_of(store.output(outer).unwrap())
        .and_then(Value::as_graph)
        .unwrap()
}

fn error_kind(err: &anyhow::Error) -> ErrorKind {
    err.downcast_ref::<CompositeError>().unwrap().kind()
}

fn vmap_args(f: GraphId, in_axes: AbstractValue, out_axes: AbstractValue) -> Vec<AbstractValue> {
    vec![AbstractValue::graph(f), in_axes, out_axes]
}

#[test]
fn vmap_wraps_the_function_in_a_marker() {
    init_logging();
    let mut session = GraphSession::with_capacity(8);
    let f = forward(&mut session, 2);
    let in_axes = AbstractValue::tuple(vec![AbstractValue::int(0), AbstractValue::None]);
    let vmap_fg = session
        .generate(
            &VmapOperation.into(),
            &vmap_args(f, in_axes, AbstractValue::int(0)),
        )
        .unwrap();

    let store = session.store();
    assert_eq!(store.graph(vmap_fg).name, "vmap{2}");
    assert_eq!(store.parameters(vmap_fg).len(), 3);
    let marker = store
        .topo_order(child_of(&session, vmap_fg))
        .into_iter()
        .find_map(|node| store.callee(node).and_then(Value::as_primitive).filter(|p| p.is(VMAP)))
        .unwrap();
    assert_eq!(
        marker.attr("in_axes"),
        Some(&Value::Tuple(vec![Value::Int(0), Value::None]))
    );
    assert_eq!(marker.attr("out_axes"), Some(&Value::Int(0)));

    let child = child_of(&session, vmap_fg);
    assert!(store.has_flag(child, GraphFlag::KGraph));
    assert!(validate_closure(store, child).is_ok());

    let mut evaluator = Evaluator::new(&mut session);
    let closure = evaluator
        .call_graph(
            vmap_fg,
            vec![
                Sym::Func(Value::Graph(f)),
                tuple(vec![Sym::Int(0), Sym::None]),
                Sym::Int(0),
            ],
        )
        .unwrap();
    let out = evaluator.call(closure, leaves("x", 2)).unwrap();
    assert_eq!(out.to_string(), format!("call(vmap(@g{}), x0, x1)", f.0));
}

#[test]
fn vmap_rejects_malformed_axes() {
    let mut session = GraphSession::with_capacity(8);
    let f = forward(&mut session, 2);
    let meta: MetaGraph = VmapOperation.into();

    let short = AbstractValue::tuple(vec![AbstractValue::int(0)]);
    let err = session
        .generate(&meta, &vmap_args(f, short, AbstractValue::int(0)))
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Value);

    let all_none = AbstractValue::list(vec![AbstractValue::None, AbstractValue::None]);
    let err = session
        .generate(&meta, &vmap_args(f, all_none, AbstractValue::int(0)))
        .unwrap_err();
    assert!(format!("{err:#}").contains("The 'in_axes' of 'vmap' cannot be all None"));

    let err = session
        .generate(&meta, &vmap_args(f, AbstractValue::int(0), AbstractValue::None))
        .unwrap_err();
    assert!(format!("{err:#}").contains("The 'out_axes' of 'vmap' cannot be a single None."));

    let err = session
        .generate(&meta, &[AbstractValue::graph(f)])
        .unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::ArgumentCount);

    let err = session.generate(&meta, &[]).unwrap_err();
    assert_eq!(error_kind(&err), ErrorKind::Precondition);
}

#[test]
fn taylor_forwards_through_its_marker() {
    init_logging();
    let mut session = GraphSession::with_capacity(8);
    let f = forward(&mut session, 1);
    let taylor_fg = session
        .generate(&TaylorOperation.into(), &[AbstractValue::graph(f)])
        .unwrap();
    assert_eq!(session.store().graph(taylor_fg).name, "taylorgrad{1}");
    assert!(session.store().has_flag(f, GraphFlag::DeferInline));
    let child = child_of(&session, taylor_fg);
    assert_eq!(session.store().graph(child).parent(), Some(taylor_fg));

    let mut evaluator = Evaluator::new(&mut session);
    let closure = evaluator
        .call_graph(taylor_fg, vec![Sym::Func(Value::Graph(f))])
        .unwrap();
    let out = evaluator.call(closure, leaves("x", 1)).unwrap();
    assert_eq!(out.to_string(), format!("call(Taylor(@g{}), x0)", f.0));
}

#[test]
fn shard_requires_five_arguments() {
    let mut session = GraphSession::with_capacity(8);
    let f = forward(&mut session, 1);
    let err = session
        .generate(&Shard.into(), &[AbstractValue::graph(f), AbstractValue::None])
        .unwrap_err();
    let inner = err.downcast_ref::<CompositeError>().unwrap();
    assert_eq!(
        inner,
        &CompositeError::ArgumentCount {
            op: "Shard".to_string(),
            expected: 5,
            actual: 2,
        }
    );
}

#[test]
fn shard_marker_receives_every_argument() {
    let mut session = GraphSession::with_capacity(8);
    let f = forward(&mut session, 2);
    let args = [
        AbstractValue::graph(f),
        AbstractValue::tuple(vec![AbstractValue::None]),
        AbstractValue::tuple(vec![AbstractValue::None]),
        AbstractValue::scalar_any(metagraph::ScalarType::String),
        AbstractValue::int(0),
    ];
    let shard_fg = session.generate(&Shard.into(), &args).unwrap();
    assert_eq!(session.store().graph(shard_fg).name, "shard{2}");

    let mut evaluator = Evaluator::new(&mut session);
    let closure = evaluator
        .call_graph(
            shard_fg,
            vec![
                Sym::Func(Value::Graph(f)),
                Sym::None,
                Sym::None,
                Sym::None,
                Sym::Int(0),
            ],
        )
        .unwrap();
    let out = evaluator.call(closure, leaves("x", 2)).unwrap();
    assert_eq!(
        out.to_string(),
        format!("call(Shard(@g{}, None, None, None, 0), x0, x1)", f.0)
    );
}

#[test]
fn transforms_reject_non_function_inputs() {
    let mut session = GraphSession::with_capacity(8);
    let not_a_function = AbstractValue::int(1);
    let cases = [
        (MetaGraph::from(TaylorOperation), vec![not_a_function.clone()]),
        (
            MetaGraph::from(VmapOperation),
            vec![not_a_function, AbstractValue::int(0), AbstractValue::int(0)],
        ),
    ];
    for (meta, args) in cases {
        let err = session.generate(&meta, &args).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::Type);
    }
}
