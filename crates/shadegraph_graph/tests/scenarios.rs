// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end editing scenarios through the public API.

use approx::assert_relative_eq;
use shadegraph_graph::node::Requirement;
use shadegraph_graph::persistence;
use shadegraph_graph::{
    Dialect, EvaluationOrder, Evaluator, Graph, GraphError, GraphSession, LinkError, NodeId,
    NodeInit, NodeKind, SessionError, Slot,
};

fn literal(session: &mut GraphSession, values: &[f32]) -> NodeId {
    let kind = match values.len() {
        1 => NodeKind::Float,
        2 => NodeKind::Vector2,
        3 => NodeKind::Vector3,
        4 => NodeKind::Vector4,
        _ => NodeKind::Matrix4,
    };
    session
        .create_node(kind, NodeInit::Literal(values.to_vec()))
        .unwrap()
}

fn assert_components(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_relative_eq!(*a, *e, epsilon = 1e-6);
    }
}

fn node(session: &mut GraphSession, kind: NodeKind) -> NodeId {
    session.create_node(kind, NodeInit::Default).unwrap()
}

#[test]
fn test_negated_scalar_reaches_fragment_output() {
    let mut session = GraphSession::new();
    let five = literal(&mut session, &[5.0]);
    let negate = node(&mut session, NodeKind::Negate);
    session.connect(five, negate, None).unwrap();
    let sink = session.graph().fragment_sink();
    session.connect(negate, sink, None).unwrap();

    assert_eq!(session.value(negate).unwrap().components(), &[-5.0]);

    let fragment = session.compile(Dialect::Glsl330).unwrap().fragment;
    assert!(fragment.contains(&format!("const float node_{} = 5.0;", five.0)));
    assert!(fragment.contains(&format!("float node_{} = node_{} * -1.0;", negate.0, five.0)));
    assert!(fragment.contains(&format!("frag_color = vec4(vec3(node_{}), 1.0);", negate.0)));
}

#[test]
fn test_shared_sum_is_emitted_once() {
    let mut session = GraphSession::new();
    let a = literal(&mut session, &[1.0, 0.0, 0.0]);
    let shared = literal(&mut session, &[0.0, 1.0, 0.0]);
    let first = node(&mut session, NodeKind::Add);
    let second = node(&mut session, NodeKind::Add);
    session.connect(a, first, None).unwrap();
    session.connect(shared, first, None).unwrap();
    session.connect(first, second, None).unwrap();
    session.connect(shared, second, None).unwrap();
    let sink = session.graph().fragment_sink();
    session.connect(second, sink, None).unwrap();

    assert_eq!(session.value(second).unwrap().components(), &[1.0, 2.0, 0.0]);

    let fragment = session.compile(Dialect::Glsl330).unwrap().fragment;
    assert_eq!(fragment.matches(&format!("vec3 node_{} =", first.0)).count(), 1);
    assert_eq!(fragment.matches(&format!("const vec3 node_{} =", shared.0)).count(), 1);
    assert!(fragment.contains(&format!(
        "vec3 node_{} = node_{} + node_{};",
        second.0, first.0, shared.0
    )));
}

#[test]
fn test_normalize_accepts_vectors_only() {
    let mut session = GraphSession::new();
    let v = literal(&mut session, &[0.0, 3.0, 0.0, 4.0]);
    let s = literal(&mut session, &[2.0]);
    let normalize = node(&mut session, NodeKind::Normalize);

    let err = session.connect(s, normalize, None).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Graph(GraphError::Link(LinkError::ShapeMismatch { source_len: 1, .. }))
    ));
    assert_eq!(session.graph().connection_count(), 0);

    session.connect(v, normalize, None).unwrap();
    assert_components(session.value(normalize).unwrap().components(), &[0.0, 0.6, 0.0, 0.8]);
}

#[test]
fn test_matrix_and_vector_multiply_transforms() {
    // Column-major: scale (2, 3, 4) then translate (5, 6, 7).
    let matrix = [
        2.0, 0.0, 0.0, 0.0, //
        0.0, 3.0, 0.0, 0.0, //
        0.0, 0.0, 4.0, 0.0, //
        5.0, 6.0, 7.0, 1.0,
    ];
    for matrix_first in [true, false] {
        let mut session = GraphSession::new();
        let m = literal(&mut session, &matrix);
        let v = literal(&mut session, &[1.0, 1.0, 1.0, 1.0]);
        let mul = node(&mut session, NodeKind::Multiply);
        let (first, second) = if matrix_first { (m, v) } else { (v, m) };
        session.connect(first, mul, None).unwrap();
        session.connect(second, mul, None).unwrap();

        assert_components(session.value(mul).unwrap().components(), &[7.0, 9.0, 11.0, 1.0]);
    }
}

#[test]
fn test_destroy_node_removes_only_its_edges() {
    let mut session = GraphSession::new();
    let source = literal(&mut session, &[0.25]);
    let hub = node(&mut session, NodeKind::Negate);
    let abs = node(&mut session, NodeKind::Abs);
    let sin = node(&mut session, NodeKind::Sin);
    let cos = node(&mut session, NodeKind::Cos);

    session.connect(source, hub, None).unwrap();
    session.connect(hub, abs, None).unwrap();
    session.connect(hub, sin, None).unwrap();
    let kept_a = session.connect(source, cos, None).unwrap();
    let sink = session.graph().fragment_sink();
    let kept_b = session.connect(abs, sink, None).unwrap();
    assert_eq!(session.graph().connection_count(), 5);

    session.destroy_node(hub).unwrap();

    let graph = session.graph();
    assert_eq!(graph.connection_count(), 2);
    assert!(graph.connections().all(|c| !c.involves_node(hub)));
    assert!(graph.connection(kept_a).unwrap().links(source, cos));
    assert!(graph.connection(kept_b).unwrap().links(abs, sink));
    for id in [source, abs, sin, cos] {
        assert_eq!(graph.node(id).unwrap().id(), id);
    }
    assert!(!session.is_valid(abs));
    assert!(!session.is_valid(sin));
    assert_relative_eq!(session.value(cos).unwrap().get(0), 0.25f32.cos());

    // Reloading compacts ids while keeping both edges.
    let reloaded = persistence::load(&persistence::save(session.graph())).unwrap();
    assert_eq!(reloaded.node_count(), 6);
    assert_eq!(reloaded.connection_count(), 2);
    let max_id = reloaded.node_ids().map(|id| id.0).max().unwrap();
    assert_eq!(max_id, 5);
}

#[test]
fn test_length_invariant_after_recompute() {
    let mut session = GraphSession::new();
    let v = literal(&mut session, &[1.0, 2.0]);
    let time = node(&mut session, NodeKind::Time);
    let mvp = node(&mut session, NodeKind::MvpMatrix);
    let lonely = node(&mut session, NodeKind::Sin);
    let fed = node(&mut session, NodeKind::Abs);
    let mul = node(&mut session, NodeKind::Multiply);
    session.connect(v, fed, None).unwrap();
    session.connect(time, mul, None).unwrap();
    session.connect(fed, mul, None).unwrap();

    for node in session.graph().nodes() {
        let len = node.output().len();
        assert!(matches!(len, 0..=4 | 16), "{} has length {len}", node.kind());
        let starved = node.kind().requirement() != Requirement::None && node.input_count() == 0;
        if starved {
            assert_eq!(len, 0, "{}", node.kind());
        }
    }
    assert!(!session.is_valid(lonely));
    assert_eq!(session.value(mul).unwrap().len(), 2);
    assert_eq!(session.value(mvp).unwrap().len(), 16);
}

#[test]
fn test_topological_recompute_is_a_fixed_point() {
    let mut graph = Graph::new();
    let consumer = graph.create_node(NodeKind::Negate, NodeInit::Default).unwrap();
    let producer = graph.create_node(NodeKind::Sin, NodeInit::Default).unwrap();
    let source = graph
        .create_node(NodeKind::Float, NodeInit::Literal(vec![0.5]))
        .unwrap();
    graph.connect(source, producer, None).unwrap();
    graph.connect(producer, consumer, None).unwrap();

    let topological = Evaluator::new();
    let mut ordered = graph.clone();
    topological.recompute_all(&mut ordered).unwrap();
    let first = *ordered.node(consumer).unwrap().output();
    topological.recompute_all(&mut ordered).unwrap();
    assert_eq!(first, *ordered.node(consumer).unwrap().output());
    assert_relative_eq!(first.get(0), -(0.5f32.sin()));

    // Storage order visits the consumer first and lags one pass behind.
    let storage = Evaluator::new().with_order(EvaluationOrder::Storage);
    let mut stored = graph;
    storage.recompute_all(&mut stored).unwrap();
    let stale = *stored.node(consumer).unwrap().output();
    storage.recompute_all(&mut stored).unwrap();
    assert_ne!(stale, *stored.node(consumer).unwrap().output());
}

#[test]
fn test_saved_graph_compiles_identically() {
    let mut session = GraphSession::new();
    let uv = node(&mut session, NodeKind::Uv);
    let tint = literal(&mut session, &[0.2, 0.4, 0.6]);
    session.set_property(tint, true).unwrap();
    let append = node(&mut session, NodeKind::Append);
    let one = literal(&mut session, &[1.0]);
    session.connect(uv, append, None).unwrap();
    session.connect(one, append, None).unwrap();
    let mul = node(&mut session, NodeKind::Multiply);
    session.connect(append, mul, None).unwrap();
    session.connect(tint, mul, None).unwrap();
    let sink = session.graph().fragment_sink();
    session.connect(mul, sink, None).unwrap();

    let before = session.compile(Dialect::Gles100).unwrap();
    let reloaded = GraphSession::from_graph(persistence::load(&persistence::save(session.graph())).unwrap())
        .unwrap();
    assert_eq!(before, reloaded.compile(Dialect::Gles100).unwrap());
    assert!(before.fragment.contains(&format!("uniform vec3 node_{};", tint.0)));
}

#[test]
fn test_relinked_graph_survives_reload() {
    let mut session = GraphSession::new();
    let a = literal(&mut session, &[3.0, 0.0, 4.0]);
    let b = literal(&mut session, &[0.0, 1.0, 0.0]);
    let negate = node(&mut session, NodeKind::Negate);
    let normalize = node(&mut session, NodeKind::Normalize);
    let dot = node(&mut session, NodeKind::Dot);
    session.connect(a, negate, None).unwrap();
    session.connect(negate, normalize, None).unwrap();
    session.connect(normalize, dot, None).unwrap();
    session.connect(b, dot, None).unwrap();
    let sink = session.graph().fragment_sink();
    session.connect(dot, sink, None).unwrap();

    // Rewire the head of the chain after everything downstream is linked.
    let edge = session.graph().edge_between(a, negate).unwrap().id;
    session.destroy_link(edge).unwrap();
    assert!(!session.is_valid(normalize));
    session.connect(a, negate, None).unwrap();
    session.connect(b, dot, Some(Slot(1))).unwrap();
    assert_components(session.value(normalize).unwrap().components(), &[-0.6, 0.0, -0.8]);

    let reloaded =
        GraphSession::from_graph(persistence::load(&persistence::save(session.graph())).unwrap()).unwrap();
    assert_eq!(reloaded.graph().connection_count(), session.graph().connection_count());
    for before in session.graph().nodes() {
        let after = reloaded.value(before.id()).unwrap();
        assert_components(after.components(), before.output().components());
    }
    assert_eq!(
        session.compile(Dialect::Glsl330).unwrap(),
        reloaded.compile(Dialect::Glsl330).unwrap()
    );
}
