// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation.
//!
//! Every pass recomputes the whole graph: input lists are rebuilt from the
//! connections, then each node's value is derived from its operands' current
//! values. There is no incremental path.

use crate::graph::{CycleError, Graph};
use crate::math;
use crate::node::{NodeFamily, NodeId, NodeKind, Requirement};
use crate::port::{PortValue, Shape, MAX_INPUTS};
use serde::{Deserialize, Serialize};

/// Order in which a pass visits nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvaluationOrder {
    /// Producers before consumers; one pass reaches a fixed point
    #[default]
    Topological,
    /// Storage order. A consumer stored ahead of its producer reads the
    /// producer's value from the previous pass.
    Storage,
}

/// Outcome of a full pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Number of nodes visited
    pub evaluated: usize,
    /// Nodes left without a value, in storage order
    pub invalid: Vec<NodeId>,
}

impl EvaluationReport {
    /// Whether every node has a value
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// Graph contains a cycle
    #[error("Graph contains a cycle through node {0}")]
    CycleDetected(NodeId),
}

impl From<CycleError> for EvaluationError {
    fn from(err: CycleError) -> Self {
        Self::CycleDetected(err.0)
    }
}

/// Recomputes node values
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    order: EvaluationOrder,
}

impl Evaluator {
    /// Create an evaluator with topological ordering
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the visitation order
    pub fn with_order(mut self, order: EvaluationOrder) -> Self {
        self.order = order;
        self
    }

    /// Visitation order
    pub fn order(&self) -> EvaluationOrder {
        self.order
    }

    /// Recompute every node in the graph.
    ///
    /// On a cycle all values are cleared and nothing is evaluated.
    pub fn recompute_all(&self, graph: &mut Graph) -> Result<EvaluationReport, EvaluationError> {
        graph.rebuild_inputs();

        let sorted = match graph.topological_order() {
            Ok(sorted) => sorted,
            Err(err) => {
                tracing::warn!("Evaluation aborted: {}", err);
                graph.clear_outputs();
                return Err(err.into());
            }
        };
        let order = match self.order {
            EvaluationOrder::Topological => sorted,
            EvaluationOrder::Storage => graph.node_ids().collect(),
        };

        for &node_id in &order {
            let value = evaluate_node(graph, node_id);
            if let Some(node) = graph.node_mut(node_id) {
                node.output = value;
            }
        }

        let invalid: Vec<NodeId> = graph
            .nodes()
            .filter(|node| !node.is_valid())
            .map(|node| node.id())
            .collect();
        tracing::debug!(
            "Evaluated {} node(s), {} without a value",
            order.len(),
            invalid.len()
        );

        Ok(EvaluationReport {
            evaluated: order.len(),
            invalid,
        })
    }
}

/// Channel selection of a texture sample or vertex color node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// All four channels
    Rgba,
    /// Color without alpha
    Rgb,
    /// A single channel, 0 = r through 3 = a
    Single(usize),
}

impl Channel {
    /// Decode a mode value: 0 is rgba, 1 is rgb, 2..=5 pick r, g, b or a.
    pub fn from_mode(mode: f32) -> Self {
        match mode.round() as i32 {
            0 => Self::Rgba,
            1 => Self::Rgb,
            m => Self::Single((m - 2).clamp(0, 3) as usize),
        }
    }

    /// Mode carried by an optional channel input; unconnected means rgba.
    pub fn from_input(value: Option<&PortValue>) -> Self {
        value.map_or(Self::Rgba, |v| Self::from_mode(v.get(0)))
    }

    /// Shape of the selected channels
    pub fn shape(self) -> Shape {
        match self {
            Self::Rgba => Shape::Vec4,
            Self::Rgb => Shape::Vec3,
            Self::Single(_) => Shape::Scalar,
        }
    }

    /// GLSL swizzle suffix
    pub fn swizzle(self) -> &'static str {
        match self {
            Self::Rgba => "",
            Self::Rgb => ".rgb",
            Self::Single(0) => ".r",
            Self::Single(1) => ".g",
            Self::Single(2) => ".b",
            Self::Single(_) => ".a",
        }
    }
}

/// Current values feeding a node, by slot.
struct Operands {
    slots: [Option<PortValue>; MAX_INPUTS],
}

impl Operands {
    fn gather(graph: &Graph, inputs: &[Option<NodeId>; MAX_INPUTS]) -> Self {
        let mut slots = [None; MAX_INPUTS];
        for (slot, input) in slots.iter_mut().zip(inputs) {
            *slot = input.and_then(|id| graph.node(id)).map(|node| *node.output());
        }
        Self { slots }
    }

    fn get(&self, index: usize) -> Option<&PortValue> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Connected operands in slot order
    fn filled(&self) -> impl Iterator<Item = &PortValue> {
        self.slots.iter().flatten()
    }

    /// Whether the operands satisfy `requirement` with usable values.
    fn satisfies(&self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::None => true,
            Requirement::AnySlot => {
                self.filled().next().is_some() && self.filled().all(|v| !v.is_empty())
            }
            Requirement::Leading(count) => (0..count).all(|i| self.get(i).is_some_and(|v| !v.is_empty())),
        }
    }

    fn at(&self, index: usize) -> PortValue {
        self.get(index).copied().unwrap_or_default()
    }
}

/// Compute the value of one node from its operands' current values.
fn evaluate_node(graph: &Graph, node_id: NodeId) -> PortValue {
    let Some(node) = graph.node(node_id) else {
        return PortValue::EMPTY;
    };
    let kind = node.kind();
    let operands = Operands::gather(graph, node.inputs());

    if !operands.satisfies(kind.requirement()) {
        return PortValue::EMPTY;
    }

    match kind.family() {
        NodeFamily::Environment => PortValue::zeroed(kind.natural_shape()),
        NodeFamily::Literal => *node.literal(),
        NodeFamily::Sink => sink_value(kind, operands.get(0)),
        NodeFamily::Arithmetic => fold(&operands, kind).unwrap_or_default(),
        NodeFamily::Operator => operator(kind, &operands).unwrap_or_default(),
    }
}

fn sink_value(kind: NodeKind, input: Option<&PortValue>) -> PortValue {
    match input {
        Some(value) => value.widen_to_vec4(),
        None if kind == NodeKind::FragmentOutput => math::vector(&[1.0; 4]),
        None => math::vector(&[0.0, 0.0, 0.0, 1.0]),
    }
}

/// Left fold over the connected operands in slot order.
fn fold(operands: &Operands, kind: NodeKind) -> Option<PortValue> {
    let mut values = operands.filled();
    let mut acc = *values.next()?;
    for rhs in values {
        acc = match kind {
            NodeKind::Add => math::zip(&acc, rhs, |a, b| a + b),
            NodeKind::Subtract => math::zip(&acc, rhs, |a, b| a - b),
            NodeKind::Multiply => multiply(&acc, rhs),
            NodeKind::Divide => math::zip(&acc, rhs, |a, b| a / b),
            NodeKind::Max => math::zip(&acc, rhs, f32::max),
            NodeKind::Min => math::zip(&acc, rhs, f32::min),
            _ => None,
        }?;
    }
    Some(acc)
}

/// Product of two operands. A mat4 paired with a vec4 transforms the vector
/// whichever side it is on; two matrices compose.
pub(crate) fn multiply(lhs: &PortValue, rhs: &PortValue) -> Option<PortValue> {
    match (lhs.len(), rhs.len()) {
        (16, 4) => Some(math::mat4_mul_vec4(lhs, rhs)),
        (4, 16) => Some(math::mat4_mul_vec4(rhs, lhs)),
        (16, 16) => Some(math::mat4_mul(lhs, rhs)),
        _ => math::zip(lhs, rhs, |a, b| a * b),
    }
}

fn unary(kind: NodeKind) -> Option<fn(f32) -> f32> {
    let op: fn(f32) -> f32 = match kind {
        NodeKind::Abs => f32::abs,
        NodeKind::Cos => f32::cos,
        NodeKind::Sin => f32::sin,
        NodeKind::Tan => f32::tan,
        NodeKind::Radians => f32::to_radians,
        NodeKind::Degrees => f32::to_degrees,
        NodeKind::Negate => |x| -x,
        NodeKind::Reciprocal => f32::recip,
        NodeKind::Sqrt => f32::sqrt,
        NodeKind::Trunc => f32::trunc,
        NodeKind::Round => f32::round,
        NodeKind::Ceil => f32::ceil,
        NodeKind::Floor => f32::floor,
        NodeKind::Fract => |x| x - x.floor(),
        NodeKind::Saturate => |x| x.clamp(0.0, 1.0),
        NodeKind::Exp2 => f32::exp2,
        NodeKind::OneMinus => |x| 1.0 - x,
        _ => return None,
    };
    Some(op)
}

fn operator(kind: NodeKind, operands: &Operands) -> Option<PortValue> {
    use NodeKind as K;

    if let Some(op) = unary(kind) {
        return Some(math::map(&operands.at(0), op));
    }

    let a = operands.at(0);
    let b = operands.at(1);
    let same_len = a.len() == b.len();
    match kind {
        K::Max | K::Min => fold(operands, kind),
        K::Append => math::concat(operands.filled()),
        K::Normalize => Some(math::normalize(&a)),
        K::Length => Some(PortValue::scalar(math::length(&a))),
        K::Dot => same_len.then(|| PortValue::scalar(math::dot(&a, &b))),
        K::Distance => {
            let diff = same_len.then(|| math::zip(&a, &b, |x, y| x - y)).flatten()?;
            Some(PortValue::scalar(math::length(&diff)))
        }
        K::Cross => (a.len() == 3 && b.len() == 3).then(|| math::cross(&a, &b)),
        K::Project => same_len.then(|| project(&a, &b)),
        K::Reject => {
            let projected = same_len.then(|| project(&a, &b))?;
            math::zip(&a, &projected, |x, y| x - y)
        }
        K::HalfDirection => {
            let sum = same_len
                .then(|| math::zip(&math::normalize(&a), &math::normalize(&b), |x, y| x + y))
                .flatten()?;
            Some(math::normalize(&sum))
        }
        K::Desaturate => Some(desaturate(&a, b.get(0))),
        K::Power => math::zip(&a, &b, f32::powf),
        K::Posterize => math::zip(&a, &b, |v, n| (v * n).floor() / n),
        K::Step => math::zip(&a, &b, |v, t| if v <= t { 1.0 } else { 0.0 }),
        K::Lerp => ternary(&a, &b, &operands.at(2), math::lerp),
        K::Smoothstep => ternary(&a, &b, &operands.at(2), math::smoothstep),
        K::Transpose => (a.len() == 16).then(|| math::transpose(&a)),
        K::MatrixMultiply => (a.len() == 16 && b.len() == 16).then(|| math::mat4_mul(&a, &b)),
        K::TextureSample => Some(PortValue::zeroed(Channel::from_input(operands.get(1)).shape())),
        K::VertexColor => Some(PortValue::zeroed(Channel::from_input(operands.get(0)).shape())),
        _ => None,
    }
}

/// `(a.b / b.b) * b`, zero when `b` is the zero vector.
fn project(a: &PortValue, b: &PortValue) -> PortValue {
    let denom = math::dot(b, b);
    if denom == 0.0 {
        return PortValue::zeroed(a.shape());
    }
    let k = math::dot(a, b) / denom;
    math::map(b, |x| x * k)
}

/// Blend rgb toward `0.3r + 0.6g + 0.1b`; a fourth component passes through.
fn desaturate(color: &PortValue, amount: f32) -> PortValue {
    let luma = 0.3 * color.get(0) + 0.6 * color.get(1) + 0.1 * color.get(2);
    let mut data = *color.data();
    for x in data.iter_mut().take(3) {
        *x = math::lerp(*x, luma, amount);
    }
    math::vector(&data[..color.len()])
}

/// Component-wise three-operand op. Scalars broadcast; vector operands must
/// agree in length.
fn ternary(a: &PortValue, b: &PortValue, c: &PortValue, op: fn(f32, f32, f32) -> f32) -> Option<PortValue> {
    let lens = [a.len(), b.len(), c.len()];
    let wide = lens.iter().copied().max().unwrap_or(0);
    if lens.iter().any(|&l| l != 1 && l != wide) {
        return None;
    }
    let pick = |v: &PortValue, i: usize| if v.len() == 1 { v.get(0) } else { v.get(i) };
    let out: Vec<f32> = (0..wide).map(|i| op(pick(a, i), pick(b, i), pick(c, i))).collect();
    Some(math::vector(&out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeInit;
    use crate::port::Slot;
    use approx::assert_relative_eq;

    fn literal(graph: &mut Graph, values: &[f32]) -> NodeId {
        let kind = match values.len() {
            1 => NodeKind::Float,
            2 => NodeKind::Vector2,
            3 => NodeKind::Vector3,
            4 => NodeKind::Vector4,
            _ => NodeKind::Matrix4,
        };
        graph.create_node(kind, NodeInit::Literal(values.to_vec())).unwrap()
    }

    fn op(graph: &mut Graph, kind: NodeKind, inputs: &[NodeId]) -> NodeId {
        let node = graph.create_node(kind, NodeInit::Default).unwrap();
        for (slot, input) in inputs.iter().enumerate() {
            graph.connect(*input, node, Some(Slot(slot as u8))).unwrap();
            Evaluator::new().recompute_all(graph).unwrap();
        }
        node
    }

    fn value(graph: &Graph, id: NodeId) -> Vec<f32> {
        graph.node(id).unwrap().output().components().to_vec()
    }

    #[test]
    fn test_matrix_times_vector_transforms() {
        let mut graph = Graph::new();
        let mut m = *PortValue::identity().data();
        m[0] = 2.0;
        m[12] = 5.0;
        let matrix = literal(&mut graph, &m);
        let v = literal(&mut graph, &[1.0, 2.0, 3.0, 1.0]);
        let mul = op(&mut graph, NodeKind::Multiply, &[matrix, v]);
        assert_eq!(value(&graph, mul), vec![7.0, 2.0, 3.0, 1.0]);

        // Vector first still transforms by the matrix.
        let mul2 = op(&mut graph, NodeKind::Multiply, &[v, matrix]);
        assert_eq!(value(&graph, mul2), vec![7.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_two_matrices_multiply_as_matrices() {
        let mut graph = Graph::new();
        let mut scale = *PortValue::identity().data();
        scale[0] = 2.0;
        let mut translate = *PortValue::identity().data();
        translate[12] = 5.0;
        let a = literal(&mut graph, &scale);
        let b = literal(&mut graph, &translate);
        let mul = op(&mut graph, NodeKind::Multiply, &[a, b]);

        let out = value(&graph, mul);
        assert_eq!(out.len(), 16);
        assert_eq!(out[0], 2.0);
        // Component-wise would leave 0 here.
        assert_eq!(out[12], 10.0);
        assert_eq!(out[15], 1.0);
    }

    #[test]
    fn test_arithmetic_folds_in_slot_order() {
        let mut graph = Graph::new();
        let a = literal(&mut graph, &[10.0, 20.0]);
        let b = literal(&mut graph, &[1.0, 2.0]);
        let c = literal(&mut graph, &[3.0, 4.0]);
        let sub = graph.create_node(NodeKind::Subtract, NodeInit::Default).unwrap();
        graph.connect(c, sub, Some(Slot(2))).unwrap();
        graph.connect(b, sub, Some(Slot(1))).unwrap();
        graph.connect(a, sub, Some(Slot(0))).unwrap();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        assert_eq!(value(&graph, sub), vec![6.0, 14.0]);
    }

    #[test]
    fn test_scalar_broadcast_multiply() {
        let mut graph = Graph::new();
        let v = literal(&mut graph, &[1.0, 2.0, 3.0]);
        let s = literal(&mut graph, &[2.0]);
        let mul = op(&mut graph, NodeKind::Multiply, &[v, s]);
        assert_eq!(value(&graph, mul), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_vector_ops() {
        let mut graph = Graph::new();
        let a = literal(&mut graph, &[3.0, 4.0, 0.0]);
        let b = literal(&mut graph, &[1.0, 0.0, 0.0]);

        let dot = op(&mut graph, NodeKind::Dot, &[a, b]);
        let len = op(&mut graph, NodeKind::Length, &[a]);
        let dist = op(&mut graph, NodeKind::Distance, &[a, b]);
        let proj = op(&mut graph, NodeKind::Project, &[a, b]);
        let rej = op(&mut graph, NodeKind::Reject, &[a, b]);
        let cross = op(&mut graph, NodeKind::Cross, &[b, a]);

        assert_eq!(value(&graph, dot), vec![3.0]);
        assert_eq!(value(&graph, len), vec![5.0]);
        assert_relative_eq!(value(&graph, dist)[0], 20.0f32.sqrt());
        assert_eq!(value(&graph, proj), vec![3.0, 0.0, 0.0]);
        assert_eq!(value(&graph, rej), vec![0.0, 4.0, 0.0]);
        assert_eq!(value(&graph, cross), vec![0.0, 0.0, 4.0]);
    }

    #[test]
    fn test_power_step_posterize() {
        let mut graph = Graph::new();
        let v = literal(&mut graph, &[0.25, 0.75]);
        let two = literal(&mut graph, &[2.0]);
        let half = literal(&mut graph, &[0.5]);

        let pow = op(&mut graph, NodeKind::Power, &[v, two]);
        let step = op(&mut graph, NodeKind::Step, &[v, half]);
        let post = op(&mut graph, NodeKind::Posterize, &[v, two]);
        let powered = value(&graph, pow);
        assert_relative_eq!(powered[0], 0.0625);
        assert_relative_eq!(powered[1], 0.5625);
        assert_eq!(value(&graph, step), vec![1.0, 0.0]);
        assert_eq!(value(&graph, post), vec![0.0, 0.5]);
    }

    #[test]
    fn test_lerp_and_desaturate() {
        let mut graph = Graph::new();
        let a = literal(&mut graph, &[0.0, 0.0, 0.0]);
        let b = literal(&mut graph, &[1.0, 2.0, 4.0]);
        let t = literal(&mut graph, &[0.5]);
        let lerp = op(&mut graph, NodeKind::Lerp, &[a, b, t]);
        assert_eq!(value(&graph, lerp), vec![0.5, 1.0, 2.0]);

        let color = literal(&mut graph, &[1.0, 0.0, 0.0, 0.5]);
        let one = literal(&mut graph, &[1.0]);
        let desat = op(&mut graph, NodeKind::Desaturate, &[color, one]);
        let out = value(&graph, desat);
        assert_relative_eq!(out[0], 0.3);
        assert_relative_eq!(out[1], 0.3);
        assert_eq!(out[3], 0.5);
    }

    #[test]
    fn test_channel_mode_drives_shape() {
        let mut graph = Graph::new();
        let sample = graph.create_node(NodeKind::TextureSample, NodeInit::Default).unwrap();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        assert_eq!(graph.node(sample).unwrap().output().shape(), Shape::Vec4);

        let mode = literal(&mut graph, &[1.0]);
        graph.connect(mode, sample, Some(Slot(1))).unwrap();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        assert_eq!(graph.node(sample).unwrap().output().shape(), Shape::Vec3);

        graph.set_literal(mode, &[4.0]).unwrap();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        assert_eq!(graph.node(sample).unwrap().output().shape(), Shape::Scalar);
        assert_eq!(Channel::from_mode(4.0).swizzle(), ".b");
    }

    #[test]
    fn test_sinks_widen_or_default() {
        let mut graph = Graph::new();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        assert_eq!(value(&graph, graph.vertex_sink()), vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(value(&graph, graph.fragment_sink()), vec![1.0; 4]);

        let s = literal(&mut graph, &[0.5]);
        graph.connect(s, graph.fragment_sink(), None).unwrap();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        assert_eq!(value(&graph, graph.fragment_sink()), vec![0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_missing_inputs_leave_node_invalid() {
        let mut graph = Graph::new();
        let a = literal(&mut graph, &[1.0, 2.0, 3.0]);
        let dot = graph.create_node(NodeKind::Dot, NodeInit::Default).unwrap();
        graph.connect(a, dot, None).unwrap();
        let report = Evaluator::new().recompute_all(&mut graph).unwrap();
        assert_eq!(report.invalid, vec![dot]);

        let edge = graph.edge_between(a, dot).unwrap().id;
        graph.destroy_edge(edge).unwrap();
        let sin = graph.create_node(NodeKind::Sin, NodeInit::Default).unwrap();
        graph.connect(a, sin, None).unwrap();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        graph.destroy_edge(graph.edge_between(a, sin).unwrap().id).unwrap();
        Evaluator::new().recompute_all(&mut graph).unwrap();
        assert!(!graph.node(sin).unwrap().is_valid());
        assert_eq!(graph.node(sin).unwrap().output().data(), &[0.0; 16]);
    }

    #[test]
    fn test_topological_pass_is_idempotent() {
        let mut graph = Graph::new();
        let consumer = graph.create_node(NodeKind::Negate, NodeInit::Default).unwrap();
        let producer = graph.create_node(NodeKind::Sin, NodeInit::Default).unwrap();
        let source = literal(&mut graph, &[0.5]);
        graph.connect(source, producer, None).unwrap();
        graph.connect(producer, consumer, None).unwrap();

        let evaluator = Evaluator::new();
        evaluator.recompute_all(&mut graph).unwrap();
        let first = value(&graph, consumer);
        evaluator.recompute_all(&mut graph).unwrap();
        assert_eq!(first, value(&graph, consumer));
        assert_relative_eq!(first[0], -(0.5f32.sin()));
    }

    #[test]
    fn test_storage_order_reads_stale_values() {
        let mut graph = Graph::new();
        let consumer = graph.create_node(NodeKind::Negate, NodeInit::Default).unwrap();
        let producer = graph.create_node(NodeKind::Sin, NodeInit::Default).unwrap();
        let source = literal(&mut graph, &[0.5]);
        graph.connect(source, producer, None).unwrap();
        graph.connect(producer, consumer, None).unwrap();

        let evaluator = Evaluator::new().with_order(EvaluationOrder::Storage);
        evaluator.recompute_all(&mut graph).unwrap();
        let first = *graph.node(consumer).unwrap().output();
        evaluator.recompute_all(&mut graph).unwrap();
        let second = *graph.node(consumer).unwrap().output();
        assert_ne!(first, second);
        assert!(first.is_empty());
    }

    #[test]
    fn test_cycle_clears_values() {
        let mut graph = Graph::new();
        let a = graph.create_node(NodeKind::Negate, NodeInit::Default).unwrap();
        let b = graph.create_node(NodeKind::Abs, NodeInit::Default).unwrap();
        let lit = literal(&mut graph, &[1.0]);
        graph.insert_unchecked(a, b, Slot(0));
        graph.insert_unchecked(b, a, Slot(0));

        let err = Evaluator::new().recompute_all(&mut graph).unwrap_err();
        assert!(matches!(err, EvaluationError::CycleDetected(_)));
        assert!(graph.node(lit).unwrap().output().is_empty());
    }
}
