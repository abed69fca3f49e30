// SPDX-License-Identifier: MIT OR Apache-2.0
//! Expression emission.
//!
//! Nodes are emitted post-order so every variable is defined before use.
//! Literals are never emitted here; they are referenced by the name their
//! hoisted declaration gave them.

use super::dialect::Dialect;
use super::{CompileError, Stage};
use crate::evaluation::Channel;
use crate::graph::Graph;
use crate::node::{NodeFamily, NodeId, NodeKind};
use crate::port::{PortValue, MAX_INPUTS};
use std::collections::HashSet;

/// Variable name of a node's result
pub(crate) fn variable(node_id: NodeId) -> String {
    format!("node_{node_id}")
}

/// GLSL float literal; always carries a decimal point.
pub(crate) fn fmt_float(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v}");
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

/// Constructor expression for a literal value.
pub(crate) fn literal_value(value: &PortValue) -> String {
    let parts: Vec<String> = value.components().iter().copied().map(fmt_float).collect();
    match parts.len() {
        1 => parts[0].clone(),
        _ => format!("{}({})", value.shape().glsl_type(), parts.join(", ")),
    }
}

/// Texture unit selected by a sample node's first input; unit 0 when
/// nothing is connected.
pub(crate) fn texture_unit(graph: &Graph, node_id: NodeId) -> u32 {
    graph.inputs_of(node_id)[0]
        .and_then(|id| graph.node(id))
        .map_or(0, |node| node.output().get(0).round().max(0.0) as u32)
}

/// `x` widened to `len` components when it is a scalar.
fn widen(operand: &Operand, len: usize) -> String {
    if operand.len == 1 && len > 1 {
        format!("vec{len}({})", operand.name)
    } else {
        operand.name.clone()
    }
}

#[derive(Debug, Clone)]
struct Operand {
    name: String,
    len: usize,
}

/// Emits one statement per computed node reachable from a root.
pub(super) struct Emitter<'g> {
    graph: &'g Graph,
    dialect: Dialect,
    stage: Stage,
    emitted: HashSet<NodeId>,
    in_progress: HashSet<NodeId>,
    lines: Vec<String>,
}

impl<'g> Emitter<'g> {
    pub(super) fn new(graph: &'g Graph, dialect: Dialect, stage: Stage) -> Self {
        Self {
            graph,
            dialect,
            stage,
            emitted: HashSet::new(),
            in_progress: HashSet::new(),
            lines: Vec::new(),
        }
    }

    /// Emit `node_id` after everything it reads.
    pub(super) fn emit(&mut self, node_id: NodeId) -> Result<(), CompileError> {
        if self.emitted.contains(&node_id) {
            return Ok(());
        }
        if !self.in_progress.insert(node_id) {
            return Err(CompileError::Cycle(node_id));
        }

        let graph = self.graph;
        let node = graph.node(node_id).ok_or(CompileError::Unresolved(node_id))?;
        if !node.is_valid() {
            return Err(CompileError::Unresolved(node_id));
        }

        let mut operands: [Option<Operand>; MAX_INPUTS] = Default::default();
        for (operand, input) in operands.iter_mut().zip(graph.inputs_of(node_id)) {
            let Some(input) = input else { continue };
            self.emit(input)?;
            let len = graph.node(input).map_or(0, |n| n.output().len());
            *operand = Some(Operand { name: variable(input), len });
        }

        if is_statement(node.kind()) {
            let ty = node.output().shape().glsl_type();
            let expr = self.expression(node_id, node.kind(), &operands);
            if let (NodeKind::TextureSample, Stage::Fragment, Some(threshold)) =
                (node.kind(), self.stage, node.alpha_clip())
            {
                let sample = self.sample_call(node_id, &operands);
                self.lines.push(format!("if ({sample}.a < {}) discard;", fmt_float(threshold)));
            }
            self.lines.push(format!("{ty} {} = {expr};", variable(node_id)));
        }

        self.in_progress.remove(&node_id);
        self.emitted.insert(node_id);
        Ok(())
    }

    pub(super) fn into_lines(self) -> Vec<String> {
        self.lines
    }

    fn position(&self) -> &'static str {
        match self.stage {
            Stage::Vertex => "a_position",
            Stage::Fragment => "v_position",
        }
    }

    fn normal(&self) -> &'static str {
        match self.stage {
            Stage::Vertex => "a_normal",
            Stage::Fragment => "normalize(v_normal)",
        }
    }

    fn uv(&self) -> &'static str {
        match self.stage {
            Stage::Vertex => "a_uv",
            Stage::Fragment => "v_uv",
        }
    }

    fn view_direction(&self) -> String {
        format!("normalize(u_camera_position - {})", self.position())
    }

    fn sample_call(&self, node_id: NodeId, operands: &[Option<Operand>; MAX_INPUTS]) -> String {
        let unit = texture_unit(self.graph, node_id);
        let uv = operands[2].as_ref().map_or(self.uv(), |o| o.name.as_str());
        format!("{}(texture_{unit}, {uv})", self.dialect.texture())
    }

    fn expression(&self, node_id: NodeId, kind: NodeKind, operands: &[Option<Operand>; MAX_INPUTS]) -> String {
        use NodeKind as K;

        let filled: Vec<&Operand> = operands.iter().flatten().collect();
        let name = |i: usize| operands[i].as_ref().map_or("0.0", |o| o.name.as_str());
        let a = name(0);
        let b = name(1);

        match kind {
            K::Time => "u_time".to_string(),
            K::Position => self.position().to_string(),
            K::Normal => self.normal().to_string(),
            K::Uv => self.uv().to_string(),
            K::MvpMatrix => "u_mvp".to_string(),
            K::ViewDirection => self.view_direction(),
            K::Fresnel => format!(
                "pow(1.0 - clamp(dot({}, {}), 0.0, 1.0), 5.0)",
                self.normal(),
                self.view_direction()
            ),
            K::VertexColor => {
                let color = match self.stage {
                    Stage::Vertex => "a_color",
                    Stage::Fragment => "v_color",
                };
                let channel = Channel::from_input(self.operand_value(node_id, 0).as_ref());
                format!("{color}{}", channel.swizzle())
            }
            K::TextureSample => {
                let channel = Channel::from_input(self.operand_value(node_id, 1).as_ref());
                format!("{}{}", self.sample_call(node_id, operands), channel.swizzle())
            }

            K::Add => join(&filled, " + "),
            K::Subtract => join(&filled, " - "),
            K::Divide => join(&filled, " / "),
            K::Multiply => multiply_chain(&filled),
            K::Max | K::Min => {
                let func = if kind == K::Max { "max" } else { "min" };
                let mut iter = filled.iter();
                let mut acc = iter.next().map_or_else(String::new, |o| o.name.clone());
                for operand in iter {
                    acc = format!("{func}({acc}, {})", operand.name);
                }
                acc
            }
            K::Append => {
                let total: usize = filled.iter().map(|o| o.len).sum();
                match filled.as_slice() {
                    [only] => only.name.clone(),
                    _ => format!("vec{total}({})", join(&filled, ", ")),
                }
            }

            K::Abs => format!("abs({a})"),
            K::Cos => format!("cos({a})"),
            K::Sin => format!("sin({a})"),
            K::Tan => format!("tan({a})"),
            K::Radians => format!("radians({a})"),
            K::Degrees => format!("degrees({a})"),
            K::Negate => format!("{a} * -1.0"),
            K::Reciprocal => format!("1.0 / {a}"),
            K::Sqrt => format!("sqrt({a})"),
            K::Trunc => self.dialect.trunc(a),
            K::Round => self.dialect.round(a),
            K::Ceil => format!("ceil({a})"),
            K::Floor => format!("floor({a})"),
            K::Fract => format!("fract({a})"),
            K::Saturate => format!("clamp({a}, 0.0, 1.0)"),
            K::Exp2 => format!("exp2({a})"),
            K::OneMinus => format!("1.0 - {a}"),

            K::Normalize => format!("normalize({a})"),
            K::Length => format!("length({a})"),
            K::Dot => format!("dot({a}, {b})"),
            K::Cross => format!("cross({a}, {b})"),
            K::Distance => format!("distance({a}, {b})"),
            K::Project => format!("(dot({a}, {b}) / dot({b}, {b})) * {b}"),
            K::Reject => format!("{a} - (dot({a}, {b}) / dot({b}, {b})) * {b}"),
            K::HalfDirection => format!("normalize(normalize({a}) + normalize({b}))"),
            K::Desaturate => {
                let luma = "vec3(0.3, 0.6, 0.1)";
                match operands[0].as_ref().map_or(3, |o| o.len) {
                    4 => format!("vec4(mix({a}.rgb, vec3(dot({a}.rgb, {luma})), {b}), {a}.a)"),
                    _ => format!("mix({a}, vec3(dot({a}, {luma})), {b})"),
                }
            }

            K::Power | K::Step => {
                let len = operands[0].as_ref().map_or(1, |o| o.len);
                let exponent = operands[1].as_ref().map_or_else(|| "0.0".to_string(), |o| widen(o, len));
                let func = if kind == K::Power { "pow" } else { "step" };
                format!("{func}({a}, {exponent})")
            }
            K::Posterize => format!("floor({a} * {b}) / {b}"),
            K::Lerp | K::Smoothstep => {
                let wide = filled.iter().map(|o| o.len).max().unwrap_or(1);
                let args: Vec<String> = filled.iter().map(|o| widen(o, wide)).collect();
                let func = if kind == K::Lerp { "mix" } else { "smoothstep" };
                format!("{func}({})", args.join(", "))
            }

            K::Transpose => self.dialect.transpose(a),
            K::MatrixMultiply => format!("{a} * {b}"),

            // Literals and sinks never reach here.
            K::Float | K::Vector2 | K::Vector3 | K::Vector4 | K::Matrix4 => variable(node_id),
            K::VertexOutput | K::FragmentOutput => a.to_string(),
        }
    }

    fn operand_value(&self, node_id: NodeId, slot: usize) -> Option<PortValue> {
        self.graph.inputs_of(node_id)[slot]
            .and_then(|id| self.graph.node(id))
            .map(|node| *node.output())
    }
}

fn join(operands: &[&Operand], separator: &str) -> String {
    operands
        .iter()
        .map(|o| o.name.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Left-to-right product. A matrix meeting a vec4 always goes on the left.
fn multiply_chain(operands: &[&Operand]) -> String {
    let mut iter = operands.iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let mut acc = first.name.clone();
    let mut acc_len = first.len;
    let mut compound = false;

    for operand in iter {
        let lhs = if compound { format!("({acc})") } else { acc.clone() };
        acc = if acc_len == 4 && operand.len == 16 {
            format!("{} * {lhs}", operand.name)
        } else {
            format!("{lhs} * {}", operand.name)
        };
        acc_len = match (acc_len, operand.len) {
            (16, 4) | (4, 16) => 4,
            (1, n) => n,
            (n, _) => n,
        };
        compound = true;
    }
    acc
}

/// Whether a node produces a GLSL statement of its own.
fn is_statement(kind: NodeKind) -> bool {
    !matches!(kind.family(), NodeFamily::Literal | NodeFamily::Sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_float_always_has_point() {
        assert_eq!(fmt_float(5.0), "5.0");
        assert_eq!(fmt_float(-1.0), "-1.0");
        assert_eq!(fmt_float(0.25), "0.25");
        assert_eq!(fmt_float(f32::NAN), "0.0");
    }

    #[test]
    fn test_literal_constructors() {
        assert_eq!(literal_value(&PortValue::scalar(2.0)), "2.0");
        let v = PortValue::from_slice(&[1.0, 0.5, 0.0]).unwrap();
        assert_eq!(literal_value(&v), "vec3(1.0, 0.5, 0.0)");
        assert!(literal_value(&PortValue::identity()).starts_with("mat4(1.0, 0.0, 0.0, 0.0, 0.0, 1.0"));
    }

    #[test]
    fn test_multiply_chain_puts_matrix_first() {
        let v = Operand { name: "v".into(), len: 4 };
        let m = Operand { name: "m".into(), len: 16 };
        let s = Operand { name: "s".into(), len: 1 };
        assert_eq!(multiply_chain(&[&v, &m]), "m * v");
        assert_eq!(multiply_chain(&[&m, &v, &s]), "(m * v) * s");
        assert_eq!(multiply_chain(&[&s, &v, &m]), "m * (s * v)");
    }
}
