// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declaration hoisting: constants, property uniforms and samplers.

use super::expressions::{literal_value, texture_unit, variable};
use super::CompileError;
use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};
use std::collections::HashSet;

/// Collects the global declarations one program needs.
pub(super) struct Declarations<'g> {
    graph: &'g Graph,
    visited: HashSet<NodeId>,
    samplers: HashSet<u32>,
    lines: Vec<String>,
}

impl<'g> Declarations<'g> {
    pub(super) fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            visited: HashSet::new(),
            samplers: HashSet::new(),
            lines: Vec::new(),
        }
    }

    /// Walk everything reachable from `node_id`, declaring leaves once.
    pub(super) fn hoist(&mut self, node_id: NodeId) -> Result<(), CompileError> {
        if !self.visited.insert(node_id) {
            return Ok(());
        }
        let node = self
            .graph
            .node(node_id)
            .ok_or(CompileError::Unresolved(node_id))?;
        let kind = node.kind();

        if kind.is_literal() {
            let ty = node.literal().shape().glsl_type();
            let line = if node.is_property() {
                format!("uniform {ty} {};", variable(node_id))
            } else {
                format!("const {ty} {} = {};", variable(node_id), literal_value(node.literal()))
            };
            self.lines.push(line);
            return Ok(());
        }

        if kind == NodeKind::TextureSample {
            let unit = texture_unit(self.graph, node_id);
            if self.samplers.insert(unit) {
                self.lines.push(format!("uniform sampler2D texture_{unit};"));
            }
        }

        for input in self.graph.inputs_of(node_id).into_iter().flatten() {
            self.hoist(input)?;
        }
        Ok(())
    }

    pub(super) fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
