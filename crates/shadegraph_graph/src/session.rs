// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editing session: every mutation is followed by a full recompute.
//!
//! Hosts drive the graph either through the methods on [`GraphSession`] or
//! by replaying [`GraphCommand`] scripts written in RON.

use crate::codegen::{CompileError, CompiledShaders, Dialect, ShaderCompiler};
use crate::connection::ConnectionId;
use crate::evaluation::{EvaluationError, EvaluationReport, Evaluator};
use crate::graph::{Graph, GraphError};
use crate::node::{NodeId, NodeInit, NodeKind};
use crate::port::{PortValue, Slot};
use serde::{Deserialize, Serialize};

/// Error from a session operation
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Structural or link error; the graph is unchanged
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Recompute failed
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Code generation failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Command script could not be parsed
    #[error("Invalid command script: {0}")]
    Script(#[from] ron::error::SpannedError),
}

/// A single graph edit, as replayed from scripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphCommand {
    /// Create a node
    CreateNode {
        /// Node kind
        kind: NodeKind,
        /// Literal value or arity
        #[serde(default)]
        init: NodeInit,
    },
    /// Destroy a node and its edges
    DestroyNode {
        /// Target node
        node: NodeId,
    },
    /// Start a link from a node
    BeginLink {
        /// Source node
        from: NodeId,
    },
    /// Complete a pending link
    FinishLink {
        /// Pending edge
        edge: ConnectionId,
        /// Target node
        to: NodeId,
        /// Target slot, lowest free when omitted
        #[serde(default)]
        slot: Option<Slot>,
    },
    /// Drop a pending link
    CancelLink {
        /// Pending edge
        edge: ConnectionId,
    },
    /// Remove an edge
    DestroyLink {
        /// Edge to remove
        edge: ConnectionId,
    },
    /// Create an edge in one step
    Connect {
        /// Source node
        from: NodeId,
        /// Target node
        to: NodeId,
        /// Target slot, lowest free when omitted
        #[serde(default)]
        slot: Option<Slot>,
    },
    /// Replace a literal value
    SetLiteral {
        /// Literal node
        node: NodeId,
        /// New components
        value: Vec<f32>,
    },
    /// Expose a literal as a uniform
    SetProperty {
        /// Literal node
        node: NodeId,
        /// Uniform when true
        property: bool,
    },
    /// Set a texture sample's discard threshold
    SetAlphaClip {
        /// Texture sample node
        node: NodeId,
        /// Threshold, or none to disable
        #[serde(default)]
        threshold: Option<f32>,
    },
    /// Move a node on the canvas
    SetPosition {
        /// Target node
        node: NodeId,
        /// New position
        position: [f32; 2],
    },
}

impl GraphCommand {
    /// Short description for logs
    pub fn description(&self) -> &'static str {
        match self {
            Self::CreateNode { .. } => "Create node",
            Self::DestroyNode { .. } => "Destroy node",
            Self::BeginLink { .. } => "Begin link",
            Self::FinishLink { .. } => "Finish link",
            Self::CancelLink { .. } => "Cancel link",
            Self::DestroyLink { .. } => "Destroy link",
            Self::Connect { .. } => "Connect",
            Self::SetLiteral { .. } => "Set literal",
            Self::SetProperty { .. } => "Set property",
            Self::SetAlphaClip { .. } => "Set alpha clip",
            Self::SetPosition { .. } => "Set position",
        }
    }
}

/// What a command produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// A node was created
    Node(NodeId),
    /// An edge was created, or a pending edge finalized into a slot
    Connection(ConnectionId),
    /// The graph changed in place
    Updated,
}

/// Parse a RON list of commands.
pub fn parse_script(text: &str) -> Result<Vec<GraphCommand>, SessionError> {
    Ok(ron::from_str(text)?)
}

/// A graph plus the evaluator that keeps it current
#[derive(Debug, Clone)]
pub struct GraphSession {
    graph: Graph,
    evaluator: Evaluator,
    report: EvaluationReport,
}

impl GraphSession {
    /// Start with an empty graph
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let evaluator = Evaluator::new();
        // A fresh graph holds only sinks and cannot contain a cycle.
        let report = evaluator.recompute_all(&mut graph).unwrap_or_default();
        Self {
            graph,
            evaluator,
            report,
        }
    }

    /// Adopt an existing graph and evaluate it
    pub fn from_graph(graph: Graph) -> Result<Self, SessionError> {
        Self::with_evaluator(graph, Evaluator::new())
    }

    /// Adopt a graph with a specific evaluator
    pub fn with_evaluator(mut graph: Graph, evaluator: Evaluator) -> Result<Self, SessionError> {
        let report = evaluator.recompute_all(&mut graph)?;
        Ok(Self {
            graph,
            evaluator,
            report,
        })
    }

    /// The graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Give up the session, keeping the graph
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Result of the last recompute
    pub fn report(&self) -> &EvaluationReport {
        &self.report
    }

    /// Current value of a node
    pub fn value(&self, node_id: NodeId) -> Option<&PortValue> {
        self.graph.node(node_id).map(|node| node.output())
    }

    /// Whether the last recompute gave the node a value
    pub fn is_valid(&self, node_id: NodeId) -> bool {
        self.graph.node(node_id).is_some_and(|node| node.is_valid())
    }

    /// Re-evaluate the whole graph
    pub fn recompute(&mut self) -> Result<&EvaluationReport, SessionError> {
        self.report = self.evaluator.recompute_all(&mut self.graph)?;
        Ok(&self.report)
    }

    /// Compile both stages from the current values
    pub fn compile(&self, dialect: Dialect) -> Result<CompiledShaders, SessionError> {
        Ok(ShaderCompiler::new(dialect).compile(&self.graph)?)
    }

    fn mutate<T>(
        &mut self,
        action: &str,
        op: impl FnOnce(&mut Graph) -> Result<T, GraphError>,
    ) -> Result<T, SessionError> {
        let out = op(&mut self.graph).inspect_err(|err| {
            // The validator already logged link rejections.
            if !matches!(err, GraphError::Link(_)) {
                tracing::warn!("{} failed: {}", action, err);
            }
        })?;
        self.recompute()?;
        Ok(out)
    }

    /// Create a node
    pub fn create_node(&mut self, kind: NodeKind, init: NodeInit) -> Result<NodeId, SessionError> {
        self.mutate("Create node", |graph| graph.create_node(kind, init))
    }

    /// Destroy a node and every edge touching it
    pub fn destroy_node(&mut self, node_id: NodeId) -> Result<(), SessionError> {
        self.mutate("Destroy node", |graph| graph.destroy_node(node_id).map(drop))
    }

    /// Start a link from `from`
    pub fn begin_link(&mut self, from: NodeId) -> Result<ConnectionId, SessionError> {
        self.mutate("Begin link", |graph| graph.create_pending_edge(from))
    }

    /// Complete a pending link. On rejection the link stays pending.
    pub fn finish_link(
        &mut self,
        edge: ConnectionId,
        to: NodeId,
        slot: Option<Slot>,
    ) -> Result<Slot, SessionError> {
        self.mutate("Finish link", |graph| graph.finalize_edge(edge, to, slot))
    }

    /// Drop a pending link
    pub fn cancel_link(&mut self, edge: ConnectionId) -> Result<(), SessionError> {
        self.mutate("Cancel link", |graph| graph.cancel_edge(edge))
    }

    /// Remove an edge
    pub fn destroy_link(&mut self, edge: ConnectionId) -> Result<(), SessionError> {
        self.mutate("Destroy link", |graph| graph.destroy_edge(edge).map(drop))
    }

    /// Validate and create an edge
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        slot: Option<Slot>,
    ) -> Result<ConnectionId, SessionError> {
        self.mutate("Connect", |graph| graph.connect(from, to, slot))
    }

    /// Replace a literal value
    pub fn set_literal(&mut self, node_id: NodeId, value: &[f32]) -> Result<(), SessionError> {
        self.mutate("Set literal", |graph| graph.set_literal(node_id, value))
    }

    /// Expose a literal as a uniform
    pub fn set_property(&mut self, node_id: NodeId, property: bool) -> Result<(), SessionError> {
        self.mutate("Set property", |graph| graph.set_property(node_id, property))
    }

    /// Set a texture sample's discard threshold
    pub fn set_alpha_clip(&mut self, node_id: NodeId, threshold: Option<f32>) -> Result<(), SessionError> {
        self.mutate("Set alpha clip", |graph| graph.set_alpha_clip(node_id, threshold))
    }

    /// Move a node
    pub fn set_position(&mut self, node_id: NodeId, position: [f32; 2]) -> Result<(), SessionError> {
        self.mutate("Set position", |graph| graph.set_position(node_id, position))
    }

    /// Apply one command
    pub fn apply(&mut self, command: GraphCommand) -> Result<CommandOutcome, SessionError> {
        tracing::debug!("{}: {:?}", command.description(), command);
        let outcome = match command {
            GraphCommand::CreateNode { kind, init } => CommandOutcome::Node(self.create_node(kind, init)?),
            GraphCommand::DestroyNode { node } => {
                self.destroy_node(node)?;
                CommandOutcome::Updated
            }
            GraphCommand::BeginLink { from } => CommandOutcome::Connection(self.begin_link(from)?),
            GraphCommand::FinishLink { edge, to, slot } => {
                self.finish_link(edge, to, slot)?;
                CommandOutcome::Connection(edge)
            }
            GraphCommand::CancelLink { edge } => {
                self.cancel_link(edge)?;
                CommandOutcome::Updated
            }
            GraphCommand::DestroyLink { edge } => {
                self.destroy_link(edge)?;
                CommandOutcome::Updated
            }
            GraphCommand::Connect { from, to, slot } => CommandOutcome::Connection(self.connect(from, to, slot)?),
            GraphCommand::SetLiteral { node, value } => {
                self.set_literal(node, &value)?;
                CommandOutcome::Updated
            }
            GraphCommand::SetProperty { node, property } => {
                self.set_property(node, property)?;
                CommandOutcome::Updated
            }
            GraphCommand::SetAlphaClip { node, threshold } => {
                self.set_alpha_clip(node, threshold)?;
                CommandOutcome::Updated
            }
            GraphCommand::SetPosition { node, position } => {
                self.set_position(node, position)?;
                CommandOutcome::Updated
            }
        };
        Ok(outcome)
    }

    /// Parse and apply a command script, stopping at the first failure.
    pub fn apply_script(&mut self, text: &str) -> Result<Vec<CommandOutcome>, SessionError> {
        parse_script(text)?
            .into_iter()
            .map(|command| self.apply(command))
            .collect()
    }
}

impl Default for GraphSession {
    fn default() -> Self {
        Self::new()
    }
}
