// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph store: owns nodes, connections and id allocation.
//!
//! The store performs structural mutation only. Values are refreshed by the
//! [`Evaluator`](crate::evaluation::Evaluator); callers that mutate through
//! [`GraphSession`](crate::session::GraphSession) get a full re-evaluation
//! after every change.

use crate::connection::{Connection, ConnectionId};
use crate::ids::IdPool;
use crate::node::{InitError, Node, NodeHandle, NodeId, NodeInit, NodeKind};
use crate::port::{PortValue, Slot, MAX_INPUTS};
use crate::validation::{validate_link, LinkError};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Capacity of the node id space
pub const MAX_NODES: u16 = 1024;

/// Capacity of the connection id space
pub const MAX_CONNECTIONS: u16 = 4096;

/// A shader node graph
#[derive(Debug, Clone)]
pub struct Graph {
    /// Nodes in storage order
    nodes: IndexMap<NodeId, Node>,
    /// Connections in scan order
    connections: IndexMap<ConnectionId, Connection>,
    node_ids: IdPool,
    connection_ids: IdPool,
    vertex_sink: NodeId,
    fragment_sink: NodeId,
}

impl Graph {
    /// Create a graph holding only the vertex and fragment sinks.
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: IndexMap::new(),
            connections: IndexMap::new(),
            node_ids: IdPool::new(MAX_NODES),
            connection_ids: IdPool::new(MAX_CONNECTIONS),
            vertex_sink: NodeId(0),
            fragment_sink: NodeId(1),
        };
        graph.vertex_sink = graph.insert_sink(NodeKind::VertexOutput, [400.0, 100.0]);
        graph.fragment_sink = graph.insert_sink(NodeKind::FragmentOutput, [400.0, 300.0]);
        graph
    }

    fn insert_sink(&mut self, kind: NodeKind, position: [f32; 2]) -> NodeId {
        // A fresh pool always has room for the two sinks.
        let id = NodeId(self.node_ids.allocate().unwrap_or_default());
        let mut node = match Node::new(id, kind, NodeInit::Default) {
            Ok(node) => node,
            Err(_) => unreachable!("sinks take default init"),
        };
        node.position = position;
        self.nodes.insert(id, node);
        id
    }

    /// Create a node of `kind` with the lowest free id.
    pub fn create_node(&mut self, kind: NodeKind, init: NodeInit) -> Result<NodeId, GraphError> {
        if kind.is_sink() {
            return Err(GraphError::SinkNode(kind));
        }
        let raw = self
            .node_ids
            .allocate()
            .ok_or(GraphError::Exhausted { pool: "node", capacity: self.node_ids.capacity() })?;
        let id = NodeId(raw);
        let node = match Node::new(id, kind, init) {
            Ok(node) => node,
            Err(err) => {
                self.node_ids.release(raw);
                return Err(err.into());
            }
        };
        self.nodes.insert(id, node);
        tracing::debug!("Created {} node {}", kind, id);
        Ok(id)
    }

    /// Remove a node, every connection touching it, and compact storage.
    pub fn destroy_node(&mut self, node_id: NodeId) -> Result<Node, GraphError> {
        let kind = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?.kind();
        if kind.is_sink() {
            return Err(GraphError::SinkNode(kind));
        }

        let doomed: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.involves_node(node_id))
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            self.connections.shift_remove(id);
            self.connection_ids.release(id.0);
        }

        let node = self
            .nodes
            .shift_remove(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        self.node_ids.release(node_id.0);
        tracing::debug!(
            "Destroyed {} node {} and {} connection(s)",
            kind,
            node_id,
            doomed.len()
        );
        Ok(node)
    }

    /// Start a link gesture from `from`; the target stays pending.
    pub fn create_pending_edge(&mut self, from: NodeId) -> Result<ConnectionId, GraphError> {
        let source = self.node(from).ok_or(GraphError::NodeNotFound(from))?;
        if source.kind().is_sink() {
            return Err(LinkError::SinkSource(from).into());
        }
        let id = self.allocate_connection()?;
        self.connections.insert(id, Connection::pending(id, from));
        Ok(id)
    }

    /// Complete a pending link into `to`. A rejected link stays pending and
    /// the graph is unchanged.
    pub fn finalize_edge(
        &mut self,
        edge: ConnectionId,
        to: NodeId,
        slot: Option<Slot>,
    ) -> Result<Slot, GraphError> {
        let connection = self.connection(edge).ok_or(GraphError::EdgeNotFound(edge))?;
        if !connection.is_pending() {
            return Err(GraphError::NotPending(edge));
        }
        let from = connection.from;
        let slot = validate_link(self, from, to, slot)?;

        self.remove_duplicate(from, to);
        if let Some(connection) = self.connections.get_mut(&edge) {
            connection.to = Some(to);
            connection.slot = slot;
        }
        tracing::debug!("Linked {} -> {}[{}] as edge {}", from, to, slot, edge);
        Ok(slot)
    }

    /// Discard a pending link.
    pub fn cancel_edge(&mut self, edge: ConnectionId) -> Result<(), GraphError> {
        let connection = self.connection(edge).ok_or(GraphError::EdgeNotFound(edge))?;
        if !connection.is_pending() {
            return Err(GraphError::NotPending(edge));
        }
        self.connections.shift_remove(&edge);
        self.connection_ids.release(edge.0);
        Ok(())
    }

    /// Remove a connection, pending or not.
    pub fn destroy_edge(&mut self, edge: ConnectionId) -> Result<Connection, GraphError> {
        let connection = self
            .connections
            .shift_remove(&edge)
            .ok_or(GraphError::EdgeNotFound(edge))?;
        self.connection_ids.release(edge.0);
        tracing::debug!("Destroyed edge {}", edge);
        Ok(connection)
    }

    /// Validate and create `from -> to` in one step. Rejection never mutates
    /// the graph.
    ///
    /// A replaced `from -> to` edge gives its id back before the new one is
    /// allocated, so replacing never fails on a full pool.
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        slot: Option<Slot>,
    ) -> Result<ConnectionId, GraphError> {
        let slot = validate_link(self, from, to, slot)?;
        self.remove_duplicate(from, to);
        let id = self.allocate_connection()?;
        self.connections.insert(id, Connection::new(id, from, to, slot));
        tracing::debug!("Linked {} -> {}[{}] as edge {}", from, to, slot, id);
        Ok(id)
    }

    fn allocate_connection(&mut self) -> Result<ConnectionId, GraphError> {
        self.connection_ids
            .allocate()
            .map(ConnectionId)
            .ok_or(GraphError::Exhausted {
                pool: "connection",
                capacity: self.connection_ids.capacity(),
            })
    }

    fn remove_duplicate(&mut self, from: NodeId, to: NodeId) {
        let existing = self
            .connections
            .values()
            .find(|c| c.links(from, to))
            .map(|c| c.id);
        if let Some(id) = existing {
            self.connections.shift_remove(&id);
            self.connection_ids.release(id.0);
            tracing::debug!("Replaced edge {} ({} -> {})", id, from, to);
        }
    }

    /// Replace a literal's value. The component count must match the kind.
    pub fn set_literal(&mut self, node_id: NodeId, values: &[f32]) -> Result<(), GraphError> {
        let node = self.literal_node_mut(node_id, "literal")?;
        let kind = node.kind();
        let value = PortValue::from_slice(values)
            .filter(|v| v.shape() == kind.natural_shape())
            .ok_or(InitError::Literal { kind, len: values.len() })?;
        node.set_literal(value);
        Ok(())
    }

    /// Expose a literal as a uniform (`true`) or inline it as a constant.
    pub fn set_property(&mut self, node_id: NodeId, property: bool) -> Result<(), GraphError> {
        self.literal_node_mut(node_id, "property")?.set_property(property);
        Ok(())
    }

    fn literal_node_mut(&mut self, node_id: NodeId, parameter: &'static str) -> Result<&mut Node, GraphError> {
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        if !node.kind().is_literal() {
            return Err(GraphError::UnsupportedParameter { node: node_id, kind: node.kind(), parameter });
        }
        Ok(node)
    }

    /// Set or clear the discard threshold of a texture sample.
    pub fn set_alpha_clip(&mut self, node_id: NodeId, threshold: Option<f32>) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        if node.kind() != NodeKind::TextureSample {
            return Err(GraphError::UnsupportedParameter {
                node: node_id,
                kind: node.kind(),
                parameter: "alpha clip",
            });
        }
        node.set_alpha_clip(threshold);
        Ok(())
    }

    /// Move a node on the canvas.
    pub fn set_position(&mut self, node_id: NodeId, position: [f32; 2]) -> Result<(), GraphError> {
        let node = self.nodes.get_mut(&node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        node.position = position;
        Ok(())
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Find a node by its stable handle
    pub fn node_by_handle(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.values().find(|n| n.handle() == handle)
    }

    /// Get all nodes in storage order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs in storage order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get a connection by ID
    pub fn connection(&self, connection_id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&connection_id)
    }

    /// Get all connections in scan order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get the number of connections, pending ones included
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Finalized connection `from -> to`, if any
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<&Connection> {
        self.connections.values().find(|c| c.links(from, to))
    }

    /// The vertex-stage sink
    pub fn vertex_sink(&self) -> NodeId {
        self.vertex_sink
    }

    /// The fragment-stage sink
    pub fn fragment_sink(&self) -> NodeId {
        self.fragment_sink
    }

    /// Inputs of `node_id` by slot, derived from the current connections.
    pub fn inputs_of(&self, node_id: NodeId) -> [Option<NodeId>; MAX_INPUTS] {
        let mut inputs = [None; MAX_INPUTS];
        for connection in self.connections.values() {
            if connection.to == Some(node_id) && connection.slot.index() < MAX_INPUTS {
                inputs[connection.slot.index()] = Some(connection.from);
            }
        }
        inputs
    }

    /// Refresh every node's cached input list from the connections.
    pub(crate) fn rebuild_inputs(&mut self) {
        let mut derived: IndexMap<NodeId, [Option<NodeId>; MAX_INPUTS]> =
            self.nodes.keys().map(|id| (*id, [None; MAX_INPUTS])).collect();
        for connection in self.connections.values() {
            let Some(to) = connection.to else { continue };
            if let Some(inputs) = derived.get_mut(&to) {
                if connection.slot.index() < MAX_INPUTS {
                    inputs[connection.slot.index()] = Some(connection.from);
                }
            }
        }
        for (id, inputs) in derived {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.inputs = inputs;
            }
        }
    }

    /// Drop every node's value back to the empty shape.
    pub(crate) fn clear_outputs(&mut self) {
        for node in self.nodes.values_mut() {
            node.output.clear();
        }
    }

    /// Insert an edge without validation, for building malformed graphs.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&mut self, from: NodeId, to: NodeId, slot: Slot) -> ConnectionId {
        let id = self.allocate_connection().unwrap();
        self.connections.insert(id, Connection::new(id, from, to, slot));
        id
    }

    /// Whether `node_id` reads, directly or transitively, from `ancestor`.
    pub fn depends_on(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        let mut stack = vec![node_id];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.extend(self.inputs_of(current).into_iter().flatten());
        }
        false
    }

    /// Get nodes with every producer ahead of its consumers.
    ///
    /// Ties keep storage order, so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CycleError> {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for node_id in self.nodes.keys() {
            if !visited.contains(node_id) {
                self.visit(*node_id, &mut visited, &mut temp_mark, &mut order)?;
            }
        }

        Ok(order)
    }

    fn visit(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        temp_mark: &mut HashSet<NodeId>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), CycleError> {
        if temp_mark.contains(&node_id) {
            return Err(CycleError(node_id));
        }
        if visited.contains(&node_id) {
            return Ok(());
        }

        temp_mark.insert(node_id);

        // Producers first
        for input in self.inputs_of(node_id).into_iter().flatten() {
            self.visit(input, visited, temp_mark, order)?;
        }

        temp_mark.remove(&node_id);
        visited.insert(node_id);
        order.push(node_id);

        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// Error from a structural graph operation
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge not found
    #[error("Edge not found: {0}")]
    EdgeNotFound(ConnectionId),

    /// Sinks are created with the graph and never destroyed
    #[error("{0} nodes are fixed and cannot be created or destroyed")]
    SinkNode(NodeKind),

    /// Edge is already finalized
    #[error("Edge {0} is not pending")]
    NotPending(ConnectionId),

    /// Parameter does not apply to this kind
    #[error("Node {node} ({kind}) has no {parameter} parameter")]
    UnsupportedParameter {
        /// Target node
        node: NodeId,
        /// Its kind
        kind: NodeKind,
        /// Parameter name
        parameter: &'static str,
    },

    /// Bad factory parameter
    #[error(transparent)]
    Init(#[from] InitError),

    /// Link validator refused the edge
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Id pool is full
    #[error("No free {pool} id (capacity {capacity})")]
    Exhausted {
        /// Pool name
        pool: &'static str,
        /// Pool capacity
        capacity: usize,
    },
}

/// Error when graph contains a cycle
#[derive(Debug, thiserror::Error)]
#[error("Graph contains a cycle through node {0}")]
pub struct CycleError(pub NodeId);
