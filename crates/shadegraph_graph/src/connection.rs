// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use crate::node::NodeId;
use crate::port::Slot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u16);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection from one node's output into a slot of another node.
///
/// While a link gesture is in progress the target is unknown and `to` is
/// `None`; such a connection never contributes to any node's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Connection id
    pub id: ConnectionId,
    /// Source node
    pub from: NodeId,
    /// Target node, `None` while pending
    pub to: Option<NodeId>,
    /// Target slot; meaningless while pending
    pub slot: Slot,
}

impl Connection {
    /// Create a pending connection from `from`
    pub fn pending(id: ConnectionId, from: NodeId) -> Self {
        Self {
            id,
            from,
            to: None,
            slot: Slot(0),
        }
    }

    /// Create a finalized connection
    pub fn new(id: ConnectionId, from: NodeId, to: NodeId, slot: Slot) -> Self {
        Self {
            id,
            from,
            to: Some(to),
            slot,
        }
    }

    /// Whether the target is still unknown
    pub fn is_pending(&self) -> bool {
        self.to.is_none()
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from == node_id || self.to == Some(node_id)
    }

    /// Whether this is the finalized `from -> to` edge
    pub fn links(&self, from: NodeId, to: NodeId) -> bool {
        self.from == from && self.to == Some(to)
    }
}
