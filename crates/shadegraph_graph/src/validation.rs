// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link validation.
//!
//! [`validate_link`] decides whether an edge `from -> to` may be created and
//! which slot it lands in. It never mutates the graph; every rejection is
//! logged with the lengths that caused it.

use crate::graph::Graph;
use crate::node::{NodeFamily, NodeId, NodeKind};
use crate::port::{Slot, MAX_INPUTS};
use std::fmt;

/// Length a shape rule wanted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Exactly this many components
    Exactly(usize),
    /// Inclusive component range
    Between(usize, usize),
    /// Upper bound
    AtMost(usize),
    /// Equal to this, a scalar, or a mat4/vec4 pairing with it
    Multipliable(usize),
    /// A scalar, or equal to this
    ScalarOr(usize),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "{n}"),
            Self::Between(lo, hi) => write!(f, "{lo}..={hi}"),
            Self::AtMost(n) => write!(f, "at most {n}"),
            Self::Multipliable(n) => write!(f, "{n}, 1 or a mat4/vec4 pairing with {n}"),
            Self::ScalarOr(n) => write!(f, "1 or {n}"),
        }
    }
}

/// Reason an edge was refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkError {
    /// Either endpoint is missing
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Sinks have no consumable output
    #[error("Node {0} is a stage output and cannot feed other nodes")]
    SinkSource(NodeId),

    /// Edge from a node into itself
    #[error("Cannot connect node {0} to itself")]
    SelfLoop(NodeId),

    /// Every input of the target is already taken
    #[error("Node {node} already has {limit} input(s)")]
    InputLimit {
        /// Target node
        node: NodeId,
        /// Its input limit
        limit: usize,
    },

    /// Requested slot is past the input limit
    #[error("Slot {slot} is out of range for node {node} (limit {limit})")]
    SlotOutOfRange {
        /// Target node
        node: NodeId,
        /// Requested slot
        slot: Slot,
        /// Its input limit
        limit: usize,
    },

    /// Requested slot is fed by another node
    #[error("Slot {slot} of node {node} is already fed by node {by}")]
    SlotOccupied {
        /// Target node
        node: NodeId,
        /// Requested slot
        slot: Slot,
        /// Current source
        by: NodeId,
    },

    /// Edge would close a cycle
    #[error("Connecting {from} -> {to} would create a cycle")]
    Cycle {
        /// Source node
        from: NodeId,
        /// Target node
        to: NodeId,
    },

    /// Source length does not fit the target slot
    #[error("{kind} slot {slot} expects {expected} component(s), got {source_len}")]
    ShapeMismatch {
        /// Target kind
        kind: NodeKind,
        /// Target slot
        slot: Slot,
        /// Source output length
        source_len: usize,
        /// What the rule wanted
        expected: Expected,
    },
}

/// Check a prospective edge `from -> to` and resolve its slot.
///
/// With `slot == None` the lowest free slot is chosen. An existing
/// `from -> to` edge is treated as already removed, since accepting the new
/// edge replaces it.
pub fn validate_link(
    graph: &Graph,
    from: NodeId,
    to: NodeId,
    slot: Option<Slot>,
) -> Result<Slot, LinkError> {
    check_link(graph, from, to, slot).inspect_err(|err| {
        tracing::warn!("Rejected link {} -> {}: {}", from, to, err);
    })
}

fn check_link(
    graph: &Graph,
    from: NodeId,
    to: NodeId,
    slot: Option<Slot>,
) -> Result<Slot, LinkError> {
    let source = graph.node(from).ok_or(LinkError::NodeNotFound(from))?;
    let target = graph.node(to).ok_or(LinkError::NodeNotFound(to))?;

    if source.kind().is_sink() {
        return Err(LinkError::SinkSource(from));
    }
    if from == to {
        return Err(LinkError::SelfLoop(from));
    }

    let mut operands = graph.inputs_of(to);
    for operand in operands.iter_mut() {
        if *operand == Some(from) {
            *operand = None;
        }
    }

    let limit = target.input_limit();
    if operands.iter().flatten().count() >= limit {
        return Err(LinkError::InputLimit { node: to, limit });
    }

    let slot = match slot {
        Some(slot) if slot.index() >= limit => {
            return Err(LinkError::SlotOutOfRange { node: to, slot, limit });
        }
        Some(slot) => {
            if let Some(by) = operands[slot.index()] {
                return Err(LinkError::SlotOccupied { node: to, slot, by });
            }
            slot
        }
        None => {
            let free = operands[..limit]
                .iter()
                .position(Option::is_none)
                .ok_or(LinkError::InputLimit { node: to, limit })?;
            Slot(free as u8)
        }
    };

    if graph.depends_on(from, to) {
        return Err(LinkError::Cycle { from, to });
    }

    let lengths = operand_lengths(graph, &operands);
    let rules = ShapeRules {
        kind: target.kind(),
        slot,
        source_len: source.output().len(),
        target_len: target.output().len(),
        lengths,
    };
    rules.check()?;
    Ok(slot)
}

/// Output length of each connected operand, by slot.
fn operand_lengths(graph: &Graph, operands: &[Option<NodeId>; MAX_INPUTS]) -> [Option<usize>; MAX_INPUTS] {
    let mut lengths = [None; MAX_INPUTS];
    for (length, operand) in lengths.iter_mut().zip(operands) {
        *length = operand
            .and_then(|id| graph.node(id))
            .map(|node| node.output().len());
    }
    lengths
}

struct ShapeRules {
    kind: NodeKind,
    slot: Slot,
    source_len: usize,
    target_len: usize,
    /// Lengths of the other operands; the replaced edge is already gone.
    lengths: [Option<usize>; MAX_INPUTS],
}

impl ShapeRules {
    fn check(&self) -> Result<(), LinkError> {
        use NodeKind as K;

        let len = self.source_len;
        match self.kind {
            K::Add | K::Subtract | K::Divide | K::Max | K::Min => match self.first_established() {
                Some(first) => self.require(len == first, Expected::Exactly(first)),
                None => Ok(()),
            },
            K::Multiply => {
                let reference = if self.target_len > 0 {
                    Some(self.target_len)
                } else {
                    self.first_established()
                };
                match reference {
                    Some(r) => self.require(multipliable(r, len), Expected::Multipliable(r)),
                    None => Ok(()),
                }
            }
            K::Append => {
                let used: usize = self.lengths.iter().flatten().sum();
                let room = 4usize.saturating_sub(used);
                self.require(len <= room, Expected::AtMost(room))
            }
            K::Normalize | K::Length => self.require((2..=4).contains(&len), Expected::Between(2, 4)),
            K::Dot | K::Distance | K::Project | K::Reject | K::HalfDirection => {
                self.require((2..=4).contains(&len), Expected::Between(2, 4))?;
                self.match_sibling()
            }
            K::Cross => {
                self.require(len == 3, Expected::Exactly(3))?;
                self.match_sibling()
            }
            K::Power | K::Step | K::Posterize => match self.slot.0 {
                1 => self.require(len == 1, Expected::Exactly(1)),
                _ => self.default_rule(),
            },
            K::Desaturate => match self.slot.0 {
                0 => self.require((3..=4).contains(&len), Expected::Between(3, 4)),
                _ => self.require(len == 1, Expected::Exactly(1)),
            },
            K::Lerp | K::Smoothstep => {
                self.require((1..=4).contains(&len), Expected::Between(1, 4))?;
                if len == 1 {
                    return Ok(());
                }
                let wide = self.lengths.iter().flatten().copied().find(|&l| l > 1);
                match wide {
                    Some(w) => self.require(len == w, Expected::ScalarOr(w)),
                    None => Ok(()),
                }
            }
            K::TextureSample => match self.slot.0 {
                2 => self.require(len == 2, Expected::Exactly(2)),
                _ => self.require(len == 1, Expected::Exactly(1)),
            },
            K::VertexColor => self.require(len == 1, Expected::Exactly(1)),
            K::Transpose | K::MatrixMultiply => self.require(len == 16, Expected::Exactly(16)),
            _ if self.kind.family() == NodeFamily::Sink => {
                let bound = self.kind.natural_shape().components();
                self.require(len <= bound, Expected::AtMost(bound))
            }
            _ => self.default_rule(),
        }
    }

    /// Unary operators keep the length they were first fed.
    fn default_rule(&self) -> Result<(), LinkError> {
        if self.target_len == 0 {
            return Ok(());
        }
        self.require(self.source_len == self.target_len, Expected::Exactly(self.target_len))
    }

    /// Two-operand vector ops need both sides the same length.
    fn match_sibling(&self) -> Result<(), LinkError> {
        let sibling = if self.slot.0 == 0 { 1 } else { 0 };
        match self.lengths[sibling] {
            Some(other) if other > 0 => {
                self.require(self.source_len == other, Expected::Exactly(other))
            }
            _ => Ok(()),
        }
    }

    /// Length of the lowest-slot operand that already has a value.
    fn first_established(&self) -> Option<usize> {
        self.lengths.iter().flatten().copied().find(|&l| l > 0)
    }

    fn require(&self, ok: bool, expected: Expected) -> Result<(), LinkError> {
        if ok {
            Ok(())
        } else {
            Err(LinkError::ShapeMismatch {
                kind: self.kind,
                slot: self.slot,
                source_len: self.source_len,
                expected,
            })
        }
    }
}

/// Whether `a * b` is defined: equal lengths, a scalar on either side, or a
/// matrix paired with a vec4 or another matrix.
pub fn multipliable(a: usize, b: usize) -> bool {
    a == b || a == 1 || b == 1 || matches!((a, b), (4, 16) | (16, 4))
}
