// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-oriented graph files.
//!
//! One record per line, node records first:
//!
//! ```text
//! kind,property,in0,in1,in2,in3,count,limit,len,d0,...,d15,x,y,
//! ?from?to?slot
//! ```
//!
//! Node references are record positions, not ids. Loading replays every
//! record through the graph store and every edge through the link
//! validator, so a file can never produce a graph the editor could not.
//! The stored input columns are informational; inputs are rebuilt from the
//! edge records.

use crate::connection::Connection;
use crate::evaluation::{EvaluationError, Evaluator};
use crate::graph::{Graph, GraphError};
use crate::node::{Node, NodeId, NodeInit, NodeKind};
use crate::port::{Slot, MAX_INPUTS, VALUE_CAPACITY};
use std::collections::HashMap;
use std::path::Path;

/// Fields in a node record
const NODE_FIELDS: usize = 2 + MAX_INPUTS + 3 + VALUE_CAPACITY + 2;

/// Error while loading a graph file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Malformed record
    #[error("Line {line}: {message}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// Record was well-formed but the graph refused it
    #[error("Line {line}: {source}")]
    Graph {
        /// 1-based line number
        line: usize,
        /// Store or validator error
        source: GraphError,
    },

    /// Loaded graph could not be evaluated
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// File could not be read
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Serialize `graph` to the text format.
pub fn save(graph: &Graph) -> String {
    let positions: HashMap<NodeId, usize> = graph
        .node_ids()
        .enumerate()
        .map(|(position, id)| (id, position))
        .collect();
    let mut out = String::new();

    for node in graph.nodes() {
        write_node(&mut out, graph, node, &positions);
    }

    for connection in edges_in_replay_order(graph) {
        let Some(to) = connection.to else { continue };
        let (Some(from), Some(to)) = (positions.get(&connection.from), positions.get(&to)) else {
            continue;
        };
        out.push_str(&format!("?{from}?{to}?{}\n", connection.slot));
    }
    out
}

/// Finalized edges ordered so every edge into a node precedes the edges
/// leaving it, then by slot. Replaying them in this order gives each source
/// its value before the validator sees it.
fn edges_in_replay_order(graph: &Graph) -> Vec<&Connection> {
    let rank: HashMap<NodeId, usize> = match graph.topological_order() {
        Ok(order) => order.into_iter().enumerate().map(|(i, id)| (id, i)).collect(),
        Err(err) => {
            tracing::warn!("Saving edges in storage order: {}", err);
            HashMap::new()
        }
    };
    let mut edges: Vec<&Connection> = graph.connections().filter(|c| !c.is_pending()).collect();
    edges.sort_by_key(|c| (c.to.and_then(|to| rank.get(&to).copied()), c.slot));
    edges
}

fn write_node(out: &mut String, graph: &Graph, node: &Node, positions: &HashMap<NodeId, usize>) {
    let mut fields: Vec<String> = Vec::with_capacity(NODE_FIELDS);
    fields.push(node.kind().code().to_string());
    fields.push(u8::from(node.is_property()).to_string());

    let inputs = graph.inputs_of(node.id());
    for input in inputs {
        let position = input.and_then(|id| positions.get(&id));
        fields.push(position.map_or_else(|| "-1".to_string(), ToString::to_string));
    }
    fields.push(inputs.iter().flatten().count().to_string());
    fields.push(node.input_limit().to_string());
    fields.push(node.output().len().to_string());

    let mut data = [0.0f32; VALUE_CAPACITY];
    if node.kind().is_literal() {
        data = *node.literal().data();
    } else if let Some(threshold) = node.alpha_clip() {
        data[0] = threshold;
    }
    fields.extend(data.iter().map(ToString::to_string));
    fields.extend(node.position.iter().map(ToString::to_string));

    for field in fields {
        out.push_str(&field);
        out.push(',');
    }
    out.push('\n');
}

/// Parse a graph from the text format and evaluate it.
pub fn load(text: &str) -> Result<Graph, LoadError> {
    let evaluator = Evaluator::new();
    let mut graph = Graph::new();
    let mut records: Vec<NodeId> = Vec::new();
    let mut edges_started = false;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let record = raw.trim();
        if record.is_empty() {
            continue;
        }

        if let Some(edge) = record.strip_prefix('?') {
            if !edges_started {
                edges_started = true;
                evaluator.recompute_all(&mut graph)?;
            }
            let (from, to, slot) = parse_edge(edge, line, &records)?;
            graph
                .connect(from, to, slot)
                .map_err(|source| LoadError::Graph { line, source })?;
            evaluator.recompute_all(&mut graph)?;
        } else {
            if edges_started {
                return Err(parse_error(line, "node record after edge records"));
            }
            let id = load_node(&mut graph, record, line)?;
            records.push(id);
        }
    }

    if !edges_started {
        evaluator.recompute_all(&mut graph)?;
    }
    tracing::debug!(
        "Loaded {} node(s) and {} edge(s)",
        graph.node_count(),
        graph.connection_count()
    );
    Ok(graph)
}

fn parse_error(line: usize, message: impl Into<String>) -> LoadError {
    LoadError::Parse {
        line,
        message: message.into(),
    }
}

fn load_node(graph: &mut Graph, record: &str, line: usize) -> Result<NodeId, LoadError> {
    let fields: Vec<&str> = record
        .strip_suffix(',')
        .ok_or_else(|| parse_error(line, "node record must end with ','"))?
        .split(',')
        .collect();
    if fields.len() != NODE_FIELDS {
        return Err(parse_error(
            line,
            format!("expected {NODE_FIELDS} fields, found {}", fields.len()),
        ));
    }

    let code: u16 = parse_field(fields[0], line, "kind")?;
    let kind = NodeKind::from_code(code).ok_or_else(|| parse_error(line, format!("unknown kind {code}")))?;
    let property = parse_field::<u8>(fields[1], line, "property flag")? != 0;
    for field in &fields[2..2 + MAX_INPUTS] {
        parse_field::<i64>(field, line, "input")?;
    }
    let limit: usize = parse_field(fields[7], line, "input limit")?;

    let data_start = 2 + MAX_INPUTS + 3;
    let mut data = [0.0f32; VALUE_CAPACITY];
    for (slot, field) in data.iter_mut().zip(&fields[data_start..data_start + VALUE_CAPACITY]) {
        *slot = parse_field(field, line, "data")?;
    }
    let x: f32 = parse_field(fields[NODE_FIELDS - 2], line, "x")?;
    let y: f32 = parse_field(fields[NODE_FIELDS - 1], line, "y")?;
    let graph_error = |source| LoadError::Graph { line, source };

    let id = match kind {
        NodeKind::VertexOutput => graph.vertex_sink(),
        NodeKind::FragmentOutput => graph.fragment_sink(),
        _ => {
            let init = if kind.is_literal() {
                NodeInit::Literal(data[..kind.natural_shape().components()].to_vec())
            } else if kind.is_variadic() && limit != kind.input_limit() {
                NodeInit::Arity(limit)
            } else {
                NodeInit::Default
            };
            let id = graph.create_node(kind, init).map_err(graph_error)?;
            if kind.is_literal() {
                graph.set_property(id, property).map_err(graph_error)?;
            }
            if kind == NodeKind::TextureSample && data[0] > 0.0 {
                graph.set_alpha_clip(id, Some(data[0])).map_err(graph_error)?;
            }
            id
        }
    };
    graph.set_position(id, [x, y]).map_err(graph_error)?;
    Ok(id)
}

fn parse_edge(edge: &str, line: usize, records: &[NodeId]) -> Result<(NodeId, NodeId, Option<Slot>), LoadError> {
    let parts: Vec<&str> = edge.split('?').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(parse_error(line, "edge record must be ?from?to or ?from?to?slot"));
    }
    let node = |field: &str| -> Result<NodeId, LoadError> {
        let position: usize = parse_field(field, line, "node reference")?;
        records
            .get(position)
            .copied()
            .ok_or_else(|| parse_error(line, format!("no node record {position}")))
    };
    let from = node(parts[0])?;
    let to = node(parts[1])?;
    let slot = match parts.get(2) {
        Some(field) => Some(Slot(parse_field(field, line, "slot")?)),
        None => None,
    };
    Ok((from, to, slot))
}

fn parse_field<T: std::str::FromStr>(field: &str, line: usize, what: &str) -> Result<T, LoadError> {
    field
        .trim()
        .parse()
        .map_err(|_| parse_error(line, format!("invalid {what} '{field}'")))
}

/// Save a graph to a file
pub fn save_to_path(graph: &Graph, path: &Path) -> std::io::Result<()> {
    std::fs::write(path, save(graph))?;
    tracing::info!("Saved graph to {}", path.display());
    Ok(())
}

/// Load a graph from a file
pub fn load_from_path(path: &Path) -> Result<Graph, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let graph = load(&text)?;
    tracing::info!("Loaded graph from {}", path.display());
    Ok(graph)
}
