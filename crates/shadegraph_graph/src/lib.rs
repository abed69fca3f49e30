// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shader node graph core for shadegraph.
//!
//! A graph of typed value nodes is edited live and compiled to a pair of
//! GLSL programs (vertex and fragment).
//!
//! ## Architecture
//!
//! - [`graph`]: node and connection storage with dense ids and two
//!   fixed sinks
//! - [`validation`]: arity, slot, cycle and shape checks run before an
//!   edge is stored
//! - [`evaluation`]: recomputes every node's value after each edit
//! - [`codegen`]: walks back from the sinks and emits GLSL source
//! - [`persistence`]: line-oriented save format
//! - [`session`]: the editing surface hosts drive

mod ids;

pub mod codegen;
pub mod connection;
pub mod evaluation;
pub mod graph;
pub mod math;
pub mod node;
pub mod persistence;
pub mod port;
pub mod session;
pub mod validation;

pub use codegen::{CompileError, CompiledShaders, Dialect, ShaderCompiler, Stage};
pub use connection::{Connection, ConnectionId};
pub use evaluation::{EvaluationError, EvaluationOrder, EvaluationReport, Evaluator};
pub use graph::{Graph, GraphError, MAX_CONNECTIONS, MAX_NODES};
pub use node::{Node, NodeFamily, NodeHandle, NodeId, NodeInit, NodeKind};
pub use port::{PortValue, Shape, Slot, MAX_INPUTS};
pub use session::{CommandOutcome, GraphCommand, GraphSession, SessionError};
pub use validation::LinkError;
