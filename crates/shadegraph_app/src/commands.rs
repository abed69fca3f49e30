// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host commands: initialize a workspace, replay scripts, check and compile.

use crate::settings::ShadegraphSettings;
use serde::{Deserialize, Serialize};
use shadegraph_graph::persistence::{self, LoadError};
use shadegraph_graph::{
    CompileError, Graph, GraphSession, NodeId, NodeKind, SessionError, Shape,
};
use std::path::{Path, PathBuf};

/// Error type for host commands
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Settings could not be read or written
    #[error("Settings error at {path}: {source}")]
    Settings {
        /// Settings file
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },

    /// A file other than the settings could not be read or written
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },

    /// Saved graph could not be loaded
    #[error("Failed to load graph: {0}")]
    Load(#[from] LoadError),

    /// Editing or evaluation failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Code generation failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One node in a check report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node id
    pub id: NodeId,
    /// Node kind
    pub kind: NodeKind,
    /// Shape of the current value
    pub shape: Shape,
    /// Whether the node has a value
    pub valid: bool,
    /// Current value components
    pub value: Vec<f32>,
    /// Producer per slot
    pub inputs: Vec<Option<NodeId>>,
}

/// Result of `check`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    /// Every node in storage order
    pub nodes: Vec<NodeReport>,
    /// Number of stored edges
    pub connections: usize,
    /// Nodes left without a value
    pub invalid: Vec<NodeId>,
}

impl CheckReport {
    fn from_session(session: &GraphSession) -> Self {
        let graph = session.graph();
        let nodes = graph
            .nodes()
            .map(|node| NodeReport {
                id: node.id(),
                kind: node.kind(),
                shape: node.output().shape(),
                valid: node.is_valid(),
                value: node.output().components().to_vec(),
                inputs: node.inputs().iter().copied().take(node.input_limit()).collect(),
            })
            .collect();
        Self {
            nodes,
            connections: graph.connection_count(),
            invalid: session.report().invalid.clone(),
        }
    }
}

fn load_settings(path: &Path) -> Result<ShadegraphSettings, CommandError> {
    ShadegraphSettings::load(path).map_err(|source| CommandError::Settings {
        path: path.to_path_buf(),
        source,
    })
}

fn open_session(settings_path: &Path) -> Result<(ShadegraphSettings, GraphSession), CommandError> {
    let settings = load_settings(settings_path)?;
    let graph_path = settings.resolved(settings_path).graph;
    let graph = persistence::load_from_path(&graph_path)?;
    tracing::debug!("Loaded {} node(s) from {}", graph.node_count(), graph_path.display());
    let session = GraphSession::from_graph(graph)?;
    Ok((settings, session))
}

/// Write default settings and an empty graph.
pub fn init(settings_path: &Path) -> Result<(), CommandError> {
    let settings = ShadegraphSettings::default();
    settings
        .save(settings_path)
        .map_err(|source| CommandError::Settings {
            path: settings_path.to_path_buf(),
            source,
        })?;

    let graph_path = settings.resolved(settings_path).graph;
    persistence::save_to_path(&Graph::new(), &graph_path).map_err(|source| CommandError::Io {
        path: graph_path.clone(),
        source,
    })?;
    tracing::info!("Initialized workspace at {}", settings_path.display());
    Ok(())
}

/// Replay a command script onto the stored graph and save the result.
///
/// The graph file is only rewritten when every command succeeds.
pub fn apply(script_path: &Path, settings_path: &Path) -> Result<(), CommandError> {
    let script = std::fs::read_to_string(script_path).map_err(|source| CommandError::Io {
        path: script_path.to_path_buf(),
        source,
    })?;
    let (settings, mut session) = open_session(settings_path)?;

    let outcomes = session.apply_script(&script)?;
    let graph_path = settings.resolved(settings_path).graph;
    persistence::save_to_path(session.graph(), &graph_path).map_err(|source| CommandError::Io {
        path: graph_path.clone(),
        source,
    })?;

    tracing::info!(
        "Applied {} command(s), graph has {} node(s) and {} edge(s)",
        outcomes.len(),
        session.graph().node_count(),
        session.graph().connection_count()
    );
    if !session.report().is_clean() {
        tracing::warn!("{} node(s) have no value", session.report().invalid.len());
    }
    Ok(())
}

/// Evaluate the stored graph and render a JSON report.
pub fn check(settings_path: &Path) -> Result<String, CommandError> {
    let (_, session) = open_session(settings_path)?;
    let report = CheckReport::from_session(&session);
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Evaluate, compile and write both programs.
pub fn compile(settings_path: &Path) -> Result<(), CommandError> {
    let (settings, session) = open_session(settings_path)?;
    let shaders = session.compile(settings.dialect)?;
    let paths = settings.resolved(settings_path);
    shaders.write_to(&paths.vertex, &paths.fragment)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SETTINGS_FILE_NAME;

    fn workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shadegraph-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(SETTINGS_FILE_NAME)
    }

    const SCRIPT: &str = r#"[
        CreateNode(kind: Float, init: Literal([5.0])),
        CreateNode(kind: Negate),
        Connect(from: 2, to: 3),
        Connect(from: 3, to: 1),
    ]"#;

    #[test]
    fn test_init_apply_compile() {
        let settings_path = workspace("pipeline");
        init(&settings_path).unwrap();

        let script_path = settings_path.with_file_name("negate.ron");
        std::fs::write(&script_path, SCRIPT).unwrap();
        apply(&script_path, &settings_path).unwrap();
        compile(&settings_path).unwrap();

        let paths = ShadegraphSettings::default().resolved(&settings_path);
        let fragment = std::fs::read_to_string(&paths.fragment).unwrap();
        assert!(fragment.contains("float node_3 = node_2 * -1.0;"));
        assert!(std::fs::read_to_string(&paths.vertex).unwrap().contains("gl_Position"));

        let report: CheckReport = serde_json::from_str(&check(&settings_path).unwrap()).unwrap();
        assert_eq!(report.nodes.len(), 4);
        assert_eq!(report.connections, 2);
        let negate = report.nodes.iter().find(|n| n.id == NodeId(3)).unwrap();
        assert_eq!(negate.value, vec![-5.0]);
        assert_eq!(negate.shape, Shape::Scalar);

        std::fs::remove_dir_all(settings_path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_failed_script_keeps_graph() {
        let settings_path = workspace("rejected");
        init(&settings_path).unwrap();
        let graph_path = ShadegraphSettings::default().resolved(&settings_path).graph;
        let before = std::fs::read_to_string(&graph_path).unwrap();

        let script_path = settings_path.with_file_name("bad.ron");
        std::fs::write(
            &script_path,
            "[CreateNode(kind: Float, init: Literal([1.0])), CreateNode(kind: Normalize), Connect(from: 2, to: 3)]",
        )
        .unwrap();
        assert!(matches!(
            apply(&script_path, &settings_path),
            Err(CommandError::Session(_))
        ));
        assert_eq!(std::fs::read_to_string(&graph_path).unwrap(), before);

        std::fs::remove_dir_all(settings_path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_missing_settings() {
        let settings_path = std::env::temp_dir().join("shadegraph-absent").join(SETTINGS_FILE_NAME);
        assert!(matches!(check(&settings_path), Err(CommandError::Settings { .. })));
    }
}
