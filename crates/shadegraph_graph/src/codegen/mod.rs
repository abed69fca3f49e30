// SPDX-License-Identifier: MIT OR Apache-2.0
//! GLSL generation.
//!
//! Each stage is compiled from the input of its sink in two passes:
//! declaration hoisting (constants, property uniforms, samplers) and
//! post-order expression emission. The stage epilogue then widens the root
//! value into `gl_Position` or the fragment color.
//!
//! Values must be current: run the evaluator before compiling.

mod declarations;
mod dialect;
mod expressions;

pub use dialect::Dialect;

use crate::graph::Graph;
use crate::node::NodeId;
use declarations::Declarations;
use expressions::{variable, Emitter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Vertex program, rooted at the vertex output
    Vertex,
    /// Fragment program, rooted at the fragment output
    Fragment,
}

/// Mesh attributes every vertex program declares, with their varyings.
const ATTRIBUTES: [(&str, &str); 4] = [
    ("vec3", "position"),
    ("vec3", "normal"),
    ("vec2", "uv"),
    ("vec4", "color"),
];

const UNIFORMS: [&str; 3] = [
    "uniform mat4 u_mvp;",
    "uniform float u_time;",
    "uniform vec3 u_camera_position;",
];

/// Error during compilation
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A reachable node has no value
    #[error("Node {0} has no value; connect its inputs before compiling")]
    Unresolved(NodeId),

    /// The graph loops back on itself
    #[error("Graph contains a cycle through node {0}")]
    Cycle(NodeId),

    /// Output could not be written
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Destination that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Vertex and fragment source produced together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShaders {
    /// Dialect both programs are written in
    pub dialect: Dialect,
    /// Vertex program
    pub vertex: String,
    /// Fragment program
    pub fragment: String,
}

impl CompiledShaders {
    /// Write both programs. Both files are staged next to their destination
    /// and only renamed into place once both writes succeeded.
    pub fn write_to(&self, vertex_path: &Path, fragment_path: &Path) -> Result<(), CompileError> {
        let staged = [
            (staging_path(vertex_path), vertex_path, &self.vertex),
            (staging_path(fragment_path), fragment_path, &self.fragment),
        ];

        for (tmp, _, source) in &staged {
            if let Err(err) = fs::write(tmp, source) {
                discard(&staged);
                return Err(CompileError::Io { path: tmp.clone(), source: err });
            }
        }
        for (tmp, dest, _) in &staged {
            if let Err(err) = fs::rename(tmp, dest) {
                discard(&staged);
                return Err(CompileError::Io { path: dest.to_path_buf(), source: err });
            }
        }

        tracing::info!(
            "Wrote {} and {}",
            vertex_path.display(),
            fragment_path.display()
        );
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn discard(staged: &[(PathBuf, &Path, &String)]) {
    for (tmp, _, _) in staged {
        // Already gone is fine.
        let _ = fs::remove_file(tmp);
    }
}

/// Compiles graphs to a fixed dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderCompiler {
    dialect: Dialect,
}

impl ShaderCompiler {
    /// Create a compiler for `dialect`
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Target dialect
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Compile both stages. Either both succeed or nothing is returned.
    pub fn compile(&self, graph: &Graph) -> Result<CompiledShaders, CompileError> {
        let vertex = self.compile_stage(graph, Stage::Vertex)?;
        let fragment = self.compile_stage(graph, Stage::Fragment)?;
        tracing::debug!(
            "Compiled {} graph: {} vertex bytes, {} fragment bytes",
            self.dialect,
            vertex.len(),
            fragment.len()
        );
        Ok(CompiledShaders {
            dialect: self.dialect,
            vertex,
            fragment,
        })
    }

    /// Compile a single stage
    pub fn compile_stage(&self, graph: &Graph, stage: Stage) -> Result<String, CompileError> {
        let sink = match stage {
            Stage::Vertex => graph.vertex_sink(),
            Stage::Fragment => graph.fragment_sink(),
        };

        let mut declarations = Declarations::new(graph);
        let mut emitter = Emitter::new(graph, self.dialect, stage);

        let output = match graph.inputs_of(sink)[0] {
            Some(root) => {
                declarations.hoist(root)?;
                emitter.emit(root)?;
                let len = graph.node(root).map_or(0, |node| node.output().len());
                widen_output(&variable(root), len)
            }
            None => match stage {
                Stage::Vertex => "u_mvp * vec4(a_position, 1.0)".to_string(),
                Stage::Fragment => "vec4(1.0)".to_string(),
            },
        };

        Ok(self.assemble(
            stage,
            &declarations.into_lines(),
            &emitter.into_lines(),
            &output,
        ))
    }

    fn assemble(&self, stage: Stage, declarations: &[String], body: &[String], output: &str) -> String {
        let dialect = self.dialect;
        let mut out = String::new();

        line(&mut out, dialect.version());
        if let Some(precision) = dialect.precision(stage) {
            line(&mut out, precision);
        }
        out.push('\n');

        if stage == Stage::Vertex {
            for (ty, name) in ATTRIBUTES {
                line(&mut out, &format!("{} {ty} a_{name};", dialect.attribute()));
            }
            out.push('\n');
        }
        for (ty, name) in ATTRIBUTES {
            line(&mut out, &format!("{} {ty} v_{name};", dialect.varying(stage)));
        }
        if stage == Stage::Fragment {
            if let Some(declaration) = dialect.fragment_output_declaration() {
                line(&mut out, declaration);
            }
        }
        out.push('\n');

        for uniform in UNIFORMS {
            line(&mut out, uniform);
        }
        for declaration in declarations {
            line(&mut out, declaration);
        }
        out.push('\n');

        line(&mut out, "void main() {");
        if stage == Stage::Vertex {
            for (_, name) in ATTRIBUTES {
                line(&mut out, &format!("    v_{name} = a_{name};"));
            }
        }
        for statement in body {
            line(&mut out, &format!("    {statement}"));
        }
        let target = match stage {
            Stage::Vertex => "gl_Position",
            Stage::Fragment => dialect.fragment_output(),
        };
        line(&mut out, &format!("    {target} = {output};"));
        line(&mut out, "}");
        out
    }
}

fn line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

/// Map a root value of `len` components onto a vec4.
fn widen_output(name: &str, len: usize) -> String {
    match len {
        1 => format!("vec4(vec3({name}), 1.0)"),
        2 => format!("vec4({name}, 0.0, 1.0)"),
        3 => format!("vec4({name}, 1.0)"),
        _ => name.to_string(),
    }
}
