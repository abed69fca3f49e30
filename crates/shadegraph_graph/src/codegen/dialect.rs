// SPDX-License-Identifier: MIT OR Apache-2.0
//! Target dialects.

use super::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// GLSL flavor to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// Desktop GLSL 3.30 core
    #[default]
    Glsl330,
    /// GLSL ES 1.00 (WebGL 1, GLES 2)
    Gles100,
}

impl Dialect {
    /// Every supported dialect
    pub const ALL: [Dialect; 2] = [Self::Glsl330, Self::Gles100];

    /// `#version` line
    pub fn version(self) -> &'static str {
        match self {
            Self::Glsl330 => "#version 330 core",
            Self::Gles100 => "#version 100",
        }
    }

    /// Default float precision, where the dialect requires one.
    pub fn precision(self, stage: Stage) -> Option<&'static str> {
        match (self, stage) {
            (Self::Gles100, Stage::Fragment) => Some("precision mediump float;"),
            _ => None,
        }
    }

    /// Keyword for per-vertex attributes
    pub fn attribute(self) -> &'static str {
        match self {
            Self::Glsl330 => "in",
            Self::Gles100 => "attribute",
        }
    }

    /// Keyword for values passed from the vertex to the fragment stage.
    pub fn varying(self, stage: Stage) -> &'static str {
        match (self, stage) {
            (Self::Glsl330, Stage::Vertex) => "out",
            (Self::Glsl330, Stage::Fragment) => "in",
            (Self::Gles100, _) => "varying",
        }
    }

    /// Explicit fragment color declaration, if any
    pub fn fragment_output_declaration(self) -> Option<&'static str> {
        match self {
            Self::Glsl330 => Some("out vec4 frag_color;"),
            Self::Gles100 => None,
        }
    }

    /// Variable the fragment color is assigned to
    pub fn fragment_output(self) -> &'static str {
        match self {
            Self::Glsl330 => "frag_color",
            Self::Gles100 => "gl_FragColor",
        }
    }

    /// 2D texture lookup function
    pub fn texture(self) -> &'static str {
        match self {
            Self::Glsl330 => "texture",
            Self::Gles100 => "texture2D",
        }
    }

    /// `round(x)`; GLSL ES 1.00 has no builtin.
    pub fn round(self, x: &str) -> String {
        match self {
            Self::Glsl330 => format!("round({x})"),
            Self::Gles100 => format!("floor({x} + 0.5)"),
        }
    }

    /// `trunc(x)`; GLSL ES 1.00 has no builtin.
    pub fn trunc(self, x: &str) -> String {
        match self {
            Self::Glsl330 => format!("trunc({x})"),
            Self::Gles100 => format!("(sign({x}) * floor(abs({x})))"),
        }
    }

    /// `transpose(m)`; spelled out element by element on GLSL ES 1.00.
    pub fn transpose(self, m: &str) -> String {
        match self {
            Self::Glsl330 => format!("transpose({m})"),
            Self::Gles100 => {
                let mut elements = Vec::with_capacity(16);
                for column in 0..4 {
                    for row in 0..4 {
                        elements.push(format!("{m}[{row}][{column}]"));
                    }
                }
                format!("mat4({})", elements.join(", "))
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Glsl330 => f.write_str("GLSL 330"),
            Self::Gles100 => f.write_str("GLSL ES 100"),
        }
    }
}
