// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value shapes, input slots and the fixed-capacity buffers that flow
//! between nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of input slots on any node.
pub const MAX_INPUTS: usize = 4;

/// Number of floats a value buffer holds (one 4x4 matrix).
pub const VALUE_CAPACITY: usize = 16;

/// Operand position on a target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u8);

impl Slot {
    /// Slot as an array index
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape tag of a node output.
///
/// `None` means the node has no value yet, usually because a required input
/// is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Shape {
    /// No value
    #[default]
    None,
    /// Single float
    Scalar,
    /// 2-component vector
    Vec2,
    /// 3-component vector
    Vec3,
    /// 4-component vector
    Vec4,
    /// 4x4 matrix, column-major
    Mat4,
}

impl Shape {
    /// Number of floats carried by this shape.
    pub const fn components(self) -> usize {
        match self {
            Self::None => 0,
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Mat4 => 16,
        }
    }

    /// Shape for a component count, if it is one of 0, 1, 2, 3, 4 or 16.
    pub const fn from_components(count: usize) -> Option<Self> {
        match count {
            0 => Some(Self::None),
            1 => Some(Self::Scalar),
            2 => Some(Self::Vec2),
            3 => Some(Self::Vec3),
            4 => Some(Self::Vec4),
            16 => Some(Self::Mat4),
            _ => None,
        }
    }

    /// Whether this is the empty shape
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// GLSL type keyword for values of this shape.
    pub const fn glsl_type(self) -> &'static str {
        match self {
            Self::None => "void",
            Self::Scalar => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Mat4 => "mat4",
        }
    }
}

/// A node output: up to sixteen floats plus a shape tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortValue {
    data: [f32; VALUE_CAPACITY],
    shape: Shape,
}

impl PortValue {
    /// Value with no shape and a zeroed buffer.
    pub const EMPTY: Self = Self {
        data: [0.0; VALUE_CAPACITY],
        shape: Shape::None,
    };

    /// Zero value of the given shape
    pub const fn zeroed(shape: Shape) -> Self {
        Self {
            data: [0.0; VALUE_CAPACITY],
            shape,
        }
    }

    /// Single float
    pub fn scalar(value: f32) -> Self {
        let mut out = Self::zeroed(Shape::Scalar);
        out.data[0] = value;
        out
    }

    /// 4x4 identity matrix
    pub fn identity() -> Self {
        let mut out = Self::zeroed(Shape::Mat4);
        for i in 0..4 {
            out.data[i * 4 + i] = 1.0;
        }
        out
    }

    /// Build a value from its components. Returns `None` when the length is
    /// not a valid shape.
    pub fn from_slice(components: &[f32]) -> Option<Self> {
        let shape = Shape::from_components(components.len())?;
        let mut out = Self::zeroed(shape);
        out.data[..components.len()].copy_from_slice(components);
        Some(out)
    }

    /// Shape tag
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of live components
    pub fn len(&self) -> usize {
        self.shape.components()
    }

    /// Whether the value has no shape
    pub fn is_empty(&self) -> bool {
        self.shape.is_none()
    }

    /// Live components
    pub fn components(&self) -> &[f32] {
        &self.data[..self.len()]
    }

    /// Full backing buffer, including unused slots.
    pub fn data(&self) -> &[f32; VALUE_CAPACITY] {
        &self.data
    }

    /// Component `index`, or 0.0 past the live length.
    pub fn get(&self, index: usize) -> f32 {
        if index < self.len() {
            self.data[index]
        } else {
            0.0
        }
    }

    /// Reset to the empty value.
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    /// Widen to a vec4 the way a stage output is assigned: a scalar is
    /// broadcast to rgb, shorter vectors are padded, and the last component
    /// defaults to 1.
    pub fn widen_to_vec4(&self) -> Self {
        let mut out = Self::zeroed(Shape::Vec4);
        match self.len() {
            1 => {
                out.data[..3].fill(self.data[0]);
                out.data[3] = 1.0;
            }
            2 | 3 => {
                out.data[..self.len()].copy_from_slice(self.components());
                out.data[3] = 1.0;
            }
            4 => out.data[..4].copy_from_slice(&self.data[..4]),
            _ => out.data[3] = 1.0,
        }
        out
    }
}

impl Default for PortValue {
    fn default() -> Self {
        Self::EMPTY
    }
}
