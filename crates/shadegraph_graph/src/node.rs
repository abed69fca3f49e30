// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node kinds and node instances.

use crate::port::{PortValue, Shape, MAX_INPUTS};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Dense node identifier. Reused after deletion; also names the node's
/// variable in generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u16);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a node for the whole session, independent of id reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub Uuid);

impl NodeHandle {
    /// Create a new random handle
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Node family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeFamily {
    /// Zero-input symbolic sources (time, geometry attributes, matrices)
    Environment,
    /// Literal constants, optionally exposed as uniforms
    Literal,
    /// Variadic `+ - * /`
    Arithmetic,
    /// Fixed-arity math, vector, matrix and texture operators
    Operator,
    /// The two stage outputs
    Sink,
}

/// How many inputs a node needs before it produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Produces a value with nothing connected
    None,
    /// At least one slot, any of them
    AnySlot,
    /// Every slot below the given count
    Leading(usize),
}

/// Closed set of node kinds. Discriminants are the persisted kind codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum NodeKind {
    // Environment
    /// Seconds since start
    Time = 0,
    /// Object-space vertex position
    Position = 1,
    /// Object-space vertex normal
    Normal = 2,
    /// Direction from the surface towards the camera
    ViewDirection = 3,
    /// Schlick-style rim term
    Fresnel = 4,
    /// Model-view-projection matrix
    MvpMatrix = 5,
    /// Mesh texture coordinates
    Uv = 6,

    // Literals
    /// Literal float
    Float = 10,
    /// Literal vec2
    Vector2 = 11,
    /// Literal vec3
    Vector3 = 12,
    /// Literal vec4
    Vector4 = 13,
    /// Literal mat4
    Matrix4 = 14,

    // Arithmetic
    /// Sum of all inputs
    Add = 20,
    /// First input minus the rest
    Subtract = 21,
    /// Product of all inputs, folded left to right. Scalars broadcast and a
    /// mat4 paired with a vec4 (either order) transforms the vector. Two mat4
    /// operands give the matrix product, as GLSL `*` does; every other
    /// pairing is component-wise.
    Multiply = 22,
    /// First input divided by the rest
    Divide = 23,

    // Unary math
    /// `abs(x)`
    Abs = 30,
    /// `cos(x)`
    Cos = 31,
    /// `sin(x)`
    Sin = 32,
    /// `tan(x)`
    Tan = 33,
    /// Degrees to radians
    Radians = 34,
    /// Radians to degrees
    Degrees = 35,
    /// `-x`
    Negate = 36,
    /// `1 / x`
    Reciprocal = 37,
    /// `sqrt(x)`
    Sqrt = 38,
    /// Truncate toward zero
    Trunc = 39,
    /// Round to nearest
    Round = 40,
    /// `ceil(x)`
    Ceil = 41,
    /// `floor(x)`
    Floor = 42,
    /// `x - floor(x)`
    Fract = 43,
    /// Clamp to `[0, 1]`
    Saturate = 44,
    /// `2^x`
    Exp2 = 45,
    /// `1 - x`
    OneMinus = 46,

    // Vector
    /// Unit-length vector
    Normalize = 50,
    /// Euclidean length
    Length = 51,
    /// Dot product
    Dot = 52,
    /// Cross product of two vec3
    Cross = 53,
    /// Distance between two points
    Distance = 54,
    /// Projection of A onto B
    Project = 55,
    /// Rejection of A from B
    Reject = 56,
    /// Normalized sum of two normalized directions
    HalfDirection = 57,
    /// Blend a color toward its luminance
    Desaturate = 58,

    // Binary / ternary
    /// `pow(x, e)` with a scalar exponent
    Power = 60,
    /// `floor(x * n) / n` with a scalar step count
    Posterize = 61,
    /// `x <= t ? 1 : 0` with a scalar threshold
    Step = 62,
    /// Component-wise maximum of all inputs
    Max = 63,
    /// Component-wise minimum of all inputs
    Min = 64,
    /// `a + (b - a) * t`
    Lerp = 65,
    /// Clamped Hermite between two edges
    Smoothstep = 66,
    /// Concatenate inputs into one vector
    Append = 67,

    // Matrix
    /// mat4 transpose
    Transpose = 70,
    /// mat4 product
    MatrixMultiply = 71,

    // Texture / attributes
    /// Sample a 2D texture unit
    TextureSample = 80,
    /// Per-vertex color attribute
    VertexColor = 81,

    // Sinks
    /// Vertex stage position output
    VertexOutput = 90,
    /// Fragment stage color output
    FragmentOutput = 91,
}

impl NodeKind {
    /// Every kind, in code order.
    pub const ALL: &'static [NodeKind] = &[
        Self::Time,
        Self::Position,
        Self::Normal,
        Self::ViewDirection,
        Self::Fresnel,
        Self::MvpMatrix,
        Self::Uv,
        Self::Float,
        Self::Vector2,
        Self::Vector3,
        Self::Vector4,
        Self::Matrix4,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Abs,
        Self::Cos,
        Self::Sin,
        Self::Tan,
        Self::Radians,
        Self::Degrees,
        Self::Negate,
        Self::Reciprocal,
        Self::Sqrt,
        Self::Trunc,
        Self::Round,
        Self::Ceil,
        Self::Floor,
        Self::Fract,
        Self::Saturate,
        Self::Exp2,
        Self::OneMinus,
        Self::Normalize,
        Self::Length,
        Self::Dot,
        Self::Cross,
        Self::Distance,
        Self::Project,
        Self::Reject,
        Self::HalfDirection,
        Self::Desaturate,
        Self::Power,
        Self::Posterize,
        Self::Step,
        Self::Max,
        Self::Min,
        Self::Lerp,
        Self::Smoothstep,
        Self::Append,
        Self::Transpose,
        Self::MatrixMultiply,
        Self::TextureSample,
        Self::VertexColor,
        Self::VertexOutput,
        Self::FragmentOutput,
    ];

    /// Persisted numeric code
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Kind for a persisted code
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }

    /// Family this kind belongs to.
    pub fn family(self) -> NodeFamily {
        match self.code() {
            0..=9 => NodeFamily::Environment,
            10..=19 => NodeFamily::Literal,
            20..=29 => NodeFamily::Arithmetic,
            90..=u16::MAX => NodeFamily::Sink,
            _ => NodeFamily::Operator,
        }
    }

    /// Whether this is a literal source
    pub fn is_literal(self) -> bool {
        self.family() == NodeFamily::Literal
    }

    /// Whether this is one of the two stage outputs
    pub fn is_sink(self) -> bool {
        self.family() == NodeFamily::Sink
    }

    /// Whether any number of inputs (up to the limit) may be folded together.
    pub fn is_variadic(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Subtract
                | Self::Multiply
                | Self::Divide
                | Self::Max
                | Self::Min
                | Self::Append
        )
    }

    /// Default number of input slots.
    pub fn input_limit(self) -> usize {
        if self.is_variadic() {
            return MAX_INPUTS;
        }
        match self.family() {
            NodeFamily::Environment | NodeFamily::Literal => 0,
            NodeFamily::Sink => 1,
            _ => match self {
                Self::TextureSample => 3,
                Self::VertexColor => 1,
                _ => match self.requirement() {
                    Requirement::Leading(count) => count,
                    _ => 1,
                },
            },
        }
    }

    /// Inputs needed before the node yields a value.
    pub fn requirement(self) -> Requirement {
        if self.is_variadic() {
            return Requirement::AnySlot;
        }
        match self {
            Self::Dot
            | Self::Cross
            | Self::Distance
            | Self::Project
            | Self::Reject
            | Self::HalfDirection
            | Self::Desaturate
            | Self::Power
            | Self::Posterize
            | Self::Step
            | Self::MatrixMultiply => Requirement::Leading(2),
            Self::Lerp | Self::Smoothstep => Requirement::Leading(3),
            Self::TextureSample | Self::VertexColor => Requirement::None,
            _ => match self.family() {
                NodeFamily::Operator => Requirement::Leading(1),
                _ => Requirement::None,
            },
        }
    }

    /// Shape a source, literal or sink of this kind always has. Operators
    /// derive their shape from inputs and return `Shape::None`.
    pub fn natural_shape(self) -> Shape {
        match self {
            Self::Time | Self::Fresnel | Self::Float => Shape::Scalar,
            Self::Uv | Self::Vector2 => Shape::Vec2,
            Self::Position | Self::Normal | Self::ViewDirection | Self::Vector3 => Shape::Vec3,
            Self::Vector4 | Self::VertexOutput | Self::FragmentOutput => Shape::Vec4,
            Self::MvpMatrix | Self::Matrix4 => Shape::Mat4,
            _ => Shape::None,
        }
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Time => "Time",
            Self::Position => "Position",
            Self::Normal => "Normal",
            Self::ViewDirection => "View Direction",
            Self::Fresnel => "Fresnel",
            Self::MvpMatrix => "MVP Matrix",
            Self::Uv => "UV",
            Self::Float => "Float",
            Self::Vector2 => "Vector2",
            Self::Vector3 => "Vector3",
            Self::Vector4 => "Vector4",
            Self::Matrix4 => "Matrix4",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::Abs => "Absolute",
            Self::Cos => "Cosine",
            Self::Sin => "Sine",
            Self::Tan => "Tangent",
            Self::Radians => "Degrees to Radians",
            Self::Degrees => "Radians to Degrees",
            Self::Negate => "Negate",
            Self::Reciprocal => "Reciprocal",
            Self::Sqrt => "Square Root",
            Self::Trunc => "Truncate",
            Self::Round => "Round",
            Self::Ceil => "Ceiling",
            Self::Floor => "Floor",
            Self::Fract => "Fraction",
            Self::Saturate => "Saturate",
            Self::Exp2 => "Exp2",
            Self::OneMinus => "One Minus",
            Self::Normalize => "Normalize",
            Self::Length => "Length",
            Self::Dot => "Dot Product",
            Self::Cross => "Cross Product",
            Self::Distance => "Distance",
            Self::Project => "Projection",
            Self::Reject => "Rejection",
            Self::HalfDirection => "Half Direction",
            Self::Desaturate => "Desaturate",
            Self::Power => "Power",
            Self::Posterize => "Posterize",
            Self::Step => "Step",
            Self::Max => "Maximum",
            Self::Min => "Minimum",
            Self::Lerp => "Lerp",
            Self::Smoothstep => "Smoothstep",
            Self::Append => "Append",
            Self::Transpose => "Transpose",
            Self::MatrixMultiply => "Matrix Multiply",
            Self::TextureSample => "Texture Sample",
            Self::VertexColor => "Vertex Color",
            Self::VertexOutput => "Vertex Output",
            Self::FragmentOutput => "Fragment Output",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Creation parameter handed to the node factory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum NodeInit {
    /// Kind defaults
    #[default]
    Default,
    /// Initial literal components; the count must match the literal kind.
    Literal(Vec<f32>),
    /// Input limit for a variadic kind, `2..=MAX_INPUTS`.
    Arity(usize),
}

/// Reason a [`NodeInit`] does not fit its kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InitError {
    /// Literal data for a non-literal kind, or of the wrong length
    #[error("{kind} cannot hold a literal of {len} components")]
    Literal {
        /// Target kind
        kind: NodeKind,
        /// Supplied component count
        len: usize,
    },

    /// Arity for a fixed kind, or out of range
    #[error("{kind} cannot take an arity of {arity}")]
    Arity {
        /// Target kind
        kind: NodeKind,
        /// Requested arity
        arity: usize,
    },
}

/// A node instance in the graph
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    handle: NodeHandle,
    kind: NodeKind,
    /// Rebuilt from edges on every evaluation pass
    pub(crate) inputs: [Option<NodeId>; MAX_INPUTS],
    input_limit: usize,
    pub(crate) output: PortValue,
    literal: PortValue,
    property: bool,
    alpha_clip: Option<f32>,
    /// Position in the editor canvas
    pub position: [f32; 2],
}

impl Node {
    /// Create a node of `kind`. Literals start with `init`'s value (zeros, or
    /// identity for `Matrix4`); variadic kinds may narrow their input limit.
    pub fn new(id: NodeId, kind: NodeKind, init: NodeInit) -> Result<Self, InitError> {
        let mut input_limit = kind.input_limit();
        let mut literal = PortValue::EMPTY;

        if kind.is_literal() {
            literal = match kind {
                NodeKind::Matrix4 => PortValue::identity(),
                _ => PortValue::zeroed(kind.natural_shape()),
            };
        }

        match init {
            NodeInit::Default => {}
            NodeInit::Literal(values) => {
                if !kind.is_literal() || values.len() != kind.natural_shape().components() {
                    return Err(InitError::Literal { kind, len: values.len() });
                }
                literal = PortValue::from_slice(&values)
                    .ok_or(InitError::Literal { kind, len: values.len() })?;
            }
            NodeInit::Arity(arity) => {
                if !kind.is_variadic() || !(2..=MAX_INPUTS).contains(&arity) {
                    return Err(InitError::Arity { kind, arity });
                }
                input_limit = arity;
            }
        }

        let output = match kind.family() {
            NodeFamily::Literal => literal,
            NodeFamily::Environment | NodeFamily::Sink => PortValue::zeroed(kind.natural_shape()),
            _ => PortValue::EMPTY,
        };

        Ok(Self {
            id,
            handle: NodeHandle::new(),
            kind,
            inputs: [None; MAX_INPUTS],
            input_limit,
            output,
            literal,
            property: false,
            alpha_clip: None,
            position: [0.0, 0.0],
        })
    }

    /// Dense id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Stable handle
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// Kind
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Inputs by slot, as of the last evaluation pass.
    pub fn inputs(&self) -> &[Option<NodeId>; MAX_INPUTS] {
        &self.inputs
    }

    /// Number of connected slots, as of the last evaluation pass.
    pub fn input_count(&self) -> usize {
        self.inputs.iter().flatten().count()
    }

    /// Maximum number of connected slots
    pub fn input_limit(&self) -> usize {
        self.input_limit
    }

    /// Current output value
    pub fn output(&self) -> &PortValue {
        &self.output
    }

    /// Literal value (empty for non-literals)
    pub fn literal(&self) -> &PortValue {
        &self.literal
    }

    /// Whether the literal is exposed as a uniform
    pub fn is_property(&self) -> bool {
        self.property
    }

    /// Alpha threshold below which a texture sample discards the fragment
    pub fn alpha_clip(&self) -> Option<f32> {
        self.alpha_clip
    }

    /// Whether the last evaluation left the node without a value.
    pub fn is_valid(&self) -> bool {
        !self.output.is_empty()
    }

    pub(crate) fn set_literal(&mut self, value: PortValue) {
        self.literal = value;
        self.output = value;
    }

    pub(crate) fn set_property(&mut self, property: bool) {
        self.property = property;
    }

    pub(crate) fn set_alpha_clip(&mut self, threshold: Option<f32>) {
        self.alpha_clip = threshold;
    }
}
