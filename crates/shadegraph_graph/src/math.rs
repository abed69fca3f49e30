// SPDX-License-Identifier: MIT OR Apache-2.0
//! Component-wise and linear algebra helpers over [`PortValue`].
//!
//! Matrices are 4x4, column-major: element (row `r`, column `c`) lives at
//! index `c * 4 + r`, matching GLSL's `mat4` layout.

use crate::port::PortValue;

/// Apply `op` to every live component of `value`.
pub fn map<F>(value: &PortValue, op: F) -> PortValue
where
    F: Fn(f32) -> f32,
{
    let mut data = *value.data();
    for x in data.iter_mut().take(value.len()) {
        *x = op(*x);
    }
    vector(&data[..value.len()])
}

/// Apply `op` pairwise, broadcasting a scalar against the other side.
///
/// Returns `None` when both sides are vectors of different lengths.
pub fn zip<F>(lhs: &PortValue, rhs: &PortValue, op: F) -> Option<PortValue>
where
    F: Fn(f32, f32) -> f32,
{
    let shape = match (lhs.len(), rhs.len()) {
        (a, b) if a == b => lhs.shape(),
        (1, _) => rhs.shape(),
        (_, 1) => lhs.shape(),
        _ => return None,
    };
    let len = shape.components();
    let pick = |v: &PortValue, i: usize| if v.len() == 1 { v.get(0) } else { v.get(i) };

    let mut data = [0.0; 16];
    for (i, slot) in data.iter_mut().enumerate().take(len) {
        *slot = op(pick(lhs, i), pick(rhs, i));
    }
    Some(vector(&data[..len]))
}

/// Sum of component-wise products over the shorter operand.
pub fn dot(lhs: &PortValue, rhs: &PortValue) -> f32 {
    lhs.components()
        .iter()
        .zip(rhs.components())
        .map(|(a, b)| a * b)
        .sum()
}

/// Euclidean length
pub fn length(value: &PortValue) -> f32 {
    dot(value, value).sqrt()
}

/// Unit vector in the direction of `value`; a zero vector stays zero.
pub fn normalize(value: &PortValue) -> PortValue {
    let len = length(value);
    if len == 0.0 {
        return PortValue::zeroed(value.shape());
    }
    map(value, |x| x / len)
}

/// Cross product of two vec3
pub fn cross(lhs: &PortValue, rhs: &PortValue) -> PortValue {
    let (a, b) = (lhs, rhs);
    vector(&[
        a.get(1) * b.get(2) - a.get(2) * b.get(1),
        a.get(2) * b.get(0) - a.get(0) * b.get(2),
        a.get(0) * b.get(1) - a.get(1) * b.get(0),
    ])
}

/// `m * v` with `v` as a column vector.
pub fn mat4_mul_vec4(m: &PortValue, v: &PortValue) -> PortValue {
    let mut out = [0.0; 4];
    for (r, slot) in out.iter_mut().enumerate() {
        *slot = (0..4).map(|c| m.get(c * 4 + r) * v.get(c)).sum();
    }
    vector(&out)
}

/// Matrix product `a * b`
pub fn mat4_mul(a: &PortValue, b: &PortValue) -> PortValue {
    let mut out = [0.0; 16];
    for c in 0..4 {
        for r in 0..4 {
            out[c * 4 + r] = (0..4).map(|k| a.get(k * 4 + r) * b.get(c * 4 + k)).sum();
        }
    }
    vector(&out)
}

/// Swap rows and columns
pub fn transpose(m: &PortValue) -> PortValue {
    let mut out = [0.0; 16];
    for c in 0..4 {
        for r in 0..4 {
            out[r * 4 + c] = m.get(c * 4 + r);
        }
    }
    vector(&out)
}

/// `a + (b - a) * t`
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Clamped Hermite interpolation between `edge0` and `edge1`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge0 == edge1 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Build a value from raw components. Lengths other than 1-4 or 16 produce
/// an empty value.
pub fn vector(components: &[f32]) -> PortValue {
    PortValue::from_slice(components).unwrap_or(PortValue::EMPTY)
}

/// Concatenate live components in order. `None` if the result has more
/// than four components.
pub fn concat<'a, I>(values: I) -> Option<PortValue>
where
    I: IntoIterator<Item = &'a PortValue>,
{
    let mut data = Vec::with_capacity(4);
    for value in values {
        data.extend_from_slice(value.components());
    }
    if data.len() > 4 {
        return None;
    }
    PortValue::from_slice(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn v(components: &[f32]) -> PortValue {
        vector(components)
    }

    #[test]
    fn test_zip_broadcasts_scalars() {
        let out = zip(&v(&[2.0]), &v(&[1.0, 2.0, 3.0]), |a, b| a * b).unwrap();
        assert_eq!(out.components(), &[2.0, 4.0, 6.0]);
        assert!(zip(&v(&[1.0, 2.0]), &v(&[1.0, 2.0, 3.0]), |a, b| a + b).is_none());
    }

    #[test]
    fn test_normalize_and_length() {
        let n = normalize(&v(&[3.0, 0.0, 4.0]));
        assert_relative_eq!(n.get(0), 0.6);
        assert_relative_eq!(n.get(2), 0.8);
        assert_relative_eq!(length(&n), 1.0);
        assert_eq!(normalize(&v(&[0.0, 0.0])).components(), &[0.0, 0.0]);
    }

    #[test]
    fn test_cross() {
        let z = cross(&v(&[1.0, 0.0, 0.0]), &v(&[0.0, 1.0, 0.0]));
        assert_eq!(z.components(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_column_major_matrix_vector() {
        // Translation by (1, 2, 3) lives in the last column.
        let mut m = *PortValue::identity().data();
        m[12] = 1.0;
        m[13] = 2.0;
        m[14] = 3.0;
        let out = mat4_mul_vec4(&v(&m), &v(&[1.0, 1.0, 1.0, 1.0]));
        assert_eq!(out.components(), &[2.0, 3.0, 4.0, 1.0]);

        let t = transpose(&v(&m));
        assert_eq!(t.get(3), 1.0);
        assert_eq!(t.get(12), 0.0);
    }

    #[test]
    fn test_mat4_mul_identity() {
        let mut m = [0.0; 16];
        for (i, x) in m.iter_mut().enumerate() {
            *x = i as f32;
        }
        let m = v(&m);
        assert_eq!(mat4_mul(&PortValue::identity(), &m), m);
        assert_eq!(mat4_mul(&m, &PortValue::identity()), m);
    }

    #[test]
    fn test_smoothstep_edges() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert_relative_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
        assert_eq!(smoothstep(1.0, 1.0, 0.5), 0.0);
    }

    #[test]
    fn test_concat() {
        let out = concat([&v(&[1.0, 2.0]), &v(&[3.0])]).unwrap();
        assert_eq!(out.components(), &[1.0, 2.0, 3.0]);
        assert!(concat([&v(&[1.0, 2.0, 3.0]), &v(&[1.0, 2.0])]).is_none());
    }
}
