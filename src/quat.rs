use crate::error::{Result, WakeError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Index, IndexMut, Mul, Sub};

// MARK: Quaternion
/// Rotation quaternion stored as `[x, y, z, w]`: vector part first, scalar last.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    vec: [f64; 4],
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Quat { vec: [x, y, z, w] }
    }

    pub const fn identity() -> Self {
        Quat::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Pure quaternion `(p, 0)` used for sandwich rotations.
    pub fn from_vector(p: &Vector3<f64>) -> Self {
        Quat::new(p.x, p.y, p.z, 0.0)
    }

    pub fn vector_part(&self) -> Vector3<f64> {
        Vector3::new(self.vec[0], self.vec[1], self.vec[2])
    }

    pub fn scalar_part(&self) -> f64 {
        self.vec[3]
    }

    pub fn norm_squared(&self) -> f64 {
        self.vec.iter().map(|c| c * c).sum()
    }

    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    pub fn conjugate(&self) -> Self {
        Quat::new(-self.vec[0], -self.vec[1], -self.vec[2], self.vec[3])
    }

    /// Conjugate divided by the squared norm.
    pub fn inverse(&self) -> Result<Self> {
        let n2 = self.norm_squared();
        if n2 == 0.0 || !n2.is_finite() {
            return Err(WakeError::ZeroNormQuaternion);
        }
        let c = self.conjugate();
        Ok(Quat::new(c[0] / n2, c[1] / n2, c[2] / n2, c[3] / n2))
    }

    /// In-place inverse. Leaves `self` untouched on failure.
    pub fn form_inverse(&mut self) -> Result<()> {
        *self = self.inverse()?;
        Ok(())
    }

    /// Rotation of `theta` radians about `axis` (right-handed). The axis is
    /// normalized here; a zero axis gives the identity.
    pub fn form_rotation_quat(axis: &Vector3<f64>, theta: f64) -> Self {
        let mag = axis.norm();
        if mag < 1e-300 {
            return Quat::identity();
        }
        let half = 0.5 * theta;
        let s = half.sin() / mag;
        Quat::new(axis.x * s, axis.y * s, axis.z * s, half.cos())
    }

    /// Single precision input, evaluated in double precision.
    pub fn form_rotation_quat_f32(axis: &[f32; 3], theta: f32) -> Self {
        let axis = Vector3::new(axis[0] as f64, axis[1] as f64, axis[2] as f64);
        Quat::form_rotation_quat(&axis, theta as f64)
    }

    /// Sandwich rotation `q p q⁻¹`. Uses the conjugate, so `self` should be
    /// (near) unit length; use [`Quat::rotate_with`] with an explicit inverse
    /// otherwise.
    pub fn rotate(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotate_with(&self.conjugate(), p)
    }

    pub fn rotate_with(&self, inverse: &Quat, p: &Vector3<f64>) -> Vector3<f64> {
        (*self * Quat::from_vector(p) * *inverse).vector_part()
    }
}

impl Index<usize> for Quat {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        assert!(i < 4, "quaternion index {} out of range 0..4", i);
        &self.vec[i]
    }
}

impl IndexMut<usize> for Quat {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        assert!(i < 4, "quaternion index {} out of range 0..4", i);
        &mut self.vec[i]
    }
}

// MARK: Operators
/// Component-wise sum. Used for blending, not a group operation.
impl Add for Quat {
    type Output = Quat;

    fn add(self, rhs: Quat) -> Quat {
        Quat::new(
            self.vec[0] + rhs.vec[0],
            self.vec[1] + rhs.vec[1],
            self.vec[2] + rhs.vec[2],
            self.vec[3] + rhs.vec[3],
        )
    }
}

impl Sub for Quat {
    type Output = Quat;

    fn sub(self, rhs: Quat) -> Quat {
        Quat::new(
            self.vec[0] - rhs.vec[0],
            self.vec[1] - rhs.vec[1],
            self.vec[2] - rhs.vec[2],
            self.vec[3] - rhs.vec[3],
        )
    }
}

/// Hamilton product: `self` is applied after `rhs` when composing rotations.
impl Mul for Quat {
    type Output = Quat;

    fn mul(self, rhs: Quat) -> Quat {
        let (v1, w1) = (self.vector_part(), self.scalar_part());
        let (v2, w2) = (rhs.vector_part(), rhs.scalar_part());

        let w = w1 * w2 - v1.dot(&v2);
        let v = v2 * w1 + v1 * w2 + v1.cross(&v2);

        Quat::new(v.x, v.y, v.z, w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn random_rotation(rng: &mut StdRng) -> Quat {
        let axis = Vector3::new(
            rng.random::<f64>() * 2.0 - 1.0,
            rng.random::<f64>() * 2.0 - 1.0,
            rng.random::<f64>() * 2.0 - 1.0,
        );
        Quat::form_rotation_quat(&axis, rng.random::<f64>() * 2.0 * PI)
    }

    fn assert_quat_eq(a: &Quat, b: &Quat) {
        for i in 0..4 {
            assert_relative_eq!(a[i], b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rotation_matches_nalgebra() {
        let axis = Vector3::new(1.0, 2.0, -0.5);
        let theta = 0.7;
        let q = Quat::form_rotation_quat(&axis, theta);
        let reference = UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(axis), theta);

        let p = Vector3::new(0.3, -1.2, 4.0);
        let rotated = q.rotate(&p);
        let expected = reference * p;

        assert_relative_eq!(rotated, expected, epsilon = 1e-12);
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let q = Quat::form_rotation_quat(&Vector3::z(), 0.5 * PI);
        let p = q.rotate(&Vector3::x());
        assert_relative_eq!(p, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_product_associative_not_commutative() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let a = random_rotation(&mut rng);
            let b = random_rotation(&mut rng);
            let c = random_rotation(&mut rng);
            assert_quat_eq(&((a * b) * c), &(a * (b * c)));
        }

        let a = Quat::form_rotation_quat(&Vector3::x(), 0.9);
        let b = Quat::form_rotation_quat(&Vector3::y(), 0.4);
        let ab = a * b;
        let ba = b * a;
        let diff: f64 = (0..4).map(|i| (ab[i] - ba[i]).abs()).sum();
        assert!(diff > 1e-3, "x and y rotations should not commute");
    }

    #[test]
    fn test_inverse_gives_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            // Deliberately non-unit
            let q = random_rotation(&mut rng) + Quat::new(0.1, 0.0, 0.2, 0.3);
            let inv = q.inverse().unwrap();
            assert_quat_eq(&(inv * q), &Quat::identity());
            assert_quat_eq(&(q * inv), &Quat::identity());
        }
    }

    #[test]
    fn test_zero_norm_inverse_fails() {
        let mut q = Quat::new(0.0, 0.0, 0.0, 0.0);
        assert!(matches!(q.form_inverse(), Err(WakeError::ZeroNormQuaternion)));
        assert_eq!(q, Quat::new(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_f32_form_matches_f64() {
        let q32 = Quat::form_rotation_quat_f32(&[0.0, 0.0, 1.0], 0.25);
        let q64 = Quat::form_rotation_quat(&Vector3::z(), 0.25);
        for i in 0..4 {
            assert_relative_eq!(q32[i], q64[i], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_add_sub_component_wise() {
        let a = Quat::new(1.0, 2.0, 3.0, 4.0);
        let b = Quat::new(0.5, -1.0, 2.0, 1.0);
        assert_eq!(a + b, Quat::new(1.5, 1.0, 5.0, 5.0));
        assert_eq!(a - b, Quat::new(0.5, 3.0, 1.0, 3.0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_index_bounds_checked() {
        let q = Quat::identity();
        let _ = q[4];
    }

    #[test]
    fn test_zero_axis_is_identity() {
        let q = Quat::form_rotation_quat(&Vector3::zeros(), 1.0);
        assert_eq!(q, Quat::identity());
    }
}
