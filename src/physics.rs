use nalgebra::Vector3;
use std::f64::consts::PI;

const FOUR_PI: f64 = 4.0 * PI;

/// MARK: Biot-Savart
/// Velocity induced at `point` by the straight vortex segment `a -> b` of
/// strength `gamma`, de-singularized with a Vatistas (n = 2) core of radius
/// `core_size`.
///
/// The regularized law multiplies the classical segment result by
/// `h² / sqrt(h⁴ + rc⁴)`, where `h` is the distance to the segment axis. On
/// the axis, at an endpoint, or for a degenerate segment (all judged against
/// `tolerance`) the regularized limit is zero, which is returned directly.
pub fn biot_savart_segment(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    point: &Vector3<f64>,
    gamma: f64,
    core_size: f64,
    tolerance: f64,
) -> Vector3<f64> {
    let r0 = b - a;
    let r1 = point - a;
    let r2 = point - b;

    let r0_sq = r0.norm_squared();
    let r1_mag = r1.norm();
    let r2_mag = r2.norm();

    if r0_sq < tolerance * tolerance || r1_mag < tolerance || r2_mag < tolerance {
        return Vector3::zeros();
    }

    let cross = r1.cross(&r2);
    let h_sq = cross.norm_squared() / r0_sq;

    if h_sq < tolerance * tolerance {
        return Vector3::zeros();
    }

    let rc_sq = core_size * core_size;
    let core = (h_sq * h_sq + rc_sq * rc_sq).sqrt();

    let projection = r0.dot(&(r1 / r1_mag - r2 / r2_mag));

    cross * (gamma * projection / (FOUR_PI * r0_sq * core))
}

/// Distance from `point` to the closest point of segment `a -> b`.
pub fn distance_to_segment(a: &Vector3<f64>, b: &Vector3<f64>, point: &Vector3<f64>) -> f64 {
    let r0 = b - a;
    let len_sq = r0.norm_squared();
    if len_sq == 0.0 {
        return (point - a).norm();
    }
    let t = ((point - a).dot(&r0) / len_sq).clamp(0.0, 1.0);
    (point - (a + r0 * t)).norm()
}

/// Mirror image about the ground plane `z = 0`.
pub fn mirror_z(p: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(p.x, p.y, -p.z)
}
