//! Small 3D helpers shared by the sampler and the weight policies.
//!
//! Euler triples are XYZ order in degrees: the rotation applies X first, then Y,
//! then Z (`R = Rz * Ry * Rx`).

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};

use crate::entry::Axis;

pub type Vec3 = [f64; 3];

const SINGULAR_DET: f64 = 1e-12;

#[inline]
pub fn to_vector(v: Vec3) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

#[inline]
pub fn from_vector(v: &Vector3<f64>) -> Vec3 {
    [v.x, v.y, v.z]
}

pub fn euler_deg_to_rotation(e: Vec3) -> Rotation3<f64> {
    Rotation3::from_euler_angles(e[0].to_radians(), e[1].to_radians(), e[2].to_radians())
}

pub fn euler_deg_to_quat(e: Vec3) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(e[0].to_radians(), e[1].to_radians(), e[2].to_radians())
}

/// Unit direction of the basis `axis` after rotating it by `e`.
pub fn euler_deg_to_dir(e: Vec3, axis: Axis) -> Vector3<f64> {
    let dir = euler_deg_to_rotation(e) * axis.unit();
    match dir.try_normalize(f64::EPSILON) {
        Some(d) => d,
        None => Vector3::z(),
    }
}

/// Inverse of `m`, or identity when `m` is (numerically) singular.
pub fn safe_inverse(m: &Matrix4<f64>) -> Matrix4<f64> {
    if m.determinant().abs() < SINGULAR_DET {
        return Matrix4::identity();
    }
    m.try_inverse().unwrap_or_else(Matrix4::identity)
}

/// Rotation part of an affine matrix as XYZ Euler degrees. Scale is divided out
/// of each basis column first.
pub fn matrix_to_euler_deg(m: &Matrix4<f64>) -> Vec3 {
    let mut basis: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    for mut col in basis.column_iter_mut() {
        let n = col.norm();
        if n > f64::EPSILON {
            col /= n;
        }
    }
    let (x, y, z) = Rotation3::from_matrix_unchecked(basis).euler_angles();
    [x.to_degrees(), y.to_degrees(), z.to_degrees()]
}

pub fn matrix_translation(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Translation * rotation * scale, the order local pose channels compose in.
pub fn compose_trs(location: Vec3, rotation_deg: Vec3, scale: Vec3) -> Matrix4<f64> {
    let t = Matrix4::new_translation(&to_vector(location));
    let r = euler_deg_to_rotation(rotation_deg).to_homogeneous();
    let s = Matrix4::new_nonuniform_scaling(&to_vector(scale));
    t * r * s
}

/// Split `q` into `(swing, twist)` with `q = swing * twist` and `twist` a rotation
/// about `axis`. A zero axis or a twist with no magnitude yields an identity twist.
pub fn swing_twist_decompose(
    q: &UnitQuaternion<f64>,
    axis: &Vector3<f64>,
) -> (UnitQuaternion<f64>, UnitQuaternion<f64>) {
    let Some(axis) = axis.try_normalize(f64::EPSILON) else {
        return (*q, UnitQuaternion::identity());
    };
    let v = q.imag();
    let proj = axis * v.dot(&axis);
    let raw = Quaternion::new(q.w, proj.x, proj.y, proj.z);
    let twist = if raw.norm() > 1e-12 {
        UnitQuaternion::new_normalize(raw)
    } else {
        UnitQuaternion::identity()
    };
    let swing = q * twist.inverse();
    (swing, twist)
}

/// Signed rotation angle of `q` about `axis`, in degrees.
///
/// `q` is flipped into the `w >= 0` hemisphere first, so the magnitude stays in
/// [0, 180]; the sign follows the vector part's direction along `axis`.
pub fn signed_angle_deg(q: &UnitQuaternion<f64>, axis: &Vector3<f64>) -> f64 {
    let mut q = *q.quaternion();
    if q.w < 0.0 {
        q = -q;
    }
    let theta = 2.0 * q.w.clamp(-1.0, 1.0).acos();
    let dir = axis.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros);
    let sign = if q.imag().dot(&dir) >= 0.0 { 1.0 } else { -1.0 };
    sign * theta.to_degrees()
}
