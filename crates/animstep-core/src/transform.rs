//! Joint transform math:
//! - QuatT (quaternion + translation) composition and inversion
//! - quaternion NLERP with shortest-arc normalization
//!
//! Quaternions are (x, y, z, w) arrays throughout.

#[inline]
pub fn dot4(a: [f32; 4], b: [f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

#[inline]
pub fn normalize4(mut q: [f32; 4]) -> [f32; 4] {
    let len2 = dot4(q, q);
    if len2 > 0.0 {
        let inv_len = len2.sqrt().recip();
        q[0] *= inv_len;
        q[1] *= inv_len;
        q[2] *= inv_len;
        q[3] *= inv_len;
    }
    q
}

#[inline]
pub fn quat_mul(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [
        a[3] * b[0] + a[0] * b[3] + a[1] * b[2] - a[2] * b[1],
        a[3] * b[1] - a[0] * b[2] + a[1] * b[3] + a[2] * b[0],
        a[3] * b[2] + a[0] * b[1] - a[1] * b[0] + a[2] * b[3],
        a[3] * b[3] - a[0] * b[0] - a[1] * b[1] - a[2] * b[2],
    ]
}

#[inline]
pub fn quat_conjugate(q: [f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

/// Rotate a vector by a unit quaternion: v' = v + 2w(q×v) + 2(q×(q×v)).
#[inline]
pub fn quat_rotate(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let qv = [q[0], q[1], q[2]];
    let uv = cross3(qv, v);
    let uuv = cross3(qv, uv);
    [
        v[0] + 2.0 * (q[3] * uv[0] + uuv[0]),
        v[1] + 2.0 * (q[3] * uv[1] + uuv[1]),
        v[2] + 2.0 * (q[3] * uv[2] + uuv[2]),
    ]
}

#[inline]
fn cross3(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Quaternion NLERP with shortest-arc correction.
/// If dot < 0, negate the second quaternion to ensure the shortest path.
/// Returns a normalized quaternion (x,y,z,w).
#[inline]
pub fn nlerp_quat(a: [f32; 4], mut b: [f32; 4], t: f32) -> [f32; 4] {
    let d = dot4(a, b);
    if d < 0.0 {
        b[0] = -b[0];
        b[1] = -b[1];
        b[2] = -b[2];
        b[3] = -b[3];
    }
    normalize4([
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ])
}

/// Rigid transform: unit quaternion plus translation.
///
/// `repr(C)` with no internal padding so it may back a pose buffer field.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuatT {
    pub rot: [f32; 4],
    pub pos: [f32; 3],
}

impl QuatT {
    pub const IDENTITY: QuatT = QuatT {
        rot: [0.0, 0.0, 0.0, 1.0],
        pos: [0.0, 0.0, 0.0],
    };

    #[inline]
    pub fn new(rot: [f32; 4], pos: [f32; 3]) -> Self {
        Self { rot, pos }
    }

    /// Compose parent * child (apply `child` in this transform's space).
    #[inline]
    pub fn multiply(&self, child: &QuatT) -> QuatT {
        let rotated = quat_rotate(self.rot, child.pos);
        QuatT {
            rot: quat_mul(self.rot, child.rot),
            pos: [
                self.pos[0] + rotated[0],
                self.pos[1] + rotated[1],
                self.pos[2] + rotated[2],
            ],
        }
    }

    /// Compose parent * child with the parent's accumulated uniform scale
    /// applied to the child's translation.
    #[inline]
    pub fn multiply_scaled(&self, child: &QuatT, parent_scale: f32) -> QuatT {
        let scaled = [
            child.pos[0] * parent_scale,
            child.pos[1] * parent_scale,
            child.pos[2] * parent_scale,
        ];
        let rotated = quat_rotate(self.rot, scaled);
        QuatT {
            rot: quat_mul(self.rot, child.rot),
            pos: [
                self.pos[0] + rotated[0],
                self.pos[1] + rotated[1],
                self.pos[2] + rotated[2],
            ],
        }
    }

    /// Inverse of a rigid transform (rotation assumed unit length).
    #[inline]
    pub fn inverse(&self) -> QuatT {
        let inv_rot = quat_conjugate(self.rot);
        let p = quat_rotate(inv_rot, self.pos);
        QuatT {
            rot: inv_rot,
            pos: [-p[0], -p[1], -p[2]],
        }
    }

    #[inline]
    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 3] {
        let r = quat_rotate(self.rot, p);
        [self.pos[0] + r[0], self.pos[1] + r[1], self.pos[2] + r[2]]
    }

    /// Copy with the rotation renormalized. Used after hierarchical
    /// composition to keep orientations numerically stable.
    #[inline]
    pub fn normalized(&self) -> QuatT {
        QuatT {
            rot: normalize4(self.rot),
            pos: self.pos,
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.rot.iter().all(|c| c.is_finite()) && self.pos.iter().all(|c| c.is_finite())
    }
}

impl Default for QuatT {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx3(a: [f32; 3], b: [f32; 3], eps: f32) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() <= eps, "left={a:?} right={b:?}");
        }
    }

    #[test]
    fn multiply_then_inverse_roundtrip() {
        // 90 degrees around Z with an offset
        let s = 0.5f32.sqrt();
        let t = QuatT::new([0.0, 0.0, s, s], [1.0, 2.0, 3.0]);
        let child = QuatT::new([0.0, s, 0.0, s], [0.5, 0.0, -0.5]);
        let composed = t.multiply(&child);
        let recovered = t.inverse().multiply(&composed);
        approx3(recovered.pos, child.pos, 1e-5);
        let d = dot4(recovered.rot, child.rot).abs();
        assert!(d > 1.0 - 1e-5, "rotations differ: {d}");
    }

    #[test]
    fn rotate_quarter_turn() {
        let s = 0.5f32.sqrt();
        let q = [0.0, 0.0, s, s]; // 90 deg around Z
        approx3(quat_rotate(q, [1.0, 0.0, 0.0]), [0.0, 1.0, 0.0], 1e-5);
    }

    #[test]
    fn nlerp_unit_norm_at_midpoint() {
        let q = nlerp_quat([0.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 0.0], 0.5);
        let n = dot4(q, q).sqrt();
        assert!((n - 1.0).abs() < 1e-4);
    }
}
