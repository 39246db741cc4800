//! Pose container: per-joint transforms in parent-relative and model-absolute
//! space, plus optional uniform scale, all backed by fixed-field buffers.
//!
//! The joints buffer always carries three fields (relative, absolute, status
//! flags). The scaling buffer is populated lazily and only when uniform
//! scaling is enabled; reads default to 1.0 when it is absent.

use crate::buffer::FieldBuffer;
use crate::error::PipelineError;
use crate::memory::AllocatorHandle;
use crate::skeleton::Skeleton;
use crate::transform::QuatT;

/// Per-joint status bits.
pub mod joint_status {
    /// The absolute transform was produced by `compute_absolute_pose`.
    pub const ABSOLUTE_VALID: u32 = 1 << 0;
    /// At least one command wrote this joint's relative transform this frame.
    pub const SAMPLED: u32 = 1 << 1;
}

const F_RELATIVE: usize = 0;
const F_ABSOLUTE: usize = 1;
const F_STATUS: usize = 2;

const F_SCALE_RELATIVE: usize = 0;
const F_SCALE_ABSOLUTE: usize = 1;

pub struct PoseData {
    joint_count: usize,
    joints: FieldBuffer<3>,
    scaling: Option<FieldBuffer<2>>,
    scaling_enabled: bool,
    allocator: AllocatorHandle,
}

impl PoseData {
    /// Empty pose; call one of the `initialize` variants before use.
    pub fn new(allocator: AllocatorHandle, scaling_enabled: bool) -> Self {
        Self {
            joint_count: 0,
            joints: FieldBuffer::new(allocator.clone()),
            scaling: None,
            scaling_enabled,
            allocator,
        }
    }

    /// Declare and lock buffers for `joint_count` joints. Existing content is
    /// discarded; the scaling buffer stays absent until first written.
    pub fn initialize(&mut self, joint_count: usize) -> Result<(), PipelineError> {
        if self.joints.is_locked() {
            self.joints.unlock();
        }
        self.joints.resize::<QuatT>(F_RELATIVE, joint_count);
        self.joints.resize::<QuatT>(F_ABSOLUTE, joint_count);
        self.joints.resize::<u32>(F_STATUS, joint_count);
        if !self.joints.lock() {
            self.joint_count = 0;
            return Err(PipelineError::PoseAllocation { joint_count });
        }
        self.joint_count = joint_count;
        self.scaling = None;
        for t in self.joints.slice_mut::<QuatT>(F_RELATIVE) {
            *t = QuatT::IDENTITY;
        }
        for t in self.joints.slice_mut::<QuatT>(F_ABSOLUTE) {
            *t = QuatT::IDENTITY;
        }
        for s in self.joints.slice_mut::<u32>(F_STATUS) {
            *s = 0;
        }
        Ok(())
    }

    /// Initialize to the skeleton's default (bind) relative pose.
    pub fn initialize_from_skeleton(&mut self, skeleton: &Skeleton) -> Result<(), PipelineError> {
        self.initialize(skeleton.joint_count())?;
        let relative = self.joints.slice_mut::<QuatT>(F_RELATIVE);
        for (slot, joint) in relative.iter_mut().zip(skeleton.joints()) {
            *slot = joint.default_relative;
        }
        Ok(())
    }

    /// Initialize as a deep copy of another pose (possibly from a different
    /// allocator; this is how per-frame write poses are seeded).
    pub fn initialize_from_pose(&mut self, other: &PoseData) -> Result<(), PipelineError> {
        self.initialize(other.joint_count)?;
        self.copy_from(other)
    }

    /// Copy transforms, flags, and scale from an equally-sized pose.
    pub fn copy_from(&mut self, other: &PoseData) -> Result<(), PipelineError> {
        if other.joint_count != self.joint_count {
            return Err(PipelineError::JointCountMismatch {
                pose: other.joint_count,
                expected: self.joint_count,
            });
        }
        self.joints.bytes_mut().copy_from_slice(other.joints.bytes());
        match (&other.scaling, self.scaling_enabled) {
            (Some(src), true) => {
                if self.ensure_scaling() {
                    if let Some(dst) = self.scaling.as_mut() {
                        dst.bytes_mut().copy_from_slice(src.bytes());
                    }
                }
            }
            _ => self.scaling = None,
        }
        Ok(())
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.joints.is_valid() && self.joint_count > 0
    }

    #[inline]
    pub fn has_scaling(&self) -> bool {
        self.scaling.is_some()
    }

    // Relative space --------------------------------------------------------

    #[inline]
    pub fn relative(&self, joint: usize) -> QuatT {
        assert!(joint < self.joint_count);
        self.joints.slice::<QuatT>(F_RELATIVE)[joint]
    }

    #[inline]
    pub fn set_relative(&mut self, joint: usize, transform: QuatT) {
        assert!(joint < self.joint_count);
        self.joints.slice_mut::<QuatT>(F_RELATIVE)[joint] = transform;
    }

    #[inline]
    pub fn relative_scale(&self, joint: usize) -> f32 {
        assert!(joint < self.joint_count);
        match &self.scaling {
            Some(buf) => buf.slice::<f32>(F_SCALE_RELATIVE)[joint],
            None => 1.0,
        }
    }

    /// Write a relative scale, materializing the scaling buffer on first use.
    /// Ignored (returns false) when uniform scaling is globally disabled or
    /// the lazy allocation fails.
    pub fn set_relative_scale(&mut self, joint: usize, scale: f32) -> bool {
        assert!(joint < self.joint_count);
        if !self.scaling_enabled || !self.ensure_scaling() {
            return false;
        }
        let buf = self.scaling.as_mut().expect("ensured above");
        buf.slice_mut::<f32>(F_SCALE_RELATIVE)[joint] = scale;
        true
    }

    // Absolute space --------------------------------------------------------

    #[inline]
    pub fn absolute(&self, joint: usize) -> QuatT {
        assert!(joint < self.joint_count);
        self.joints.slice::<QuatT>(F_ABSOLUTE)[joint]
    }

    #[inline]
    pub fn set_absolute(&mut self, joint: usize, transform: QuatT) {
        assert!(joint < self.joint_count);
        self.joints.slice_mut::<QuatT>(F_ABSOLUTE)[joint] = transform;
    }

    #[inline]
    pub fn absolute_scale(&self, joint: usize) -> f32 {
        assert!(joint < self.joint_count);
        match &self.scaling {
            Some(buf) => buf.slice::<f32>(F_SCALE_ABSOLUTE)[joint],
            None => 1.0,
        }
    }

    // Status ----------------------------------------------------------------

    #[inline]
    pub fn status(&self, joint: usize) -> u32 {
        assert!(joint < self.joint_count);
        self.joints.slice::<u32>(F_STATUS)[joint]
    }

    #[inline]
    pub fn set_status_bits(&mut self, joint: usize, bits: u32) {
        assert!(joint < self.joint_count);
        self.joints.slice_mut::<u32>(F_STATUS)[joint] |= bits;
    }

    #[inline]
    pub fn clear_status(&mut self) {
        for s in self.joints.slice_mut::<u32>(F_STATUS) {
            *s = 0;
        }
    }

    // Hierarchy -------------------------------------------------------------

    /// One forward pass over topologically ordered joints: roots copy their
    /// relative transform, children compose the parent's already-computed
    /// absolute transform with their own relative one. Orientations are
    /// renormalized. With `single_root` the per-joint root check is skipped
    /// for every joint except 0.
    pub fn compute_absolute_pose(&mut self, skeleton: &Skeleton, single_root: bool) {
        assert_eq!(self.joint_count, skeleton.joint_count());
        if self.joint_count == 0 {
            return;
        }
        if single_root {
            debug_assert!(skeleton.is_single_root());
            self.promote_root(0);
            for joint in 1..self.joint_count {
                let parent = skeleton.parent(joint).unwrap_or(0);
                self.compose_joint(joint, parent);
            }
        } else {
            for joint in 0..self.joint_count {
                match skeleton.parent(joint) {
                    None => self.promote_root(joint),
                    Some(parent) => self.compose_joint(joint, parent),
                }
            }
        }
    }

    fn promote_root(&mut self, joint: usize) {
        let relative = self.relative(joint).normalized();
        self.set_absolute(joint, relative);
        self.set_absolute_scale_raw(joint, self.relative_scale(joint));
        self.set_status_bits(joint, joint_status::ABSOLUTE_VALID);
    }

    fn compose_joint(&mut self, joint: usize, parent: usize) {
        debug_assert!(parent < joint, "joints must be parent-before-child");
        let parent_abs = self.absolute(parent);
        let parent_scale = self.absolute_scale(parent);
        let relative = self.relative(joint);
        let absolute = parent_abs.multiply_scaled(&relative, parent_scale).normalized();
        self.set_absolute(joint, absolute);
        self.set_absolute_scale_raw(joint, parent_scale * self.relative_scale(joint));
        self.set_status_bits(joint, joint_status::ABSOLUTE_VALID);
    }

    /// Inverse of `compute_absolute_pose`: recover each joint's relative
    /// transform from its own and its parent's absolute transforms.
    pub fn compute_relative_pose(&mut self, skeleton: &Skeleton) {
        assert_eq!(self.joint_count, skeleton.joint_count());
        for joint in 0..self.joint_count {
            match skeleton.parent(joint) {
                None => {
                    let absolute = self.absolute(joint);
                    self.set_relative(joint, absolute);
                    if self.has_scaling() {
                        let s = self.absolute_scale(joint);
                        self.set_relative_scale(joint, s);
                    }
                }
                Some(parent) => {
                    let parent_abs = self.absolute(parent);
                    let parent_scale = self.absolute_scale(parent);
                    let own = self.absolute(joint);
                    let mut relative = parent_abs.inverse().multiply(&own).normalized();
                    if parent_scale.abs() > f32::EPSILON {
                        let inv = parent_scale.recip();
                        relative.pos = [
                            relative.pos[0] * inv,
                            relative.pos[1] * inv,
                            relative.pos[2] * inv,
                        ];
                    }
                    self.set_relative(joint, relative);
                    if self.has_scaling() {
                        let s = if parent_scale.abs() > f32::EPSILON {
                            self.absolute_scale(joint) / parent_scale
                        } else {
                            1.0
                        };
                        self.set_relative_scale(joint, s);
                    }
                }
            }
        }
    }

    /// Debug-only corruption check: independently accumulates a checksum over
    /// every component and a bounding volume over absolute positions, and
    /// asserts everything is finite. Compiled out in release builds.
    #[cfg(debug_assertions)]
    pub fn validate(&self, skeleton: &Skeleton) {
        assert_eq!(self.joint_count, skeleton.joint_count());
        let mut checksum = 0.0f64;
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        for joint in 0..self.joint_count {
            let rel = self.relative(joint);
            let abs = self.absolute(joint);
            debug_assert!(rel.is_finite(), "relative transform {joint} not finite");
            debug_assert!(abs.is_finite(), "absolute transform {joint} not finite");
            for c in rel.rot.iter().chain(rel.pos.iter()) {
                checksum += *c as f64;
            }
            for c in abs.rot.iter().chain(abs.pos.iter()) {
                checksum += *c as f64;
            }
            for axis in 0..3 {
                lo[axis] = lo[axis].min(abs.pos[axis]);
                hi[axis] = hi[axis].max(abs.pos[axis]);
            }
        }
        debug_assert!(checksum.is_finite());
        log::trace!("pose validate: checksum={checksum} bounds={lo:?}..{hi:?}");
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    pub fn validate(&self, _skeleton: &Skeleton) {}

    // Internals -------------------------------------------------------------

    fn set_absolute_scale_raw(&mut self, joint: usize, scale: f32) {
        if let Some(buf) = self.scaling.as_mut() {
            buf.slice_mut::<f32>(F_SCALE_ABSOLUTE)[joint] = scale;
        }
    }

    /// Materialize the scaling buffer filled with 1.0. False if the
    /// allocation fails.
    fn ensure_scaling(&mut self) -> bool {
        if self.scaling.is_some() {
            return true;
        }
        let mut buf: FieldBuffer<2> = FieldBuffer::new(self.allocator.clone());
        buf.resize::<f32>(F_SCALE_RELATIVE, self.joint_count);
        buf.resize::<f32>(F_SCALE_ABSOLUTE, self.joint_count);
        if !buf.lock() {
            return false;
        }
        for s in buf.slice_mut::<f32>(F_SCALE_RELATIVE) {
            *s = 1.0;
        }
        for s in buf.slice_mut::<f32>(F_SCALE_ABSOLUTE) {
            *s = 1.0;
        }
        self.scaling = Some(buf);
        true
    }
}
