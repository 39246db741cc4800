//! Skeleton description referenced by poses and commands.
//!
//! Joints are stored so every joint's parent index precedes its own, which is
//! what lets pose composition run as a single forward pass.

use crate::error::PipelineError;
use crate::transform::QuatT;

/// CRC-32 (IEEE) over the ASCII-lowercased name. Joint and attachment names
/// are matched case-insensitively by this hash.
pub fn crc32_lowercase(name: &str) -> u32 {
    let mut crc: u32 = !0;
    for byte in name.bytes() {
        crc ^= byte.to_ascii_lowercase() as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[derive(Clone, Debug)]
pub struct JointInfo {
    pub name: String,
    pub name_hash: u32,
    pub parent: Option<u16>,
    pub default_relative: QuatT,
    /// Highest detail level this joint still participates in. Joints default
    /// to participating at every level; detail joints (fingers, face rig) get
    /// a lower cap so coarse levels stop animating them.
    pub max_lod: u32,
}

impl JointInfo {
    pub fn new(name: &str, parent: Option<u16>) -> Self {
        Self::with_default(name, parent, QuatT::IDENTITY)
    }

    pub fn with_default(name: &str, parent: Option<u16>, default_relative: QuatT) -> Self {
        Self {
            name: name.to_string(),
            name_hash: crc32_lowercase(name),
            parent,
            default_relative,
            max_lod: u32::MAX,
        }
    }

    /// Cap participation to detail levels up to `max_lod`.
    pub fn lod_capped(mut self, max_lod: u32) -> Self {
        self.max_lod = max_lod;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    joints: Vec<JointInfo>,
}

impl Skeleton {
    /// Build a skeleton, enforcing topological parent order.
    pub fn new(joints: Vec<JointInfo>) -> Result<Self, PipelineError> {
        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent as usize >= index {
                    return Err(PipelineError::SkeletonOrder {
                        joint: index,
                        parent: parent as usize,
                    });
                }
            }
        }
        Ok(Self { joints })
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn joints(&self) -> &[JointInfo] {
        &self.joints
    }

    #[inline]
    pub fn parent(&self, joint: usize) -> Option<usize> {
        self.joints[joint].parent.map(usize::from)
    }

    pub fn joint_by_hash(&self, name_hash: u32) -> Option<usize> {
        self.joints.iter().position(|j| j.name_hash == name_hash)
    }

    pub fn joint_by_name(&self, name: &str) -> Option<usize> {
        self.joint_by_hash(crc32_lowercase(name))
    }

    /// Exactly one root, at index 0. Enables the fast absolute-pose path.
    pub fn is_single_root(&self) -> bool {
        !self.joints.is_empty()
            && self.joints[0].parent.is_none()
            && self.joints.iter().skip(1).all(|j| j.parent.is_some())
    }
}
