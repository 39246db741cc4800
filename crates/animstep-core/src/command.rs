//! Deferred pose-modifier command buffer.
//!
//! Commands are recorded during the Start phase as a one-byte type tag plus a
//! fixed-size little-endian payload in a pool-backed byte log, then executed
//! in insertion order during the Execute phase. Capacity overflow is a
//! logic/configuration error and aborts; it is never absorbed as Failure.

use std::sync::Arc;

use crate::instance::ClipSampler;
use crate::memory::{Allocation, AllocatorHandle};
use crate::pose::{joint_status, PoseData};
use crate::skeleton::Skeleton;
use crate::transform::{nlerp_quat, QuatT};

/// Sorted allow-list of joint-name hashes. Commands consult it so partial and
/// LOD updates touch only the active joint subset.
#[derive(Clone, Debug, Default)]
pub struct JointMask {
    hashes: Vec<u32>,
}

impl JointMask {
    pub fn new(mut hashes: Vec<u32>) -> Self {
        hashes.sort_unstable();
        hashes.dedup();
        Self { hashes }
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            names
                .into_iter()
                .map(crate::skeleton::crc32_lowercase)
                .collect(),
        )
    }

    /// Mask of joints participating at detail level `lod`. `None` when every
    /// joint participates, keeping the common full-detail path unmasked.
    pub fn for_lod(skeleton: &Skeleton, lod: u32) -> Option<Self> {
        if skeleton.joints().iter().all(|j| j.max_lod >= lod) {
            return None;
        }
        Some(Self::new(
            skeleton
                .joints()
                .iter()
                .filter(|j| j.max_lod >= lod)
                .map(|j| j.name_hash)
                .collect(),
        ))
    }

    #[inline]
    pub fn contains(&self, name_hash: u32) -> bool {
        self.hashes.binary_search(&name_hash).is_ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Invocation-context snapshot captured when the buffer is created.
#[derive(Clone)]
pub struct ExecContext {
    pub skeleton: Arc<Skeleton>,
    pub placement: QuatT,
    pub joint_mask: Option<JointMask>,
    pub lod: u32,
    pub dt: f32,
    /// Pose used by `ClearPose` instead of the skeleton default, when set.
    pub fallback: Option<Arc<PoseData>>,
}

impl ExecContext {
    #[inline]
    fn allows(&self, joint: usize) -> bool {
        match &self.joint_mask {
            Some(mask) => mask.contains(self.skeleton.joints()[joint].name_hash),
            None => true,
        }
    }
}

const TAG_CLEAR_POSE: u8 = 0;
const TAG_SAMPLE_ADD_CLIP: u8 = 1;
const TAG_ADD_JOINT_DELTA: u8 = 2;
const TAG_SCALE_UNIFORM: u8 = 3;
const TAG_NORMALIZE: u8 = 4;
const TAG_COMPUTE_ABSOLUTE: u8 = 5;

/// A deferred pose operation. Payloads are fixed-size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Reset (masked) relative transforms to the fallback or bind pose.
    ClearPose,
    /// Blend one clip layer's sampled transforms into the relative pose.
    SampleAddClip { layer: u8, clip_time: f32, weight: f32 },
    /// Compose an additive delta onto one joint's relative transform.
    AddJointDelta { joint: u16, delta: QuatT },
    /// Multiply (masked) relative uniform scales.
    ScaleUniform { scale: f32 },
    /// Renormalize (masked) relative orientations.
    NormalizeOrientations,
    /// Run the hierarchical relative-to-absolute pass.
    ComputeAbsolute,
}

impl Command {
    fn tag(&self) -> u8 {
        match self {
            Command::ClearPose => TAG_CLEAR_POSE,
            Command::SampleAddClip { .. } => TAG_SAMPLE_ADD_CLIP,
            Command::AddJointDelta { .. } => TAG_ADD_JOINT_DELTA,
            Command::ScaleUniform { .. } => TAG_SCALE_UNIFORM,
            Command::NormalizeOrientations => TAG_NORMALIZE,
            Command::ComputeAbsolute => TAG_COMPUTE_ABSOLUTE,
        }
    }

    fn payload_size(tag: u8) -> usize {
        match tag {
            TAG_CLEAR_POSE | TAG_NORMALIZE | TAG_COMPUTE_ABSOLUTE => 0,
            TAG_SAMPLE_ADD_CLIP => 1 + 4 + 4,
            TAG_ADD_JOINT_DELTA => 2 + 7 * 4,
            TAG_SCALE_UNIFORM => 4,
            _ => unreachable!("unknown command tag {tag}"),
        }
    }

    /// Encoded size including the leading tag byte.
    pub fn encoded_size(&self) -> usize {
        1 + Self::payload_size(self.tag())
    }

    fn encode_payload(&self, out: &mut [u8]) {
        match *self {
            Command::ClearPose | Command::NormalizeOrientations | Command::ComputeAbsolute => {}
            Command::SampleAddClip {
                layer,
                clip_time,
                weight,
            } => {
                out[0] = layer;
                out[1..5].copy_from_slice(&clip_time.to_le_bytes());
                out[5..9].copy_from_slice(&weight.to_le_bytes());
            }
            Command::AddJointDelta { joint, delta } => {
                out[0..2].copy_from_slice(&joint.to_le_bytes());
                let mut cursor = 2;
                for c in delta.rot.iter().chain(delta.pos.iter()) {
                    out[cursor..cursor + 4].copy_from_slice(&c.to_le_bytes());
                    cursor += 4;
                }
            }
            Command::ScaleUniform { scale } => {
                out[0..4].copy_from_slice(&scale.to_le_bytes());
            }
        }
    }

    fn decode(tag: u8, payload: &[u8]) -> Command {
        fn f32_at(bytes: &[u8], at: usize) -> f32 {
            f32::from_le_bytes(bytes[at..at + 4].try_into().expect("4 bytes"))
        }
        match tag {
            TAG_CLEAR_POSE => Command::ClearPose,
            TAG_NORMALIZE => Command::NormalizeOrientations,
            TAG_COMPUTE_ABSOLUTE => Command::ComputeAbsolute,
            TAG_SAMPLE_ADD_CLIP => Command::SampleAddClip {
                layer: payload[0],
                clip_time: f32_at(payload, 1),
                weight: f32_at(payload, 5),
            },
            TAG_ADD_JOINT_DELTA => {
                let joint = u16::from_le_bytes(payload[0..2].try_into().expect("2 bytes"));
                let mut components = [0.0f32; 7];
                for (i, slot) in components.iter_mut().enumerate() {
                    *slot = f32_at(payload, 2 + i * 4);
                }
                Command::AddJointDelta {
                    joint,
                    delta: QuatT::new(
                        [components[0], components[1], components[2], components[3]],
                        [components[4], components[5], components[6]],
                    ),
                }
            }
            TAG_SCALE_UNIFORM => Command::ScaleUniform {
                scale: f32_at(payload, 0),
            },
            _ => unreachable!("unknown command tag {tag}"),
        }
    }
}

/// Fixed-capacity byte log of deferred commands plus the invocation snapshot.
pub struct CommandBuffer {
    storage: Allocation,
    allocator: AllocatorHandle,
    cursor: usize,
    count: usize,
    ctx: ExecContext,
}

impl CommandBuffer {
    /// Allocate the log (typically from the frame pool). `None` when the
    /// allocator is exhausted; callers surface that as `Failure`.
    pub fn new(allocator: &AllocatorHandle, capacity: usize, ctx: ExecContext) -> Option<Self> {
        let storage = allocator.allocate(capacity)?;
        Some(Self {
            storage,
            allocator: allocator.clone(),
            cursor: 0,
            count: 0,
            ctx,
        })
    }

    #[inline]
    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.storage.len() - self.cursor
    }

    /// Record a command: tag byte, then the fixed payload. Overflow aborts.
    pub fn push(&mut self, command: Command) {
        let need = command.encoded_size();
        assert!(
            self.cursor + need <= self.storage.len(),
            "command buffer overflow: {} bytes needed, {} remaining",
            need,
            self.remaining()
        );
        let bytes = self.storage.as_mut_slice();
        bytes[self.cursor] = command.tag();
        command.encode_payload(&mut bytes[self.cursor + 1..self.cursor + need]);
        self.cursor += need;
        self.count += 1;
    }

    /// Decode and dispatch every recorded command in insertion order.
    pub fn execute(&self, pose: &mut PoseData, sampler: &dyn ClipSampler) {
        let bytes = &self.storage.as_slice()[..self.cursor];
        let mut at = 0;
        let mut executed = 0;
        while at < bytes.len() {
            let tag = bytes[at];
            let size = Command::payload_size(tag);
            let command = Command::decode(tag, &bytes[at + 1..at + 1 + size]);
            self.dispatch(command, pose, sampler);
            at += 1 + size;
            executed += 1;
        }
        debug_assert_eq!(executed, self.count);
    }

    fn dispatch(&self, command: Command, pose: &mut PoseData, sampler: &dyn ClipSampler) {
        let skeleton = &self.ctx.skeleton;
        match command {
            Command::ClearPose => {
                for joint in 0..pose.joint_count() {
                    if !self.ctx.allows(joint) {
                        continue;
                    }
                    let rest = match &self.ctx.fallback {
                        Some(fallback) => fallback.relative(joint),
                        None => skeleton.joints()[joint].default_relative,
                    };
                    pose.set_relative(joint, rest);
                }
            }
            Command::SampleAddClip {
                layer,
                clip_time,
                weight,
            } => {
                for joint in 0..pose.joint_count() {
                    if !self.ctx.allows(joint) {
                        continue;
                    }
                    if let Some(sampled) = sampler.sample_joint(layer, clip_time, joint) {
                        let current = pose.relative(joint);
                        pose.set_relative(
                            joint,
                            QuatT {
                                rot: nlerp_quat(current.rot, sampled.rot, weight),
                                pos: [
                                    current.pos[0] + (sampled.pos[0] - current.pos[0]) * weight,
                                    current.pos[1] + (sampled.pos[1] - current.pos[1]) * weight,
                                    current.pos[2] + (sampled.pos[2] - current.pos[2]) * weight,
                                ],
                            },
                        );
                        pose.set_status_bits(joint, joint_status::SAMPLED);
                    }
                }
            }
            Command::AddJointDelta { joint, delta } => {
                let joint = joint as usize;
                if joint < pose.joint_count() && self.ctx.allows(joint) {
                    let composed = pose.relative(joint).multiply(&delta).normalized();
                    pose.set_relative(joint, composed);
                }
            }
            Command::ScaleUniform { scale } => {
                for joint in 0..pose.joint_count() {
                    if self.ctx.allows(joint) {
                        let current = pose.relative_scale(joint);
                        pose.set_relative_scale(joint, current * scale);
                    }
                }
            }
            Command::NormalizeOrientations => {
                for joint in 0..pose.joint_count() {
                    if self.ctx.allows(joint) {
                        let normalized = pose.relative(joint).normalized();
                        pose.set_relative(joint, normalized);
                    }
                }
            }
            Command::ComputeAbsolute => {
                pose.compute_absolute_pose(skeleton, skeleton.is_single_root());
            }
        }
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        // Hand the log back so pool bookkeeping stays balanced; heap
        // allocators reclaim immediately.
        let storage = std::mem::replace(&mut self.storage, unsafe {
            Allocation::from_raw(std::ptr::NonNull::dangling(), 0)
        });
        self.allocator.free(storage);
    }
}
