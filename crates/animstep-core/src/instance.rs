//! Character instance state and the collaborator seams.
//!
//! The clip queue, clip sampler, and attachment subsystem are external: this
//! core only consumes the narrow operations below, the way adapters implement
//! resolver traits elsewhere in the codebase.

use std::sync::Arc;

use crate::command::Command;
use crate::ids::{InstanceId, SocketIndex};
use crate::memory::AllocatorHandle;
use crate::pose::PoseData;
use crate::skeleton::Skeleton;
use crate::transform::QuatT;

/// One active animation layer this tick, as reported by the clip queue.
#[derive(Copy, Clone, Debug)]
pub struct ActiveLayer {
    pub layer: u8,
    pub clip_time: f32,
    pub weight: f32,
}

/// Animation-clip queue collaborator. Only advancement and playback signals
/// are consumed here; clip storage and decoding live elsewhere.
pub trait ClipQueue: Send {
    /// Advance playback by `dt` at the given placement. Returns whether any
    /// clip is still playing afterwards.
    fn advance(&mut self, dt: f32, placement: &QuatT) -> bool;

    fn is_playing(&self) -> bool;

    /// Layers to sample this tick, in blend order.
    fn active_layers(&self) -> Vec<ActiveLayer>;

    /// Drop stale head entries from each layer's transition queue.
    fn prune_finished_transitions(&mut self);
}

/// Clip sampling collaborator used by `SampleAddClip` commands.
pub trait ClipSampler: Send + Sync {
    fn sample_joint(&self, layer: u8, clip_time: f32, joint: usize) -> Option<QuatT>;
}

/// Attachment/socket collaborator: lookup by name hash and world transforms.
pub trait AttachmentMap: Send {
    fn resolve(&self, name_hash: u32) -> Option<SocketIndex>;

    fn world_transform(&self, socket: SocketIndex) -> QuatT;

    /// Recompute socket transforms from a pose and placement.
    fn refresh(&mut self, pose: &PoseData, placement: &QuatT);
}

/// Kind of object the instance animates. A `Prop` whose animation just
/// stopped forces a physics post-sync.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InstanceKind {
    Character,
    Prop,
}

/// Double-buffered pose-modifier bookkeeping: gameplay stages commands, the
/// Start phase promotes them, one-shots are released after execution.
#[derive(Default)]
pub struct ModifierBuffers {
    active: Vec<Command>,
    staged: Vec<Command>,
    one_shot: Vec<Command>,
}

impl ModifierBuffers {
    /// Promote staged modifiers for this tick's command recording.
    pub fn prepare(&mut self) {
        self.active.append(&mut self.staged);
    }

    pub fn stage(&mut self, command: Command) {
        self.staged.push(command);
    }

    pub fn stage_one_shot(&mut self, command: Command) {
        self.one_shot.push(command);
    }

    pub fn active(&self) -> &[Command] {
        &self.active
    }

    pub fn one_shot(&self) -> &[Command] {
        &self.one_shot
    }

    pub fn has_pending(&self) -> bool {
        !self.active.is_empty() || !self.staged.is_empty() || !self.one_shot.is_empty()
    }

    /// Drop one-shot modifiers after they were executed.
    pub fn release_one_shot(&mut self) {
        self.one_shot.clear();
    }

    /// Retire persistent modifiers so they stop replaying on later frames.
    pub fn clear_active(&mut self) {
        self.active.clear();
    }

    /// Lightweight-path recycle: promote staged, drop everything executed.
    pub fn swap_and_clear(&mut self) {
        self.active.clear();
        self.active.append(&mut self.staged);
        self.one_shot.clear();
    }
}

/// Per-character state that outlives a frame. The per-frame processing
/// context borrows it exclusively for the duration of each phase.
pub struct CharacterInstance {
    pub id: InstanceId,
    pub kind: InstanceKind,
    pub skeleton: Arc<Skeleton>,
    /// Persistent pose, owned by the instance independent of frame contexts.
    pub pose: PoseData,
    /// Model-to-world placement.
    pub placement: QuatT,
    pub visible: bool,
    /// Detail level for this instance; `None` falls back to the pipeline's
    /// configured default.
    pub lod: Option<u32>,

    pub clips: Box<dyn ClipQueue>,
    pub sampler: Arc<dyn ClipSampler>,
    pub attachments: Box<dyn AttachmentMap>,
    pub modifiers: ModifierBuffers,

    quasi_static_time: f32,
    stand_up_time: f32,
    physics_snapshot: QuatT,
    force_post_sync: bool,
    context_slot: Option<usize>,
    overlay_phase: f32,
}

impl CharacterInstance {
    pub fn new(
        id: InstanceId,
        kind: InstanceKind,
        skeleton: Arc<Skeleton>,
        allocator: AllocatorHandle,
        scaling_enabled: bool,
        clips: Box<dyn ClipQueue>,
        sampler: Arc<dyn ClipSampler>,
        attachments: Box<dyn AttachmentMap>,
    ) -> Result<Self, crate::error::PipelineError> {
        let mut pose = PoseData::new(allocator, scaling_enabled);
        pose.initialize_from_skeleton(&skeleton)?;
        Ok(Self {
            id,
            kind,
            skeleton,
            pose,
            placement: QuatT::IDENTITY,
            visible: true,
            lod: None,
            clips,
            sampler,
            attachments,
            modifiers: ModifierBuffers::default(),
            quasi_static_time: 0.0,
            stand_up_time: 0.0,
            physics_snapshot: QuatT::IDENTITY,
            force_post_sync: false,
            context_slot: None,
            overlay_phase: 0.0,
        })
    }

    /// Advance the quasi-static sleep timer. True once the pose has been
    /// stable (nothing playing, nothing staged) for at least `threshold`
    /// seconds; the caller then culls this frame's work.
    pub fn advance_quasi_static(&mut self, dt: f32, threshold: f32) -> bool {
        if self.clips.is_playing() || self.modifiers.has_pending() {
            self.quasi_static_time = 0.0;
            return false;
        }
        self.quasi_static_time += dt;
        self.quasi_static_time >= threshold
    }

    /// Stand-up heuristic: while offscreen the timer keeps creeping toward
    /// `span`, so a culled/skipped instance re-entering view blends instead
    /// of snapping.
    pub fn advance_stand_up(&mut self, dt: f32, span: f32) {
        self.stand_up_time = (self.stand_up_time + dt).min(span);
    }

    pub fn stand_up_time(&self) -> f32 {
        self.stand_up_time
    }

    /// Snapshot the placement for physics synchronization.
    pub fn snapshot_physics_placement(&mut self) {
        self.physics_snapshot = self.placement;
    }

    pub fn physics_snapshot(&self) -> QuatT {
        self.physics_snapshot
    }

    pub fn request_post_sync(&mut self) {
        self.force_post_sync = true;
    }

    pub fn take_post_sync(&mut self) -> bool {
        std::mem::take(&mut self.force_post_sync)
    }

    /// Whether this tick needs the full Execute path (visible instances do).
    pub fn needs_full_update(&self) -> bool {
        self.visible
    }

    /// Advance time-driven pose overlays with the current placement.
    pub fn update_pose_overlays(&mut self, dt: f32) {
        self.overlay_phase += dt;
    }

    pub fn overlay_phase(&self) -> f32 {
        self.overlay_phase
    }

    pub fn refresh_attachments(&mut self) {
        self.attachments.refresh(&self.pose, &self.placement);
    }

    pub(crate) fn set_context_slot(&mut self, slot: usize) {
        self.context_slot = Some(slot);
    }

    pub(crate) fn clear_context_slot(&mut self) {
        self.context_slot = None;
    }

    pub fn context_slot(&self) -> Option<usize> {
        self.context_slot
    }
}
