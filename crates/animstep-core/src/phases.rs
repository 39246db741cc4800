//! The three state-transition functions applied to a processing context.
//!
//! Each phase returns the next state rather than raising an error. Allocation
//! failures surface as `ProcState::Failure`, which Finish handles via the
//! lightweight path so one character's failure cannot abort the batch.
//! Invoking Start from any state but Unstarted is fatal.

use crate::command::{Command, CommandBuffer, ExecContext, JointMask};
use crate::context::{ContextQueue, ProcState, ProcessingContext};
use crate::instance::InstanceKind;
use crate::memory::PoolAllocator;
use crate::pose::PoseData;

/// Unstarted -> StartProcessed | JobSkipped | JobCulled | Failure.
pub fn start_animation_processing(
    queue: &ContextQueue,
    context: &mut ProcessingContext,
) -> ProcState {
    assert_eq!(
        context.state,
        ProcState::Unstarted,
        "Start invoked from {:?}",
        context.state
    );
    let dt = queue.frame_dt();
    let cfg = queue.config();
    let mut instance = context.instance.lock();

    // Parent-relative setup: seed this instance's placement from the parent,
    // which the ordering contract guarantees has already started.
    if let Some(parent_slot) = context.parent_slot {
        let parent = queue.instance_of(parent_slot);
        let parent_placement = parent.lock().placement;
        instance.placement = parent_placement;
    }

    if instance.advance_quasi_static(dt, cfg.quasi_static_sleep) {
        return ProcState::JobCulled;
    }

    let was_playing = instance.clips.is_playing();
    let placement = instance.placement;
    let still_playing = instance.clips.advance(dt, &placement);

    // Pool-backed scratch: the write pose and command log live until Finish.
    let pool_alloc = PoolAllocator::handle(queue.pool().clone());
    let mut write_pose = PoseData::new(pool_alloc.clone(), cfg.uniform_scaling);
    if write_pose.initialize_from_pose(&instance.pose).is_err() {
        log::warn!(
            "instance {:?}: pose write-buffer allocation failed",
            instance.id
        );
        return ProcState::Failure;
    }

    instance.modifiers.prepare();

    // Coarse detail levels animate a reduced joint set; every command this
    // tick honors the resulting mask.
    let lod = instance.lod.unwrap_or(cfg.default_lod);
    let exec_ctx = ExecContext {
        skeleton: instance.skeleton.clone(),
        placement,
        joint_mask: JointMask::for_lod(&instance.skeleton, lod),
        lod,
        dt,
        fallback: None,
    };
    let mut commands = match CommandBuffer::new(&pool_alloc, cfg.command_capacity, exec_ctx) {
        Some(buffer) => buffer,
        None => {
            log::warn!(
                "instance {:?}: command buffer allocation failed",
                instance.id
            );
            return ProcState::Failure;
        }
    };

    for layer in instance.clips.active_layers() {
        commands.push(Command::SampleAddClip {
            layer: layer.layer,
            clip_time: layer.clip_time,
            weight: layer.weight,
        });
    }
    for modifier in instance.modifiers.active().iter().copied() {
        commands.push(modifier);
    }
    for modifier in instance.modifiers.one_shot().iter().copied() {
        commands.push(modifier);
    }
    commands.push(Command::NormalizeOrientations);
    commands.push(Command::ComputeAbsolute);

    instance.snapshot_physics_placement();
    if was_playing && !still_playing && instance.kind == InstanceKind::Prop {
        instance.request_post_sync();
    }

    context.write_pose = Some(write_pose);
    context.commands = Some(commands);

    if instance.needs_full_update() {
        ProcState::StartProcessed
    } else {
        ProcState::JobSkipped
    }
}

/// StartProcessed -> JobExecuted | Failure.
pub fn execute_job(_queue: &ContextQueue, context: &mut ProcessingContext) -> ProcState {
    if context.state != ProcState::StartProcessed
        || context.write_pose.is_none()
        || context.commands.is_none()
    {
        log::warn!(
            "execute preconditions not met at slot {} (state {:?})",
            context.slot,
            context.state
        );
        return ProcState::Failure;
    }

    let mut instance = context.instance.lock();
    let commands = context.commands.take().expect("checked above");
    let mut write_pose = context.write_pose.take().expect("checked above");

    commands.execute(&mut write_pose, &*instance.sampler);
    write_pose.validate(&instance.skeleton);

    // Dependent sockets follow the freshly computed pose.
    let placement = instance.placement;
    instance.attachments.refresh(&write_pose, &placement);

    context.write_pose = Some(write_pose);
    ProcState::JobExecuted
}

/// Any terminal-ish state -> Finished. Idempotent once Finished.
pub fn finish_animation_computations(
    queue: &ContextQueue,
    context: &mut ProcessingContext,
) -> ProcState {
    if context.state == ProcState::Finished {
        return ProcState::Finished;
    }
    let dt = queue.frame_dt();
    let cfg = queue.config();
    let mut instance = context.instance.lock();

    // Child placement follows the parent's attachment world transform; the
    // ordering contract guarantees the parent has already finished.
    if let (Some(parent_slot), Some(hash)) = (context.parent_slot, context.attachment_hash) {
        debug_assert_eq!(
            queue.state_of(parent_slot),
            ProcState::Finished,
            "parent must finish before its child"
        );
        let parent = queue.instance_of(parent_slot);
        let parent_instance = parent.lock();
        if let Some(socket) = parent_instance.attachments.resolve(hash) {
            instance.placement = parent_instance.attachments.world_transform(socket);
        }
    }

    match context.state {
        ProcState::JobExecuted | ProcState::JobSkipped => {
            if let Some(write_pose) = context.write_pose.take() {
                if instance.pose.copy_from(&write_pose).is_err() {
                    // Joint count changed under us; keep the previous pose.
                    log::warn!("instance {:?}: buffered pose sync rejected", instance.id);
                }
            }
            let skeleton = instance.skeleton.clone();
            instance.pose.validate(&skeleton);
            instance.clips.prune_finished_transitions();

            if context.state == ProcState::JobExecuted {
                instance.update_pose_overlays(dt);
                instance.modifiers.release_one_shot();
                instance.refresh_attachments();
            }
        }
        // Lightweight/offscreen path, including Failure and JobCulled.
        _ => {
            instance.advance_stand_up(dt, cfg.stand_up_span);
            instance.refresh_attachments();
            instance.modifiers.swap_and_clear();
        }
    }

    context.write_pose = None;
    context.commands = None;
    instance.clear_context_slot();
    ProcState::Finished
}
