use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use animstep_core::{
    command::{Command, CommandBuffer, ExecContext, JointMask},
    instance::ClipSampler,
    memory::HeapAllocator,
    pose::PoseData,
    skeleton::{crc32_lowercase, JointInfo, Skeleton},
    transform::QuatT,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

struct NullSampler;
impl ClipSampler for NullSampler {
    fn sample_joint(&self, _layer: u8, _clip_time: f32, _joint: usize) -> Option<QuatT> {
        None
    }
}

/// Sampler that drives every joint to a fixed offset.
struct OffsetSampler(QuatT);
impl ClipSampler for OffsetSampler {
    fn sample_joint(&self, _layer: u8, _clip_time: f32, _joint: usize) -> Option<QuatT> {
        Some(self.0)
    }
}

fn skeleton() -> Arc<Skeleton> {
    Arc::new(
        Skeleton::new(vec![
            JointInfo::new("root", None),
            JointInfo::new("spine", Some(0)),
        ])
        .unwrap(),
    )
}

fn ctx(skeleton: Arc<Skeleton>, mask: Option<JointMask>) -> ExecContext {
    ExecContext {
        skeleton,
        placement: QuatT::IDENTITY,
        joint_mask: mask,
        lod: 0,
        dt: 1.0 / 30.0,
        fallback: None,
    }
}

fn pose(skeleton: &Skeleton) -> PoseData {
    let mut p = PoseData::new(HeapAllocator::handle(), true);
    p.initialize_from_skeleton(skeleton).unwrap();
    p
}

/// it should execute recorded commands in insertion order
#[test]
fn execution_order_is_insertion_order() {
    let skel = skeleton();
    let mut pose = pose(&skel);
    let mut buf =
        CommandBuffer::new(&HeapAllocator::handle(), 256, ctx(skel.clone(), None)).unwrap();

    // translate, rotate 90 deg around Z, translate again: the second
    // translation lands rotated, so order is observable.
    let translate = Command::AddJointDelta {
        joint: 0,
        delta: QuatT::new([0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
    };
    let s = (FRAC_PI_2 * 0.5).sin();
    let rotate = Command::AddJointDelta {
        joint: 0,
        delta: QuatT::new([0.0, 0.0, s, (FRAC_PI_2 * 0.5).cos()], [0.0, 0.0, 0.0]),
    };
    buf.push(translate);
    buf.push(rotate);
    buf.push(translate);
    assert_eq!(buf.count(), 3);

    buf.execute(&mut pose, &NullSampler);
    let root = pose.relative(0);
    approx(root.pos[0], 1.0, 1e-5);
    approx(root.pos[1], 1.0, 1e-5);
    approx(root.pos[2], 0.0, 1e-5);
}

/// it should fill the buffer to exactly full capacity without fault
#[test]
fn fill_to_exact_capacity() {
    let skel = skeleton();
    // ClearPose encodes to a single tag byte.
    let mut buf = CommandBuffer::new(&HeapAllocator::handle(), 16, ctx(skel, None)).unwrap();
    for _ in 0..16 {
        buf.push(Command::ClearPose);
    }
    assert_eq!(buf.count(), 16);
    assert_eq!(buf.remaining(), 0);
}

/// it should abort on the first command past capacity
#[test]
#[should_panic(expected = "command buffer overflow")]
fn overflow_is_fatal() {
    let skel = skeleton();
    let mut buf = CommandBuffer::new(&HeapAllocator::handle(), 16, ctx(skel, None)).unwrap();
    for _ in 0..17 {
        buf.push(Command::ClearPose);
    }
}

/// it should restrict masked commands to the allow-listed joints
#[test]
fn joint_mask_restricts_commands() {
    let skel = skeleton();
    let mut pose = pose(&skel);
    let moved = QuatT::new([0.0, 0.0, 0.0, 1.0], [5.0, 0.0, 0.0]);
    pose.set_relative(0, moved);
    pose.set_relative(1, moved);

    let mask = JointMask::from_names(["root"]);
    assert!(mask.contains(crc32_lowercase("ROOT")));
    assert!(!mask.contains(crc32_lowercase("spine")));

    let mut buf =
        CommandBuffer::new(&HeapAllocator::handle(), 64, ctx(skel.clone(), Some(mask))).unwrap();
    buf.push(Command::ClearPose);
    buf.execute(&mut pose, &NullSampler);

    // Only the root was reset to the bind pose.
    assert_eq!(pose.relative(0), QuatT::IDENTITY);
    assert_eq!(pose.relative(1), moved);
}

/// it should derive joint masks from the skeleton's LOD caps
#[test]
fn lod_mask_derivation() {
    let skel = Skeleton::new(vec![
        JointInfo::new("root", None),
        JointInfo::new("fingers", Some(0)).lod_capped(0),
    ])
    .unwrap();

    // Full detail animates everything; no mask is materialized.
    assert!(JointMask::for_lod(&skel, 0).is_none());

    let mask = JointMask::for_lod(&skel, 1).expect("capped joint forces a mask");
    assert!(mask.contains(crc32_lowercase("root")));
    assert!(!mask.contains(crc32_lowercase("fingers")));
}

/// it should blend sampled clip transforms by weight and mark joints sampled
#[test]
fn sample_add_blends_by_weight() {
    let skel = skeleton();
    let mut pose = pose(&skel);
    let sampler = OffsetSampler(QuatT::new([0.0, 0.0, 0.0, 1.0], [2.0, 0.0, 0.0]));

    let mut buf =
        CommandBuffer::new(&HeapAllocator::handle(), 64, ctx(skel.clone(), None)).unwrap();
    buf.push(Command::SampleAddClip {
        layer: 0,
        clip_time: 0.0,
        weight: 0.5,
    });
    buf.execute(&mut pose, &sampler);

    approx(pose.relative(0).pos[0], 1.0, 1e-5);
    assert_ne!(
        pose.status(0) & animstep_core::joint_status::SAMPLED,
        0,
        "sampled joints carry the status bit"
    );
}

/// it should apply ScaleUniform to relative scales and ComputeAbsolute end-to-end
#[test]
fn scale_and_absolute_dispatch() {
    let skel = skeleton();
    let mut pose = pose(&skel);
    pose.set_relative(1, QuatT::new([0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0]));

    let mut buf =
        CommandBuffer::new(&HeapAllocator::handle(), 64, ctx(skel.clone(), None)).unwrap();
    buf.push(Command::ScaleUniform { scale: 2.0 });
    buf.push(Command::ComputeAbsolute);
    buf.execute(&mut pose, &NullSampler);

    approx(pose.relative_scale(0), 2.0, 1e-6);
    // Root scale doubles the child's translation.
    approx(pose.absolute(1).pos[0], 2.0, 1e-5);
}

/// it should round-trip every payload variant through the byte log
#[test]
fn payload_encoding_roundtrip() {
    let skel = skeleton();
    let mut pose = pose(&skel);
    let mut buf =
        CommandBuffer::new(&HeapAllocator::handle(), 128, ctx(skel.clone(), None)).unwrap();

    let delta = QuatT::new([0.1, 0.2, 0.3, 0.9], [4.0, 5.0, 6.0]);
    buf.push(Command::AddJointDelta { joint: 1, delta });
    buf.push(Command::NormalizeOrientations);
    buf.execute(&mut pose, &NullSampler);

    // The delta landed on joint 1 (normalized), proving the payload decoded.
    let got = pose.relative(1);
    approx(got.pos[0], 4.0, 1e-5);
    approx(got.pos[2], 6.0, 1e-5);
    let norm = got.rot.iter().map(|c| c * c).sum::<f32>().sqrt();
    approx(norm, 1.0, 1e-5);
}
