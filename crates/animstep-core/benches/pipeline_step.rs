use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parking_lot::Mutex;

use animstep_core::{
    config::Config,
    context::Phase,
    ids::InstanceId,
    instance::{ActiveLayer, AttachmentMap, CharacterInstance, ClipQueue, ClipSampler, InstanceKind},
    memory::HeapAllocator,
    pipeline::Pipeline,
    pose::PoseData,
    skeleton::{JointInfo, Skeleton},
    transform::QuatT,
};

struct LoopingClipQueue;

impl ClipQueue for LoopingClipQueue {
    fn advance(&mut self, _dt: f32, _placement: &QuatT) -> bool {
        true
    }
    fn is_playing(&self) -> bool {
        true
    }
    fn active_layers(&self) -> Vec<ActiveLayer> {
        vec![ActiveLayer {
            layer: 0,
            clip_time: 0.0,
            weight: 1.0,
        }]
    }
    fn prune_finished_transitions(&mut self) {}
}

struct SwingSampler;

impl ClipSampler for SwingSampler {
    fn sample_joint(&self, _layer: u8, _clip_time: f32, joint: usize) -> Option<QuatT> {
        let half = 0.01 * (joint as f32 + 1.0);
        Some(QuatT::new(
            [half.sin(), 0.0, 0.0, half.cos()],
            [0.0, 0.1, 0.0],
        ))
    }
}

struct NoSockets;

impl AttachmentMap for NoSockets {
    fn resolve(&self, _name_hash: u32) -> Option<animstep_core::ids::SocketIndex> {
        None
    }
    fn world_transform(&self, _socket: animstep_core::ids::SocketIndex) -> QuatT {
        QuatT::IDENTITY
    }
    fn refresh(&mut self, _pose: &PoseData, _placement: &QuatT) {}
}

fn chain(joints: usize) -> Arc<Skeleton> {
    let infos = (0..joints)
        .map(|i| {
            let parent = if i == 0 { None } else { Some((i - 1) as u16) };
            JointInfo::with_default(
                &format!("joint_{i}"),
                parent,
                QuatT::new([0.0, 0.0, 0.0, 1.0], [0.0, 0.25, 0.0]),
            )
        })
        .collect();
    Arc::new(Skeleton::new(infos).unwrap())
}

fn full_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_step");
    for joints in [16usize, 64, 256] {
        let pipeline = Pipeline::new(Config::default());
        let instance = CharacterInstance::new(
            InstanceId(0),
            InstanceKind::Character,
            chain(joints),
            HeapAllocator::handle(),
            false,
            Box::new(LoopingClipQueue),
            Arc::new(SwingSampler),
            Box::new(NoSockets),
        )
        .unwrap();
        let instance = Arc::new(Mutex::new(instance));

        group.bench_function(format!("frame_{joints}_joints"), |b| {
            b.iter(|| {
                pipeline.begin_frame(1.0 / 30.0);
                let queue = pipeline.queue();
                let slot = queue.append_context(instance.clone(), None, None, 0);
                queue.execute_for_context(slot, Phase::Start);
                queue.execute_for_context(slot, Phase::Execute);
                black_box(queue.execute_for_context(slot, Phase::Finish))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, full_frame);
criterion_main!(benches);
