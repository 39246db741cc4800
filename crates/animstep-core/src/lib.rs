#![allow(dead_code)]
//! animstep-core: per-frame character animation processing (engine-agnostic).
//!
//! Once per simulation frame, every active character instance is appended to
//! a bounded context queue and driven through a three-phase state machine
//! (Start, Execute, Finish). Scratch memory comes from a frame-local pooled
//! allocator; this tick's pose operations are recorded into a fixed-capacity
//! command buffer and executed (possibly on another worker) before results
//! propagate through parent->child attachment chains.
//!
//! Scheduling, clip storage, and the attachment subsystem stay external; this
//! crate consumes them through narrow trait seams.

pub mod buffer;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod instance;
pub mod job;
pub mod memory;
pub mod phases;
pub mod pipeline;
pub mod pose;
pub mod skeleton;
pub mod transform;

// Re-exports for consumers (orchestrators/adapters)
pub use buffer::{FieldBuffer, FieldElem};
pub use command::{Command, CommandBuffer, ExecContext, JointMask};
pub use config::Config;
pub use context::{ContextQueue, Phase, ProcState, ProcessingContext};
pub use error::PipelineError;
pub use ids::{InstanceId, SocketIndex};
pub use instance::{
    ActiveLayer, AttachmentMap, CharacterInstance, ClipQueue, ClipSampler, InstanceKind,
    ModifierBuffers,
};
pub use job::{Job, JobCompletion, JobHandle, JobScheduler};
pub use memory::{
    Allocation, Allocator, AllocatorHandle, FramePool, HeapAllocator, PoolAllocator,
};
pub use pipeline::Pipeline;
pub use pose::{joint_status, PoseData};
pub use skeleton::{crc32_lowercase, JointInfo, Skeleton};
pub use transform::{nlerp_quat, QuatT};
