//! Recoverable error surface for constructive APIs.
//!
//! Phase transitions never return these: allocation failures inside a frame
//! are absorbed into `ProcState::Failure`, and logic errors (command buffer
//! overflow, wrong-state phase invocation, double job begin) are fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("skeleton joint {joint} has parent {parent}, parents must precede children")]
    SkeletonOrder { joint: usize, parent: usize },

    #[error("pose buffer allocation failed for {joint_count} joints")]
    PoseAllocation { joint_count: usize },

    #[error("joint count mismatch: pose has {pose}, expected {expected}")]
    JointCountMismatch { pose: usize, expected: usize },
}
