//! Core configuration for animstep-core.

use serde::{Deserialize, Serialize};

/// Sizing and feature flags for the pipeline.
/// All capacities are fixed for the lifetime of a `Pipeline`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of contexts appended per frame.
    pub queue_capacity: usize,

    /// Bytes per frame-pool bucket. Requests larger than this fail.
    pub pool_bucket_size: usize,

    /// Byte capacity of each context's command buffer.
    pub command_capacity: usize,

    /// When true, poses carry relative/absolute uniform-scale arrays.
    pub uniform_scaling: bool,

    /// Seconds an instance must hold a stable pose before its frame work is
    /// culled entirely.
    pub quasi_static_sleep: f32,

    /// Span of the stand-up heuristic timer advanced on the lightweight
    /// finish path, so re-entering view does not snap the pose.
    pub stand_up_span: f32,

    /// LOD assigned to instances that do not specify one.
    pub default_lod: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            pool_bucket_size: 512 * 1024,
            command_capacity: 4096,
            uniform_scaling: false,
            quasi_static_sleep: 0.5,
            stand_up_span: 0.3,
            default_lod: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should round-trip through JSON so hosts can ship configs as data
    #[test]
    fn json_roundtrip() {
        let cfg = Config {
            queue_capacity: 32,
            uniform_scaling: true,
            ..Config::default()
        };
        let text = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(back.queue_capacity, 32);
        assert!(back.uniform_scaling);
        assert_eq!(back.command_capacity, cfg.command_capacity);
    }
}
