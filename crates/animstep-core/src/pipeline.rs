//! Top-level pipeline object: owns the frame pool and the context queue.
//!
//! Explicit construction and teardown; consumers receive handles instead of
//! reaching through global state.

use std::sync::Arc;

use crate::config::Config;
use crate::context::ContextQueue;
use crate::memory::FramePool;

pub struct Pipeline {
    cfg: Config,
    pool: Arc<FramePool>,
    queue: Arc<ContextQueue>,
}

impl Pipeline {
    pub fn new(cfg: Config) -> Self {
        let pool = Arc::new(FramePool::new(cfg.pool_bucket_size));
        let queue = Arc::new(ContextQueue::new(cfg.clone(), pool.clone()));
        Self { cfg, pool, queue }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    #[inline]
    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    #[inline]
    pub fn queue(&self) -> &Arc<ContextQueue> {
        &self.queue
    }

    /// Start a new simulation frame: recycle last frame's contexts (all must
    /// be Finished), rewind the pool, and record the frame's time delta.
    pub fn begin_frame(&self, dt: f32) {
        self.queue.clear_contexts();
        self.pool.reset();
        self.queue.set_frame_dt(dt);
    }
}
