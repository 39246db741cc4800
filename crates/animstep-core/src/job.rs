//! Asynchronous job wrapper over an externally supplied scheduler.
//!
//! The core's only dependency on the scheduler is submit and wait. A job's
//! Execute phase re-enters the context queue by slot, on whatever worker the
//! scheduler picked.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::context::{ContextQueue, Phase};

/// External worker-pool seam: submit one unit of work.
pub trait JobScheduler: Send + Sync {
    fn submit(&self, work: Box<dyn FnOnce() + Send + 'static>) -> JobHandle;
}

#[derive(Default)]
struct Latch {
    done: Mutex<bool>,
    cv: Condvar,
}

/// Completion handle for one submitted unit of work.
pub struct JobHandle {
    latch: Arc<Latch>,
}

/// Signaling side, held by the scheduler's worker.
pub struct JobCompletion {
    latch: Arc<Latch>,
}

impl JobHandle {
    pub fn pair() -> (JobHandle, JobCompletion) {
        let latch = Arc::new(Latch::default());
        (
            JobHandle {
                latch: latch.clone(),
            },
            JobCompletion { latch },
        )
    }

    /// Block until the unit of work completes.
    pub fn wait(&self) {
        let mut done = self.latch.done.lock();
        while !*done {
            self.latch.cv.wait(&mut done);
        }
    }
}

impl JobCompletion {
    pub fn signal(self) {
        let mut done = self.latch.done.lock();
        *done = true;
        self.latch.cv.notify_all();
    }
}

/// Wraps one context's Execute phase for immediate or deferred execution.
pub struct Job {
    queue: Arc<ContextQueue>,
    slot: usize,
    handle: Option<JobHandle>,
}

impl Job {
    pub fn new(queue: Arc<ContextQueue>, slot: usize) -> Self {
        Self {
            queue,
            slot,
            handle: None,
        }
    }

    /// Run the Execute phase inline, or submit it to the scheduler and retain
    /// the handle. Beginning a job while a prior submission on the same
    /// context is still running is fatal.
    pub fn begin(&mut self, immediate: bool, scheduler: &dyn JobScheduler) {
        let running = self.queue.running_flag(self.slot);
        let was_running = running.swap(true, Ordering::AcqRel);
        assert!(
            !was_running,
            "job begun while a prior submission on slot {} is still running",
            self.slot
        );
        if immediate {
            self.queue.execute_for_context(self.slot, Phase::Execute);
            running.store(false, Ordering::Release);
        } else {
            let queue = self.queue.clone();
            let slot = self.slot;
            self.handle = Some(scheduler.submit(Box::new(move || {
                queue.execute_for_context(slot, Phase::Execute);
                running.store(false, Ordering::Release);
            })));
        }
    }

    /// Block until the deferred unit of work (if any) completes.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.wait();
        }
    }
}
