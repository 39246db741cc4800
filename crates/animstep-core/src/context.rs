//! Processing context, state machine, and the bounded per-frame queue.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::command::CommandBuffer;
use crate::config::Config;
use crate::instance::CharacterInstance;
use crate::memory::FramePool;
use crate::phases;
use crate::pose::PoseData;

/// Per-instance processing state. Advances monotonically through the phase
/// results below; the only legal re-entry is Finished -> Finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ProcState {
    Unstarted,
    StartProcessed,
    JobSkipped,
    JobCulled,
    Failure,
    JobExecuted,
    Finished,
}

/// The three phase operations applied to a context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Start,
    Execute,
    Finish,
}

/// One character's processing state for the current frame.
///
/// Exclusively owned by one worker for the duration of a single phase call;
/// the queue's per-slot lock enforces that.
pub struct ProcessingContext {
    pub instance: Arc<Mutex<CharacterInstance>>,
    pub slot: usize,
    pub parent_slot: Option<usize>,
    pub attachment_hash: Option<u32>,
    pub child_count: u32,
    pub(crate) state: ProcState,
    /// Pool-backed scratch pose, carried from Start to Execute/Finish.
    pub(crate) write_pose: Option<PoseData>,
    /// Pool-backed command log, consumed by Execute.
    pub(crate) commands: Option<CommandBuffer>,
    /// Guards against double-submitting a job for this context.
    pub(crate) running: Arc<AtomicBool>,
}

impl ProcessingContext {
    #[inline]
    pub fn state(&self) -> ProcState {
        self.state
    }
}

/// Fixed-capacity array of this frame's contexts.
pub struct ContextQueue {
    cfg: Config,
    pool: Arc<FramePool>,
    slots: Vec<Mutex<Option<ProcessingContext>>>,
    count: AtomicUsize,
    frame_dt: AtomicU32,
}

impl ContextQueue {
    pub fn new(cfg: Config, pool: Arc<FramePool>) -> Self {
        let slots = (0..cfg.queue_capacity).map(|_| Mutex::new(None)).collect();
        Self {
            cfg,
            pool,
            slots,
            count: AtomicUsize::new(0),
            frame_dt: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    #[inline]
    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    pub fn set_frame_dt(&self, dt: f32) {
        self.frame_dt.store(dt.to_bits(), Ordering::Relaxed);
    }

    pub fn frame_dt(&self) -> f32 {
        f32::from_bits(self.frame_dt.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Append a new Unstarted context for `instance`, recording its slot on
    /// the instance. Capacity overflow and a not-yet-appended parent are
    /// logic errors and abort.
    pub fn append_context(
        &self,
        instance: Arc<Mutex<CharacterInstance>>,
        attachment_hash: Option<u32>,
        parent_slot: Option<usize>,
        child_count: u32,
    ) -> usize {
        let slot = self.count.fetch_add(1, Ordering::AcqRel);
        assert!(
            slot < self.slots.len(),
            "context queue capacity {} exceeded",
            self.slots.len()
        );
        if let Some(parent) = parent_slot {
            assert!(parent < slot, "parent context must be appended first");
        }
        instance.lock().set_context_slot(slot);
        let context = ProcessingContext {
            instance,
            slot,
            parent_slot,
            attachment_hash,
            child_count,
            state: ProcState::Unstarted,
            write_pose: None,
            commands: None,
            running: Arc::new(AtomicBool::new(false)),
        };
        *self.slots[slot].lock() = Some(context);
        slot
    }

    /// Apply one phase to the context at `slot`. This is the re-entry point
    /// used when a deferred job resumes on a worker.
    pub fn execute_for_context(&self, slot: usize, phase: Phase) -> ProcState {
        let mut guard = self.slots[slot].lock();
        let context = guard.as_mut().expect("no context appended at slot");
        let next = match phase {
            Phase::Start => phases::start_animation_processing(self, context),
            Phase::Execute => phases::execute_job(self, context),
            Phase::Finish => phases::finish_animation_computations(self, context),
        };
        context.state = next;
        next
    }

    pub fn state_of(&self, slot: usize) -> ProcState {
        self.slots[slot]
            .lock()
            .as_ref()
            .expect("no context appended at slot")
            .state
    }

    /// Shared handle to the instance behind a slot, for parent lookups.
    pub(crate) fn instance_of(&self, slot: usize) -> Arc<Mutex<CharacterInstance>> {
        self.slots[slot]
            .lock()
            .as_ref()
            .expect("no context appended at slot")
            .instance
            .clone()
    }

    pub(crate) fn running_flag(&self, slot: usize) -> Arc<AtomicBool> {
        self.slots[slot]
            .lock()
            .as_ref()
            .expect("no context appended at slot")
            .running
            .clone()
    }

    /// Recycle the queue for the next frame. Every appended context must have
    /// reached Finished, and every context's declared child count must match
    /// the children actually appended against it.
    pub fn clear_contexts(&self) {
        let count = self.len();
        let mut declared = vec![0u32; count];
        let mut appended = vec![0u32; count];
        for slot in 0..count {
            let mut guard = self.slots[slot].lock();
            let context = guard.as_ref().expect("appended context missing");
            assert_eq!(
                context.state,
                ProcState::Finished,
                "clear_contexts with unfinished context at slot {slot}"
            );
            declared[slot] = context.child_count;
            if let Some(parent) = context.parent_slot {
                appended[parent] += 1;
            }
            *guard = None;
        }
        for (slot, (d, a)) in declared.iter().zip(appended.iter()).enumerate() {
            assert_eq!(
                d, a,
                "context at slot {slot} declared {d} children, {a} were appended"
            );
        }
        self.count.store(0, Ordering::Release);
    }
}
