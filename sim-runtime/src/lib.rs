//! Deterministic virtual-time scheduler: a priority queue of ticked jobs driven
//! by an external clock, plus a named-tag overlay (`JobGroup`) for cancelling
//! related jobs as a unit.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

pub mod clock;
pub use clock::Clock;

/// Non-negative integer tick in the active [`Clock`]'s units (typically 32768/s).
pub type Tick = u64;

/// Opaque handle returned by [`Scheduler::schedule`]; pass to [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(u64);

struct Job {
    ticks: Tick,
    seq: u64,
    id: u64,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
    payload: Box<dyn FnOnce() + Send>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.ticks == other.ticks && self.seq == other.seq
    }
}
impl Eq for Job {}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest ticks (and, for ties,
        // the earliest insertion) to pop first.
        other.ticks.cmp(&self.ticks).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A fault raised by a job's payload, captured instead of unwinding the stepper.
#[derive(Debug, thiserror::Error)]
#[error("scheduler job faulted: {message}")]
pub struct JobFault {
    pub message: String,
}

/// Priority-queue of timed jobs keyed by integer ticks, stepped cooperatively
/// by a single driver.
pub struct Scheduler {
    clock: Box<dyn Clock>,
    jobs: BinaryHeap<Job>,
    cancelled: HashMap<u64, std::sync::Arc<std::sync::atomic::AtomicBool>>,
    stepping: bool,
    fault: Option<JobFault>,
}

impl Scheduler {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Scheduler {
            clock,
            jobs: BinaryHeap::new(),
            cancelled: HashMap::new(),
            stepping: false,
            fault: None,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    /// Insert a job to run at `at_ticks`. O(log n).
    pub fn schedule(&mut self, at_ticks: Tick, payload: impl FnOnce() + Send + 'static) -> JobHandle {
        let id = NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed);
        let seq = NEXT_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        let cancelled = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        self.cancelled.insert(id, cancelled.clone());
        self.jobs.push(Job { ticks: at_ticks, seq, id, cancelled, payload: Box::new(payload) });
        JobHandle(id)
    }

    /// Idempotent cancellation. O(log n) amortized (lazy removal at pop time).
    pub fn cancel(&mut self, handle: JobHandle) {
        if let Some(flag) = self.cancelled.remove(&handle.0) {
            flag.store(true, AtomicOrdering::Relaxed);
        }
    }

    /// Any fault recorded by a job during the last `step`.
    pub fn take_fault(&mut self) -> Option<JobFault> {
        self.fault.take()
    }

    /// Advance virtual "now" via the Clock and run every due job in heap order.
    /// Re-entrant `schedule` calls made from within a job are honored in the
    /// same sweep only if their ticks are already `<= now`.
    pub fn step(&mut self) {
        if self.fault.is_some() {
            return;
        }
        let now = self.clock.ticks(true);
        self.stepping = true;
        while let Some(top) = self.jobs.peek() {
            if top.ticks > now {
                break;
            }
            let job = self.jobs.pop().unwrap();
            self.cancelled.remove(&job.id);
            if job.cancelled.load(AtomicOrdering::Relaxed) {
                continue;
            }
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job.payload));
            if let Err(e) = result {
                let message = e
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| e.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "job panicked".to_string());
                self.fault = Some(JobFault { message });
                break;
            }
        }
        self.stepping = false;
    }

    /// Ticks of the next pending (non-cancelled) job, if any.
    pub fn next_wakeup(&self) -> Option<Tick> {
        self.jobs
            .iter()
            .filter(|j| !j.cancelled.load(AtomicOrdering::Relaxed))
            .map(|j| j.ticks)
            .min()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Named-job overlay on top of a [`Scheduler`]: maintains a bijection between
/// optional string tags and pending jobs so a family of related jobs (e.g. the
/// preamble/payload/complete triple of one transmit) can be cancelled as a unit.
pub struct JobGroup {
    handles: HashMap<String, JobHandle>,
}

impl JobGroup {
    pub fn new() -> Self {
        JobGroup { handles: HashMap::new() }
    }

    /// Schedule `payload` at `at_ticks`, optionally tagged for later cancellation.
    pub fn schedule(
        &mut self,
        scheduler: &mut Scheduler,
        tag: Option<&str>,
        at_ticks: Tick,
        payload: impl FnOnce() + Send + 'static,
    ) -> JobHandle {
        let handle = scheduler.schedule(at_ticks, payload);
        if let Some(tag) = tag {
            self.handles.insert(tag.to_string(), handle);
        }
        handle
    }

    /// Cancel the job tagged `tag`. No-op (returns false) for an unknown tag.
    pub fn cancel(&mut self, scheduler: &mut Scheduler, tag: &str) -> bool {
        if let Some(handle) = self.handles.remove(tag) {
            scheduler.cancel(handle);
            true
        } else {
            false
        }
    }

    /// Cancel every job currently tracked by this group.
    pub fn cancel_all(&mut self, scheduler: &mut Scheduler) {
        for (_, handle) in self.handles.drain() {
            scheduler.cancel(handle);
        }
    }
}

impl Default for JobGroup {
    fn default() -> Self {
        Self::new()
    }
}
