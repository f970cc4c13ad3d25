//! Publishes one [`LoraMsg`] onto a [`Medium`] over its lifetime: a
//! preamble event at `xbeg`, a payload event at `xpld`, and a completion
//! event at `xend`, each scheduled as its own job so a concurrent
//! [`crate::Receiver`] observes them at the right virtual-time instants.

use std::sync::{Arc, Mutex};

use sim_runtime::{JobGroup, Scheduler};

use crate::medium::Medium;
use crate::msg::LoraMsg;

/// Drives one transmission's preamble/payload/complete events through a
/// shared [`Scheduler`] onto a shared [`Medium`].
pub struct Transmitter {
    scheduler: Arc<Mutex<Scheduler>>,
    medium: Arc<Mutex<dyn Medium + Send>>,
    jobs: JobGroup,
    active: Option<LoraMsg>,
}

impl Transmitter {
    pub fn new(scheduler: Arc<Mutex<Scheduler>>, medium: Arc<Mutex<dyn Medium + Send>>) -> Self {
        Transmitter { scheduler, medium, jobs: JobGroup::new(), active: None }
    }

    /// True while a transmission is in flight (between `transmit` and its
    /// `xend`). A second `transmit` call while this is true is the
    /// `ConcurrentTransmit` error condition callers should check for.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Schedule `msg`'s three lifecycle events. Panics if already busy;
    /// callers (the Radio peripheral) must check [`Self::is_busy`] first,
    /// matching the "single radio, one transmission at a time" invariant.
    pub fn transmit(&mut self, msg: LoraMsg) {
        assert!(!self.is_busy(), "transmitter already has a message in flight");
        self.active = Some(msg.clone());

        let mut sched = self.scheduler.lock().unwrap();

        let medium = self.medium.clone();
        let preamble_msg = msg.clone();
        self.jobs.schedule(&mut sched, Some("preamble"), msg.xbeg, move || {
            medium.lock().unwrap().broadcast_preamble(&preamble_msg);
        });

        let medium = self.medium.clone();
        let payload_msg = msg.clone();
        self.jobs.schedule(&mut sched, Some("payload"), msg.xpld, move || {
            medium.lock().unwrap().broadcast_payload(&payload_msg);
        });

        let medium = self.medium.clone();
        let complete_msg = msg.clone();
        self.jobs.schedule(&mut sched, Some("complete"), msg.xend, move || {
            medium.lock().unwrap().broadcast_complete(&complete_msg);
        });
    }

    /// Called by the job scheduled at `xend`; clears the busy flag. The
    /// Radio peripheral invokes this after observing its own `complete` job
    /// run, since `Transmitter` has no way to hook its own scheduled
    /// closures after the fact.
    pub fn notify_complete(&mut self) {
        self.active = None;
    }

    /// Abort mid-transmission: cancel the remaining preamble/payload/complete
    /// jobs and broadcast `msg_abort` immediately.
    pub fn abort(&mut self) {
        if let Some(msg) = self.active.take() {
            let mut sched = self.scheduler.lock().unwrap();
            self.jobs.cancel_all(&mut sched);
            drop(sched);
            self.medium.lock().unwrap().broadcast_abort(&msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::SimpleMedium;
    use crate::rps::Rps;
    use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};
    use sim_runtime::clock::VirtualClock;

    #[test]
    fn transmit_schedules_three_jobs() {
        let scheduler = Arc::new(Mutex::new(Scheduler::new(Box::new(VirtualClock::new()))));
        let medium: Arc<Mutex<dyn Medium + Send>> = Arc::new(Mutex::new(SimpleMedium::new()));
        let mut tx = Transmitter::new(scheduler.clone(), medium);

        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hi", 0);
        let xend = msg.xend;
        tx.transmit(msg);
        assert!(tx.is_busy());

        {
            let sched = scheduler.lock().unwrap();
            assert!(!sched.is_empty());
        }
        scheduler
            .lock()
            .unwrap()
            .clock()
            .as_any_virtual()
            .unwrap()
            .advance_to(xend);
        scheduler.lock().unwrap().step();
        tx.notify_complete();
        assert!(!tx.is_busy());
    }

    #[test]
    fn abort_prevents_further_events() {
        let scheduler = Arc::new(Mutex::new(Scheduler::new(Box::new(VirtualClock::new()))));
        let medium: Arc<Mutex<dyn Medium + Send>> = Arc::new(Mutex::new(SimpleMedium::new()));
        let mut tx = Transmitter::new(scheduler.clone(), medium);

        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hi", 0);
        tx.transmit(msg);
        tx.abort();
        assert!(!tx.is_busy());
    }
}
