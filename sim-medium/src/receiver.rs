//! A single-channel receive state machine: IDLE -> ARMED -> CANDIDATE ->
//! LOCKED -> DONE, with transient ABORT paths back to ARMED or IDLE.
//!
//! `receive` opens a receive window on one frequency/Rps combination for a
//! given timeout (expressed in symbols, per §4.E). The first matching
//! preamble the [`crate::Medium`] reports is held as a *candidate*. A real
//! demodulator only trusts a lock once it has seen `symdetect` symbols of
//! clean preamble; this is checked the moment the candidate's payload phase
//! starts (`msg_payload`'s timestamp minus the preamble's start, compared
//! against `symtime(rps, symdetect)`) rather than via a second scheduled
//! job, since that timestamp delta already carries the answer. Everything
//! else on the bus (other frequencies, mismatched Rps, a preamble too short
//! to lock onto) is ignored.
//!
//! Note on locking: [`sim_runtime::Scheduler`] is a plain, non-reentrant
//! mutex. `receive`/`cancel` are the only places this type locks it, and
//! both are called from outside a scheduler step (the Radio peripheral's
//! `svc`, never from a job payload or a [`crate::Medium`] broadcast). The
//! preamble/payload/complete/abort handlers below never touch the scheduler
//! at all, precisely so they stay safe to call from inside one.

use std::sync::{Arc, Mutex};

use sim_runtime::{JobGroup, Scheduler, Tick};

use crate::medium::LoraMsgProcessor;
use crate::msg::LoraMsg;
use crate::rps::Rps;
use crate::MediumError;

/// Symbols of clean preamble required before a candidate is trusted, per
/// §4.E. Distinct from the caller-supplied `minsyms` that sizes the
/// timeout.
const SYMDETECT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Armed { freq: u32, rps: Rps },
    Candidate { freq: u32, rps: Rps, src: u64, preamble_at: Tick },
    Locked { src: u64 },
    Done,
}

type Callback = Box<dyn FnOnce(Option<LoraMsg>) + Send>;

struct Core {
    state: State,
    scheduler: Arc<Mutex<Scheduler>>,
    jobs: JobGroup,
    cb: Option<Callback>,
}

/// Owning handle to a receive state machine; register [`Receiver::listener`]
/// (not `self`) with a [`crate::Medium`] to feed it transmission events.
#[derive(Clone)]
pub struct Receiver(Arc<Mutex<Core>>);

impl Receiver {
    pub fn new(scheduler: Arc<Mutex<Scheduler>>) -> Self {
        Receiver(Arc::new(Mutex::new(Core {
            state: State::Idle,
            scheduler,
            jobs: JobGroup::new(),
            cb: None,
        })))
    }

    /// A [`LoraMsgProcessor`] that feeds events from a [`crate::Medium`] into
    /// this receiver's state machine.
    pub fn listener(&self) -> Box<dyn LoraMsgProcessor> {
        Box::new(ReceiverListener(self.0.clone()))
    }

    /// Open a receive window at `rxtime`: only a preamble on `freq` with the
    /// same PHY parameters as `rps` (IQINV ignored, per [`Rps::same_phy`])
    /// becomes a lock candidate. `minsyms` sizes the timeout
    /// (`rxtime + symtime(rps, minsyms)`); once the message is fully
    /// received, `cb` is invoked with `Some(msg)`, or `None` if the window
    /// times out without ever locking. `cb` fires exactly once.
    ///
    /// Returns [`MediumError::ReceiveInProgress`] if a previous receive on
    /// this instance is still armed, candidate, or locked.
    pub fn receive(
        &self,
        rxtime: Tick,
        freq: u32,
        rps: Rps,
        minsyms: u8,
        cb: impl FnOnce(Option<LoraMsg>) + Send + 'static,
    ) -> Result<(), MediumError> {
        let mut core = self.0.lock().unwrap();
        if matches!(core.state, State::Armed { .. } | State::Candidate { .. } | State::Locked { .. }) {
            return Err(MediumError::ReceiveInProgress);
        }
        core.state = State::Armed { freq, rps };
        core.cb = Some(Box::new(cb));

        let weak = self.0.clone();
        let timeout_at = rxtime + symtime_ticks(rps, minsyms);
        let sched_arc = core.scheduler.clone();
        let mut sched = sched_arc.lock().unwrap();
        core.jobs.schedule(&mut sched, Some("timeout"), timeout_at, move || {
            fire_timeout(&weak);
        });
        Ok(())
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.0.lock().unwrap().state, State::Idle)
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.0.lock().unwrap().state, State::Armed { .. })
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.0.lock().unwrap().state, State::Locked { .. })
    }

    /// Abandon any in-flight receive without delivering a callback.
    pub fn cancel(&self) {
        let mut core = self.0.lock().unwrap();
        let sched_arc = core.scheduler.clone();
        let mut sched = sched_arc.lock().unwrap();
        core.jobs.cancel_all(&mut sched);
        drop(sched);
        core.state = State::Idle;
        core.cb = None;
    }
}

/// Ticks for `nsyms` symbols of `rps`'s modulation. Uses the simulator's
/// fixed timebase constant rather than a `Scheduler`'s clock, so this is
/// safe to call from a listener callback running inside a scheduler step.
fn symtime_ticks(rps: Rps, nsyms: u8) -> Tick {
    let us = nsyms as f64 * rps.symbol_time_us();
    ((us * sim_runtime::clock::TICKS_PER_SEC as f64) / 1_000_000.0).round() as Tick
}

/// Runs when the window's timeout job fires. A no-op once the receiver has
/// already locked or delivered (its state moved past Armed/Candidate), so
/// there is no need to cancel this job from the lock/complete/abort paths.
fn fire_timeout(core: &Arc<Mutex<Core>>) {
    let (cb, fire) = {
        let mut core = core.lock().unwrap();
        let fire = matches!(core.state, State::Armed { .. } | State::Candidate { .. });
        if fire {
            core.state = State::Idle;
        }
        (core.cb.take(), fire)
    };
    if fire {
        if let Some(cb) = cb {
            cb(None);
        }
    }
}

struct ReceiverListener(Arc<Mutex<Core>>);

impl LoraMsgProcessor for ReceiverListener {
    fn msg_preamble(&mut self, msg: &LoraMsg) {
        let mut core = self.0.lock().unwrap();
        if let State::Armed { freq, rps } = core.state {
            if freq == msg.freq && rps.same_phy(msg.rps) {
                core.state = State::Candidate { freq, rps, src: msg.src, preamble_at: msg.xbeg };
            }
        }
    }

    fn msg_payload(&mut self, msg: &LoraMsg) {
        let mut core = self.0.lock().unwrap();
        if let State::Candidate { freq, rps, src, preamble_at } = core.state {
            if src != msg.src {
                return;
            }
            let seen = msg.xpld.saturating_sub(preamble_at);
            core.state = if seen >= symtime_ticks(rps, SYMDETECT) {
                State::Locked { src }
            } else {
                // Too little clean preamble before the payload started:
                // missed the lock window. Clear the candidate, keep listening.
                State::Armed { freq, rps }
            };
        }
    }

    fn msg_complete(&mut self, msg: &LoraMsg) {
        let (cb, deliver) = {
            let mut core = self.0.lock().unwrap();
            let deliver = core.state == (State::Locked { src: msg.src });
            if deliver {
                core.state = State::Done;
            }
            (core.cb.take(), deliver)
        };
        if deliver {
            if let Some(cb) = cb {
                cb(Some(msg.clone()));
            }
        }
    }

    fn msg_abort(&mut self, msg: &LoraMsg) {
        let cb = {
            let mut core = self.0.lock().unwrap();
            match core.state {
                State::Candidate { freq, rps, src, .. } if src == msg.src => {
                    // The candidate transmission vanished before we locked
                    // onto it; keep the window open for another preamble.
                    core.state = State::Armed { freq, rps };
                    None
                }
                State::Locked { src } if src == msg.src => {
                    core.state = State::Idle;
                    core.cb.take()
                }
                _ => None,
            }
        };
        if let Some(cb) = cb {
            cb(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{Medium, SimpleMedium};
    use crate::transmitter::Transmitter;
    use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};
    use sim_runtime::clock::VirtualClock;
    use std::sync::mpsc;

    fn setup() -> (Arc<Mutex<Scheduler>>, Arc<Mutex<dyn Medium + Send>>) {
        let scheduler = Arc::new(Mutex::new(Scheduler::new(Box::new(VirtualClock::new()))));
        let medium: Arc<Mutex<dyn Medium + Send>> = Arc::new(Mutex::new(SimpleMedium::new()));
        (scheduler, medium)
    }

    fn advance(scheduler: &Arc<Mutex<Scheduler>>, to: Tick) {
        scheduler.lock().unwrap().clock().as_any_virtual().unwrap().advance_to(to);
        scheduler.lock().unwrap().step();
    }

    #[test]
    fn locks_onto_matching_preamble_and_delivers_on_complete() {
        let (scheduler, medium) = setup();
        let rx = Receiver::new(scheduler.clone());
        medium.lock().unwrap().register(rx.listener());
        let (tx_result, rx_result) = mpsc::channel();
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        rx.receive(0, 868_100_000, rps, 40, move |result| {
            let _ = tx_result.send(result);
        })
        .unwrap();

        let mut tx = Transmitter::new(scheduler.clone(), medium.clone());
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hello", 0);
        let xend = msg.xend;
        tx.transmit(msg);

        advance(&scheduler, xend);
        let delivered = rx_result.try_recv().unwrap().unwrap();
        assert_eq!(delivered.payload.as_slice(), b"hello");
    }

    #[test]
    fn ignores_preamble_on_wrong_frequency() {
        let (scheduler, medium) = setup();
        let rx = Receiver::new(scheduler.clone());
        medium.lock().unwrap().register(rx.listener());
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        rx.receive(0, 868_100_000, rps, 40, |_| {}).unwrap();

        let mut tx = Transmitter::new(scheduler.clone(), medium.clone());
        let msg = LoraMsg::new(1, 868_300_000, rps, b"hello", 0);
        let xend = msg.xend;
        tx.transmit(msg);

        advance(&scheduler, xend);
        assert!(rx.is_armed());
    }

    #[test]
    fn timeout_without_a_match_delivers_none() {
        let (scheduler, _medium) = setup();
        let rx = Receiver::new(scheduler.clone());
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let (tx_result, rx_result) = mpsc::channel();
        rx.receive(0, 868_100_000, rps, 5, move |result| {
            let _ = tx_result.send(result);
        })
        .unwrap();

        let timeout_at = symtime_ticks(rps, 5);
        advance(&scheduler, timeout_at);
        assert!(rx.is_idle());
        assert!(rx_result.try_recv().unwrap().is_none());
    }

    #[test]
    fn a_second_receive_while_armed_is_a_typed_error() {
        let (scheduler, _medium) = setup();
        let rx = Receiver::new(scheduler.clone());
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        rx.receive(0, 868_100_000, rps, 5, |_| {}).unwrap();
        let err = rx.receive(0, 868_100_000, rps, 5, |_| {}).unwrap_err();
        assert_eq!(err, MediumError::ReceiveInProgress);
    }

    #[test]
    fn a_payload_arriving_before_lock_clears_the_candidate_and_keeps_listening() {
        let (scheduler, medium) = setup();
        let rx = Receiver::new(scheduler.clone());
        medium.lock().unwrap().register(rx.listener());
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        rx.receive(0, 868_100_000, rps, 40, |_| {}).unwrap();

        // A preamble far shorter than symdetect(5) symbols: msg_payload fires
        // before we would have locked on, so the candidate must be cleared.
        let msg = LoraMsg::with_params(1, 868_100_000, rps, b"hello", 0, 0, Some(false));
        medium.lock().unwrap().broadcast_preamble(&msg);
        medium.lock().unwrap().broadcast_payload(&msg);
        assert!(rx.is_armed());
    }

    #[test]
    fn aborting_a_locked_candidate_delivers_none_and_frees_the_receiver() {
        let (scheduler, medium) = setup();
        let rx = Receiver::new(scheduler.clone());
        medium.lock().unwrap().register(rx.listener());
        let (tx_result, rx_result) = mpsc::channel();
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        rx.receive(0, 868_100_000, rps, 40, move |result| {
            let _ = tx_result.send(result);
        })
        .unwrap();

        let msg = LoraMsg::new(1, 868_100_000, rps, b"hello", 0);
        medium.lock().unwrap().broadcast_preamble(&msg);
        medium.lock().unwrap().broadcast_payload(&msg);
        assert!(rx.is_locked());
        medium.lock().unwrap().broadcast_abort(&msg);

        assert!(rx.is_idle());
        assert!(rx_result.try_recv().unwrap().is_none());
    }
}
