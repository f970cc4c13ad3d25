//! The shared radio bus: every [`Transmitter`](crate::Transmitter) announces
//! its transmission's lifecycle here, and every
//! [`Receiver`](crate::Receiver) listens for it. Grounded in the original
//! simulator's publish/subscribe medium, where a `LoraMsgProcessor`
//! interface receives `msg_preamble`/`msg_payload`/`msg_complete`/`msg_abort`
//! callbacks as a transmission progresses.

use std::collections::HashMap;

use crate::msg::LoraMsg;

/// Callback surface a listener implements to observe transmissions on a
/// [`Medium`]. Each method receives the message as known at that lifecycle
/// point; `msg_payload`'s copy may differ from `msg_preamble`'s only in
/// receiver-side bookkeeping, never in content (a transmission on air cannot
/// change once started).
pub trait LoraMsgProcessor: Send {
    /// The preamble of `msg` has become visible on the bus.
    fn msg_preamble(&mut self, msg: &LoraMsg);
    /// The payload portion of `msg` has begun (its preamble finished).
    fn msg_payload(&mut self, msg: &LoraMsg);
    /// `msg` finished transmitting successfully.
    fn msg_complete(&mut self, msg: &LoraMsg);
    /// `msg` was aborted mid-transmission (the transmitter cancelled it).
    fn msg_abort(&mut self, msg: &LoraMsg);
}

/// Opaque handle to a registered listener, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The bus a [`Transmitter`](crate::Transmitter) publishes to and a
/// [`Receiver`](crate::Receiver) subscribes to.
pub trait Medium {
    fn register(&mut self, listener: Box<dyn LoraMsgProcessor>) -> ListenerId;
    fn unregister(&mut self, id: ListenerId);
    fn broadcast_preamble(&mut self, msg: &LoraMsg);
    fn broadcast_payload(&mut self, msg: &LoraMsg);
    fn broadcast_complete(&mut self, msg: &LoraMsg);
    fn broadcast_abort(&mut self, msg: &LoraMsg);
}

/// A trivial in-process [`Medium`]: every registered listener hears every
/// broadcast, regardless of frequency (frequency filtering is each
/// [`Receiver`](crate::Receiver)'s own job, matching the original's
/// "listeners see everything, decide relevance themselves" design).
#[derive(Default)]
pub struct SimpleMedium {
    next_id: u64,
    listeners: HashMap<u64, Box<dyn LoraMsgProcessor>>,
}

impl SimpleMedium {
    pub fn new() -> Self {
        SimpleMedium { next_id: 0, listeners: HashMap::new() }
    }
}

impl Medium for SimpleMedium {
    fn register(&mut self, listener: Box<dyn LoraMsgProcessor>) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.insert(id, listener);
        ListenerId(id)
    }

    fn unregister(&mut self, id: ListenerId) {
        self.listeners.remove(&id.0);
    }

    fn broadcast_preamble(&mut self, msg: &LoraMsg) {
        for listener in self.listeners.values_mut() {
            listener.msg_preamble(msg);
        }
    }

    fn broadcast_payload(&mut self, msg: &LoraMsg) {
        for listener in self.listeners.values_mut() {
            listener.msg_payload(msg);
        }
    }

    fn broadcast_complete(&mut self, msg: &LoraMsg) {
        for listener in self.listeners.values_mut() {
            listener.msg_complete(msg);
        }
    }

    fn broadcast_abort(&mut self, msg: &LoraMsg) {
        for listener in self.listeners.values_mut() {
            listener.msg_abort(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rps::Rps;
    use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    impl LoraMsgProcessor for Recorder {
        fn msg_preamble(&mut self, _msg: &LoraMsg) {
            self.0.lock().unwrap().push("preamble");
        }
        fn msg_payload(&mut self, _msg: &LoraMsg) {
            self.0.lock().unwrap().push("payload");
        }
        fn msg_complete(&mut self, _msg: &LoraMsg) {
            self.0.lock().unwrap().push("complete");
        }
        fn msg_abort(&mut self, _msg: &LoraMsg) {
            self.0.lock().unwrap().push("abort");
        }
    }

    #[test]
    fn every_listener_hears_every_broadcast() {
        let mut medium = SimpleMedium::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        medium.register(Box::new(Recorder(log.clone())));
        medium.register(Box::new(Recorder(log.clone())));

        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hi", 0);
        medium.broadcast_preamble(&msg);
        medium.broadcast_complete(&msg);

        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[test]
    fn unregistered_listener_hears_nothing() {
        let mut medium = SimpleMedium::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = medium.register(Box::new(Recorder(log.clone())));
        medium.unregister(id);

        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hi", 0);
        medium.broadcast_preamble(&msg);
        assert!(log.lock().unwrap().is_empty());
    }
}
