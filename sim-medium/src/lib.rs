//! The shared LoRa radio medium: bit-packed radio parameters ([`Rps`]),
//! timed messages ([`LoraMsg`]), a publish/subscribe bus ([`Medium`]), and
//! the transmitter/receiver state machines that drive messages across it.

mod medium;
mod msg;
mod receiver;
mod rps;
mod transmitter;

pub use medium::{LoraMsgProcessor, ListenerId, Medium, SimpleMedium};
pub use msg::{LoraMsg, PREAMBLE_SYMBOLS};
pub use receiver::Receiver;
pub use rps::Rps;
pub use transmitter::Transmitter;

/// Errors surfaced by the medium/transmitter/receiver layer.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum MediumError {
    #[error("a receive is already in progress on this channel")]
    ReceiveInProgress,
    #[error("the transmitter already has a message in flight")]
    ConcurrentTransmit,
}
