//! A minimal LoRaWAN Network Server: the [`UniversalGateway`] that turns
//! completed [`sim_medium::LoraMsg`]s into classified uplinks and schedules
//! downlinks back through the same [`sim_medium::Medium`], and the [`Lns`]
//! that handles Join-Request verification, session-key derivation, and
//! data-frame verification/framing on top of it.

mod error;
mod gateway;
mod lns;
mod session;

pub use error::LnsError;
pub use gateway::{LoraWanMsg, UniversalGateway};
pub use lns::{JoinAccept, JoinParams, Lns, JOIN_ACCEPT_DELAY1_SECS, JOIN_ACCEPT_DELAY2_SECS};
pub use session::{Session, SessionManager};
