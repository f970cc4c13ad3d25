/// Errors raised by the LNS/gateway layer.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum LnsError {
    #[error("frame MIC did not verify against the session's keys")]
    MicMismatch,
    #[error("DevNonce did not increase since the last join from this device")]
    DevNonceNotIncreasing,
    #[error("no active session for this DevAddr")]
    NoSession,
    #[error("frequency is not a valid channel for this region")]
    UnknownChannel,
    #[error("no data rate in this region matches the given radio parameters")]
    UnknownDataRate,
    #[error("malformed PHYPayload")]
    MalformedFrame,
}

impl From<lorawan_codec::Error> for LnsError {
    fn from(e: lorawan_codec::Error) -> Self {
        match e {
            lorawan_codec::Error::MicMismatch => LnsError::MicMismatch,
            lorawan_codec::Error::MalformedFrame => LnsError::MalformedFrame,
        }
    }
}

impl From<sim_region::RegionError> for LnsError {
    fn from(e: sim_region::RegionError) -> Self {
        match e {
            sim_region::RegionError::UnknownDataRate(_) => LnsError::UnknownDataRate,
            sim_region::RegionError::UnknownChannel(_) => LnsError::UnknownChannel,
        }
    }
}
