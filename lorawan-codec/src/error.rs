/// Errors raised while packing or unpacking a PHYPayload.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    #[error("frame too short or internally inconsistent")]
    MalformedFrame,
    #[error("MIC did not match the expected key/session")]
    MicMismatch,
}
