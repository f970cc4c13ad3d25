/// Errors surfaced by the top-level facade: failures from any owned crate,
/// flattened into one enum so the CLI harness has a single `?`-friendly type.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Emulator(#[from] sim_emulator::EmulatorError),
    #[error(transparent)]
    HexLoad(#[from] hexload::HexLoadError),
    #[error(transparent)]
    Lns(#[from] sim_gateway::LnsError),
    #[error("failed to read firmware image {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("no HEX firmware image supplied: pass one or more paths or set TEST_HEXFILES")]
    NoFirmware,
}
