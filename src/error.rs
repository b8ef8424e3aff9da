use thiserror::Error;

/// Errors that may propagate out of the session engine.
///
/// Frame errors (bad checksum, truncated packet) and decode errors (valid
/// frame, inconsistent fields) never reach this type: they are absorbed
/// locally and surfaced as in-band flags, per the error taxonomy.
#[derive(Debug, Error)]
pub enum GpsdError {
    #[error("I/O error on sensor: {0}")]
    Io(#[from] std::io::Error),

    #[error("no device configured")]
    NoDevice,

    #[error("SHM segment unavailable: {0}")]
    ShmUnavailable(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("bit width {0} exceeds 56-bit accumulator limit")]
    WidthTooWide(u32),
}

pub type GpsdResult<T> = Result<T, GpsdError>;
