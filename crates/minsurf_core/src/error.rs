use thiserror::Error;

/// Failure kinds surfaced by surface construction and relaxation.
///
/// Non-convergence of the Picard loop is deliberately absent: reaching the
/// iteration cap is reported through [`crate::relaxation::RelaxationState`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurfaceError {
    #[error("unknown surface selection code {0} (expected 0 <= code <= 9)")]
    InvalidSelection(i32),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("mesh construction failed: {0}")]
    TopologyCorruption(String),

    #[error("relaxation session was aborted by an earlier numerical failure")]
    SessionAborted,
}

pub type Result<T> = std::result::Result<T, SurfaceError>;

pub(crate) fn invalid_config(message: impl Into<String>) -> SurfaceError {
    SurfaceError::InvalidConfiguration(message.into())
}

pub(crate) fn instability(message: impl Into<String>) -> SurfaceError {
    SurfaceError::NumericalInstability(message.into())
}

pub(crate) fn corruption(message: impl Into<String>) -> SurfaceError {
    SurfaceError::TopologyCorruption(message.into())
}
