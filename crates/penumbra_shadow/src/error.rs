//! Shadow caster error types

use thiserror::Error;

use crate::registry::CasterHandle;

/// Shadow caster errors
///
/// Expected per-frame outcomes (a stale handle on a hot path, a caster that
/// does not make the cut) are reported as `false`/`None` by the regular API.
/// This type covers the checked variants and configuration loading.
#[derive(Debug, Error)]
pub enum ShadowError {
    #[error("Invalid shadow usage value: {0}")]
    InvalidUsage(u32),

    #[error("Stale caster handle: {0}")]
    StaleHandle(CasterHandle),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ShadowError {
    fn from(e: serde_json::Error) -> Self {
        ShadowError::Config(e.to_string())
    }
}

/// Result type for shadow caster operations
pub type ShadowResult<T> = Result<T, ShadowError>;
