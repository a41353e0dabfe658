//! Source error types.
//!
//! The error enum lives in `adaptest-core` so the engine and every source
//! share one classification of fetch failures.

pub use adaptest_core::error::SourceError;

/// Map a transport failure from `reqwest` into a [`SourceError`].
pub(crate) fn from_transport(error: &reqwest::Error, timeout_secs: u64) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout(timeout_secs)
    } else {
        SourceError::Network(error.to_string())
    }
}
