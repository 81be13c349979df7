use thiserror::Error;

/// Failures surfaced to callers.
///
/// Contract violations (mixing providers, out-of-range index ranges) are
/// not represented here; they are programming errors and are asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested key is not present in the map.
    #[error("key not found")]
    KeyNotFound,
}
