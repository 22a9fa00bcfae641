use thiserror::Error;

pub type Result<T> = std::result::Result<T, SeriesError>;

/// Non-fatal outcomes surfaced to callers. Torn writer state and in-store
/// key collisions are not represented here; those abort the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("no entry for the requested key")]
    NotFound,
    #[error("operation requires a non-empty series")]
    Empty,
    #[error("key violates the strict key order")]
    OutOfOrder,
    #[error("key is already present")]
    DuplicateKey,
    #[error("series is sealed")]
    Sealed,
    #[error("append overlap differs from existing entries")]
    OverlapMismatch,
}
