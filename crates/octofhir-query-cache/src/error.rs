//! Error types for the cache tiers

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised while opening or operating a cache tier.
///
/// None of these reach the callers of a query service: read and write failures
/// are logged and absorbed by the tier. They surface only from explicit store
/// operations (open, purge, maintenance).
#[derive(Debug, Error)]
pub enum CacheError {
    /// Disk store could not be opened
    #[error("Failed to open disk cache at {path}: {message}")]
    Open { path: String, message: String },

    /// Connection pool error
    #[error("Disk cache connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// SQLite error
    #[error("Disk cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Invalid configuration
    #[error("Invalid cache configuration: {0}")]
    Config(String),

    /// The store was already closed
    #[error("Disk cache is closed")]
    Closed,
}
