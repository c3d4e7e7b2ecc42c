//! Error types for the cachesim library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Invalid or mutually incompatible construction
//!   parameters (zero segment size, ttl on a policy without ttl support, ...).
//!   Fatal at construction.
//! - [`InvariantError`]: Returned by `check_invariants` methods when an
//!   internal structure is inconsistent.
//! - [`ModelError`]: A scoring-model backend failed to fit or predict. The
//!   learned policy catches it and keeps simulating on the heuristic scorer.
//! - [`ProfilerError`]: A miss-ratio-curve run could not start.
//!
//! Conditions that are *not* errors: an object larger than the whole cache is
//! counted as a forced miss, and the end of a request stream is signalled by
//! [`RequestSource::next_request`](crate::request::RequestSource::next_request)
//! returning `None`.
//!
//! ## Example Usage
//!
//! ```
//! use cachesim::error::ConfigError;
//! use cachesim::policy::l2cache::{L2Cache, L2CacheParams};
//! use cachesim::traits::CommonCacheParams;
//!
//! let common = CommonCacheParams::new(1 << 20);
//! let bad = L2CacheParams { segment_size: 0, ..L2CacheParams::default() };
//! let err: ConfigError = L2Cache::try_new(common, bad, None).unwrap_err();
//! assert!(err.to_string().contains("segment_size"));
//! ```

use std::fmt;

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
///
/// Produced by `check_invariants` on cache types (e.g.
/// [`L2Cache::check_invariants`](crate::policy::l2cache::L2Cache::check_invariants)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by fallible constructors such as
/// [`L2Cache::try_new`](crate::policy::l2cache::L2Cache::try_new) and
/// [`CacheBuilder::build`](crate::builder::CacheBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// ModelError
// ---------------------------------------------------------------------------

/// Error returned by a [`ModelBackend`](crate::policy::l2cache::ModelBackend)
/// or a trained [`ScoringModel`](crate::policy::l2cache::ScoringModel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelError(String);

impl ModelError {
    /// Creates a new `ModelError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model backend: {}", self.0)
    }
}

impl std::error::Error for ModelError {}

// ---------------------------------------------------------------------------
// ProfilerError
// ---------------------------------------------------------------------------

/// Error returned by [`get_miss_ratio_curve`](crate::profiler::get_miss_ratio_curve).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilerError {
    /// Profiler parameters or the cache template are unusable.
    Config(ConfigError),
    /// The request source cannot hand out an independent replay per worker.
    UnsupportedSource(String),
}

impl fmt::Display for ProfilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfilerError::Config(err) => write!(f, "invalid profiler configuration: {err}"),
            ProfilerError::UnsupportedSource(msg) => {
                write!(f, "request source cannot be replayed: {msg}")
            },
        }
    }
}

impl std::error::Error for ProfilerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProfilerError::Config(err) => Some(err),
            ProfilerError::UnsupportedSource(_) => None,
        }
    }
}

impl From<ConfigError> for ProfilerError {
    fn from(err: ConfigError) -> Self {
        ProfilerError::Config(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_display_shows_message() {
        let err = InvariantError::new("segment chain length mismatch");
        assert_eq!(err.to_string(), "segment chain length mismatch");
        assert_eq!(err.message(), "segment chain length mismatch");
    }

    #[test]
    fn config_display_shows_message() {
        let err = ConfigError::new("segment_size must be > 0");
        assert_eq!(err.to_string(), "segment_size must be > 0");
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn model_error_is_prefixed() {
        let err = ModelError::new("singular matrix");
        assert_eq!(err.to_string(), "model backend: singular matrix");
        assert_eq!(err.message(), "singular matrix");
    }

    #[test]
    fn profiler_error_wraps_config() {
        let err: ProfilerError = ConfigError::new("bin_size must be > 0").into();
        assert!(err.to_string().contains("bin_size"));
        assert!(std::error::Error::source(&err).is_some());

        let err = ProfilerError::UnsupportedSource("one-pass stream".into());
        assert!(err.to_string().contains("one-pass"));
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn errors_implement_std_error() {
        fn assert_error<T: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<InvariantError>();
        assert_error::<ConfigError>();
        assert_error::<ModelError>();
        assert_error::<ProfilerError>();
    }
}
