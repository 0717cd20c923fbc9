//! Database configuration.
//!
//! All fields have sensible defaults; use struct update syntax to override
//! specific settings:
//!
//! ```rust
//! use std::time::Duration;
//! use vicinity::Config;
//!
//! let config = Config {
//!     quiescence: Duration::from_secs(2),
//!     ..Default::default()
//! };
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{NoopTelemetry, SparseFileAllocator, TelemetrySink};
use crate::error::ValidationError;
use crate::index::SearchAlgorithm;

/// Database configuration options.
#[derive(Clone)]
pub struct Config {
    /// How often the background worker polls the outdated flag.
    ///
    /// Default: 5 seconds.
    pub poll_interval: Duration,

    /// Minimum quiet period after the last mutation before a background
    /// rebuild may run. Debounces rapid successive writes into a single
    /// rebuild.
    ///
    /// Default: 5 seconds.
    pub quiescence: Duration,

    /// Whether to run the background reindex worker at all.
    ///
    /// Default: `true`.
    pub background_reindex: bool,

    /// Index-backed algorithms the search service maintains.
    ///
    /// Default: k-d tree and ball tree. The linear scan is always
    /// available and must not appear here.
    pub maintained_indexes: Vec<SearchAlgorithm>,

    /// Optional sparse-file allocation service used to preallocate save
    /// targets.
    pub sparse_allocator: Option<Arc<dyn SparseFileAllocator>>,

    /// Telemetry sink for operational counters. Defaults to a no-op sink;
    /// the database functions fully with telemetry disabled.
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("poll_interval", &self.poll_interval)
            .field("quiescence", &self.quiescence)
            .field("background_reindex", &self.background_reindex)
            .field("maintained_indexes", &self.maintained_indexes)
            .field("sparse_allocator", &self.sparse_allocator.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            quiescence: Duration::from_secs(5),
            background_reindex: true,
            maintained_indexes: vec![SearchAlgorithm::KdTree, SearchAlgorithm::BallTree],
            sparse_allocator: None,
            telemetry: Arc::new(NoopTelemetry),
        }
    }
}

impl Config {
    /// Creates a Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// Called automatically by database construction; can also be called
    /// explicitly beforehand.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `poll_interval` or `quiescence` is zero while the background
    ///   worker is enabled
    /// - `maintained_indexes` contains `Linear` or a duplicate entry
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.background_reindex {
            if self.poll_interval.is_zero() {
                return Err(ValidationError::invalid_argument(
                    "poll_interval",
                    "must be greater than zero",
                ));
            }
            if self.quiescence.is_zero() {
                return Err(ValidationError::invalid_argument(
                    "quiescence",
                    "must be greater than zero",
                ));
            }
        }

        for (i, algorithm) in self.maintained_indexes.iter().enumerate() {
            if !algorithm.is_index() {
                return Err(ValidationError::invalid_argument(
                    "maintained_indexes",
                    "the linear scan is always available and carries no index",
                ));
            }
            if self.maintained_indexes[..i].contains(algorithm) {
                return Err(ValidationError::invalid_argument(
                    "maintained_indexes",
                    "duplicate algorithm entry",
                ));
            }
        }

        Ok(())
    }
}
