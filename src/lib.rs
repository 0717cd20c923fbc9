//! # Vicinity
//!
//! Embeddable vector database: an in-memory collection of high-dimensional
//! f32 vectors with persistent storage, tag-based metadata, and
//! nearest-neighbor / range search backed by spatial index structures.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vicinity::{SearchAlgorithm, Vector, VectorDatabase};
//!
//! // Create a database (starts the background reindex worker)
//! let db = VectorDatabase::new()?;
//!
//! // Add vectors
//! db.add_vector(Vector::with_text(vec![0.1, 0.7, 0.2], "a sentence"))?;
//!
//! // Build indexes and search
//! db.rebuild_search_indexes(None)?;
//! let nearest = db.search(&Vector::new(vec![0.1, 0.6, 0.3]), 5,
//!                         SearchAlgorithm::KdTree, None)?;
//!
//! // Persist and shut down
//! db.save("./data", None)?;
//! db.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Vectors and identity
//!
//! A [`Vector`] is immutable after creation: component values, optional
//! source text, and tags under a stable [`VectorId`]. Ids survive
//! save/load cycles and are the only cross-reference key between indexes
//! and the collection.
//!
//! ### Spatial indexes
//!
//! The search service maintains a k-d tree and a ball tree over snapshots
//! of the collection, with an always-available linear scan as the baseline
//! and fallback. Indexes persist as id triples and are reconstructed by id
//! lookup on load.
//!
//! ### Background maintenance
//!
//! Mutations mark the database dirty and outdated. A low-impact worker
//! thread debounces rapid writes and rebuilds the tag map and indexes once
//! the collection has been quiet for the configured window.
//!
//! ## Thread Safety
//!
//! [`VectorDatabase`] is `Send + Sync` and can be shared across threads
//! using `Arc`. A single reader-writer lock guards the collection and the
//! search indexes; rebuilds run on owned snapshots outside the lock.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod db;
mod error;
mod types;

pub mod adapters;
pub mod embedding;
pub mod storage;

mod collection;
mod search;

/// Spatial index engine: k-d tree, ball tree, and the shared persistence
/// contract.
pub mod index;

/// The vector record and distance metrics.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main database interface
pub use db::VectorDatabase;

// Configuration
pub use config::Config;

// Error handling
pub use error::{Result, StorageError, ValidationError, VicinityError};

// Core types
pub use types::{CancellationToken, VectorId};

// Data model
pub use collection::{VectorList, VectorTags};
pub use vector::Vector;

// Search
pub use index::SearchAlgorithm;
pub use search::SearchService;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common usage.
///
/// ```rust
/// use vicinity::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::db::VectorDatabase;
    pub use crate::error::{Result, VicinityError};
    pub use crate::index::SearchAlgorithm;
    pub use crate::types::{CancellationToken, VectorId};
    pub use crate::vector::Vector;
}
