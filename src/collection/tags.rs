//! Tag metadata map: tag value → set of vector ids.
//!
//! The map is rebuilt wholesale from the live collection, never patched
//! incrementally, so it can't drift from the vector mapping: every id it
//! references exists in the collection at build time.

use std::collections::{HashMap, HashSet};

use crate::types::VectorId;
use crate::vector::Vector;

/// Secondary index from tag values to the ids of vectors carrying them.
#[derive(Debug, Default)]
pub struct VectorTags {
    map: HashMap<String, HashSet<VectorId>>,
}

impl VectorTags {
    /// Creates an empty tag map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the map from scratch over the given vectors.
    pub fn build_map(&mut self, vectors: &[Vector]) {
        self.map.clear();
        for vector in vectors {
            for tag in &vector.tags {
                self.map
                    .entry(tag.clone())
                    .or_default()
                    .insert(vector.id);
            }
        }
    }

    /// Ids of vectors carrying `tag`, if any.
    pub fn ids_for(&self, tag: &str) -> Option<&HashSet<VectorId>> {
        self.map.get(tag)
    }

    /// All known tag values.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if no tags are mapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}
