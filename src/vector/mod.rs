//! The vector record and its distance metrics.
//!
//! A [`Vector`] is immutable after creation: a stable [`VectorId`], the f32
//! component values, the optional source text the vector was generated from,
//! and tag metadata. Equality and distance are defined over the component
//! values; identity (the id) is the only cross-reference key used by indexes
//! and the persistence format.

pub mod distance;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::VectorId;

/// A fixed-length ordered sequence of f32 values plus a stable identifier,
/// optional source text, and tag metadata.
///
/// # Example
/// ```
/// use vicinity::Vector;
///
/// let v = Vector::with_text(vec![1.0, 2.0, 3.0], "three numbers");
/// assert_eq!(v.dimensions(), 3);
/// assert_eq!(v.original_text.as_deref(), Some("three numbers"));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vector {
    /// Stable unique identifier, preserved across save/load cycles.
    pub id: VectorId,

    /// The vector components. Never mutated after creation.
    pub values: Vec<f32>,

    /// The text this vector was generated from, if any.
    pub original_text: Option<String>,

    /// Tag metadata used by the collection's tag map.
    pub tags: Vec<String>,
}

impl Vector {
    /// Creates a vector from raw values with a fresh id.
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            id: VectorId::new(),
            values,
            original_text: None,
            tags: Vec::new(),
        }
    }

    /// Creates a vector from values and the text it embeds.
    pub fn with_text(values: Vec<f32>, text: impl Into<String>) -> Self {
        Self {
            original_text: Some(text.into()),
            ..Self::new(values)
        }
    }

    /// Creates a vector with text and tags.
    pub fn with_tags(
        values: Vec<f32>,
        text: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: VectorId::new(),
            values,
            original_text: text,
            tags,
        }
    }

    /// Number of dimensions (derived from the values).
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    /// Component at `axis`, or 0.0 past the end.
    ///
    /// Out-of-range components read as zero so vectors of differing
    /// dimension remain comparable.
    #[inline]
    pub fn component(&self, axis: usize) -> f32 {
        self.values.get(axis).copied().unwrap_or(0.0)
    }

    /// Euclidean magnitude of the element-wise difference to `other`.
    ///
    /// This is the default ranking distance. Missing components of the
    /// shorter vector are treated as zero.
    pub fn distance_to(&self, other: &Vector) -> f32 {
        let dims = self.dimensions().max(other.dimensions());
        let sum: f32 = (0..dims)
            .map(|i| {
                let d = self.component(i) - other.component(i);
                d * d
            })
            .sum();
        sum.sqrt()
    }

    /// Serializes the vector into its self-describing binary payload.
    ///
    /// The payload is length-prefixed by the enclosing database format;
    /// its internal layout is a bincode encoding of the full record.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes a vector from its binary payload.
    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Equality is defined over the component values only.
///
/// Two vectors with the same values but different ids compare equal; use
/// [`Vector::id`] when identity matters.
impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}
