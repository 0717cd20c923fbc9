//! Spatial index engine.
//!
//! Indexes build a balanced partition over a snapshot of vectors and answer
//! nearest-k (and, where native, range) queries. All indexes share one
//! persistence contract: a version tag, a node count, and one id triple per
//! node `{pivot, left, right}` in pre-order, with the nil id as the "no
//! child" sentinel. Loading reconstructs structural links by id lookup
//! against the already-loaded collection, never by raw offsets, so index
//! files stay valid across re-insert or reorder of the vector storage as
//! long as ids are unchanged.

mod ball_tree;
mod kd_tree;

pub use ball_tree::BallTree;
pub use kd_tree::KdTree;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::collection::VectorList;
use crate::error::{Result, StorageError};
use crate::types::VectorId;
use crate::vector::Vector;

/// Version tag written at the head of each index blob.
pub(crate) const INDEX_FORMAT_VERSION: i32 = 1;

/// Search algorithm selector used by the dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SearchAlgorithm {
    /// Balanced k-d tree; native nearest-k and range.
    KdTree,
    /// Ball tree; native nearest-k, range falls back to linear scan.
    BallTree,
    /// Exhaustive scan over the collection. Always available.
    Linear,
}

impl SearchAlgorithm {
    /// True for algorithms backed by a buildable index structure.
    pub fn is_index(&self) -> bool {
        !matches!(self, Self::Linear)
    }

    /// Numeric tag used in the persisted index section.
    pub(crate) fn tag(&self) -> i32 {
        match self {
            Self::KdTree => 1,
            Self::BallTree => 2,
            Self::Linear => 0,
        }
    }

    /// Reverse of [`tag`](Self::tag); `None` for unknown tags.
    pub(crate) fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            1 => Some(Self::KdTree),
            2 => Some(Self::BallTree),
            0 => Some(Self::Linear),
            _ => None,
        }
    }
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KdTree => write!(f, "kd-tree"),
            Self::BallTree => write!(f, "ball-tree"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// A spatial index over a point-in-time snapshot of vectors.
///
/// Implementations own their node structures exclusively (parent owns
/// children, no back-references) and persist themselves through the shared
/// id-triple contract.
pub trait SpatialIndex: Send + Sync {
    /// The algorithm this index implements.
    fn algorithm(&self) -> SearchAlgorithm;

    /// Rebuilds the index from a snapshot, replacing previous contents.
    fn build(&mut self, vectors: &[Vector]);

    /// Number of nodes in the index.
    fn node_count(&self) -> usize;

    /// The `k` nearest vectors to `query`, ascending by distance.
    ///
    /// # Errors
    ///
    /// Validation error if `k` is zero or the query has no dimensions.
    fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<Vector>>;

    /// Vectors within `radius` of `query`, ascending by distance, or
    /// `None` if the index has no native range support (the search
    /// service then falls back to a linear scan).
    fn range(&self, query: &Vector, radius: f32) -> Option<Result<Vec<Vector>>>;

    /// Writes the index blob (version, node count, id triples).
    fn save(&self, writer: &mut dyn Write) -> Result<()>;

    /// Reads an index blob, resolving ids against `vectors`.
    ///
    /// # Errors
    ///
    /// Corruption error for version mismatches, unresolvable pivot ids,
    /// or non-nil unresolvable child ids.
    fn load(&mut self, reader: &mut dyn Read, vectors: &VectorList) -> Result<()>;
}

/// Validates shared nearest/range query preconditions.
pub(crate) fn validate_query(query: &Vector, k: usize) -> Result<()> {
    if k == 0 {
        return Err(crate::error::ValidationError::invalid_argument(
            "k",
            "must be greater than 0",
        )
        .into());
    }
    if query.dimensions() == 0 {
        return Err(crate::error::ValidationError::invalid_argument(
            "query",
            "must have at least one dimension",
        )
        .into());
    }
    Ok(())
}

/// One persisted node: pivot id plus child pivot ids (nil = no child).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NodeRecord {
    pub(crate) center: VectorId,
    pub(crate) left: VectorId,
    pub(crate) right: VectorId,
}

pub(crate) fn write_id(writer: &mut dyn Write, id: VectorId) -> Result<()> {
    writer.write_all(id.as_bytes())?;
    Ok(())
}

pub(crate) fn read_id(reader: &mut dyn Read) -> Result<VectorId> {
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf)?;
    Ok(VectorId::from_bytes(buf))
}

/// Writes the shared blob layout: version, count, pre-order id triples.
pub(crate) fn write_records(writer: &mut dyn Write, records: &[NodeRecord]) -> Result<()> {
    writer.write_i32::<LittleEndian>(INDEX_FORMAT_VERSION)?;
    writer.write_i32::<LittleEndian>(records.len() as i32)?;
    for record in records {
        write_id(writer, record.center)?;
        write_id(writer, record.left)?;
        write_id(writer, record.right)?;
    }
    Ok(())
}

/// Reads the shared blob layout, failing closed on unknown versions.
pub(crate) fn read_records(reader: &mut dyn Read) -> Result<Vec<NodeRecord>> {
    let version = reader.read_i32::<LittleEndian>()?;
    if version != INDEX_FORMAT_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: version,
            supported: INDEX_FORMAT_VERSION,
        }
        .into());
    }
    let count = reader.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(StorageError::corrupted(format!("negative index node count: {count}")).into());
    }
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(NodeRecord {
            center: read_id(reader)?,
            left: read_id(reader)?,
            right: read_id(reader)?,
        });
    }
    Ok(records)
}

/// Rebuilds an owned node tree from persisted records.
///
/// The first record is the root (pre-order layout). `make` assembles one
/// node from its resolved pivot vector and already-built children.
pub(crate) fn reconstruct<N>(
    records: &[NodeRecord],
    vectors: &VectorList,
    make: &mut dyn FnMut(Vector, Option<N>, Option<N>) -> N,
) -> Result<Option<N>> {
    if records.is_empty() {
        return Ok(None);
    }

    let mut children: HashMap<VectorId, (VectorId, VectorId)> = HashMap::new();
    for record in records {
        if children
            .insert(record.center, (record.left, record.right))
            .is_some()
        {
            return Err(StorageError::corrupted(format!(
                "duplicate index node record for vector {}",
                record.center
            ))
            .into());
        }
    }

    let mut visited = HashSet::new();
    let root = build_node(records[0].center, &children, vectors, &mut visited, make)?;
    Ok(Some(root))
}

fn build_node<N>(
    id: VectorId,
    children: &HashMap<VectorId, (VectorId, VectorId)>,
    vectors: &VectorList,
    visited: &mut HashSet<VectorId>,
    make: &mut dyn FnMut(Vector, Option<N>, Option<N>) -> N,
) -> Result<N> {
    if !visited.insert(id) {
        return Err(StorageError::corrupted(format!("index node cycle at vector {id}")).into());
    }

    let pivot = vectors
        .get_by_id(id)
        .cloned()
        .ok_or(StorageError::UnresolvedVector(id))?;

    let &(left_id, right_id) = children
        .get(&id)
        .ok_or_else(|| StorageError::corrupted(format!("missing index node record for {id}")))?;

    let left = if left_id.is_nil() {
        None
    } else {
        Some(build_node(left_id, children, vectors, visited, make)?)
    };
    let right = if right_id.is_nil() {
        None
    } else {
        Some(build_node(right_id, children, vectors, visited, make)?)
    };

    Ok(make(pivot, left, right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_algorithm_tag_roundtrip() {
        for algo in [
            SearchAlgorithm::KdTree,
            SearchAlgorithm::BallTree,
            SearchAlgorithm::Linear,
        ] {
            assert_eq!(SearchAlgorithm::from_tag(algo.tag()), Some(algo));
        }
        assert_eq!(SearchAlgorithm::from_tag(99), None);
    }

    #[test]
    fn test_linear_is_not_an_index() {
        assert!(!SearchAlgorithm::Linear.is_index());
        assert!(SearchAlgorithm::KdTree.is_index());
        assert!(SearchAlgorithm::BallTree.is_index());
    }

    #[test]
    fn test_records_roundtrip() {
        let records = vec![
            NodeRecord {
                center: VectorId::new(),
                left: VectorId::new(),
                right: VectorId::nil(),
            },
            NodeRecord {
                center: VectorId::new(),
                left: VectorId::nil(),
                right: VectorId::nil(),
            },
        ];

        let mut buf = Vec::new();
        write_records(&mut buf, &records).unwrap();
        // version + count + 2 * 3 ids
        assert_eq!(buf.len(), 4 + 4 + 2 * 48);

        let restored = read_records(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, records);
    }

    #[test]
    fn test_read_records_rejects_unknown_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());

        let err = read_records(&mut Cursor::new(buf)).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_reconstruct_unresolvable_center_is_fatal() {
        let vectors = VectorList::new();
        let records = vec![NodeRecord {
            center: VectorId::new(),
            left: VectorId::nil(),
            right: VectorId::nil(),
        }];

        let err = reconstruct::<()>(&records, &vectors, &mut |_, _, _| ())
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_reconstruct_empty_records_is_empty_tree() {
        let vectors = VectorList::new();
        let root = reconstruct::<()>(&[], &vectors, &mut |_, _, _| ()).unwrap();
        assert!(root.is_none());
    }
}
