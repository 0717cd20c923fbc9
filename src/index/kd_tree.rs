//! K-d tree index (see <https://en.wikipedia.org/wiki/K-d_tree>).
//!
//! Built by recursive sort-median splits over a snapshot: at depth `d` the
//! split axis is `d mod dimensions`, the pivot is the lower median of the
//! slice sorted on that axis, and the strict sub-slices recurse at `d + 1`.
//! Sort-based median selection keeps the tree balanced by construction and
//! query cost logarithmic on average.

use std::cmp::Ordering;
use std::io::{Read, Write};

use crate::collection::VectorList;
use crate::error::{Result, ValidationError};
use crate::types::VectorId;
use crate::vector::Vector;

use super::{
    read_records, reconstruct, validate_query, write_records, NodeRecord, SearchAlgorithm,
    SpatialIndex,
};

/// Balanced k-d tree over a snapshot of vectors.
#[derive(Debug, Default)]
pub struct KdTree {
    root: Option<Box<KdNode>>,
}

#[derive(Clone, Debug)]
struct KdNode {
    vector: Vector,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

impl KdTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the tree has no root.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn build_node(mut vectors: Vec<Vector>, depth: usize) -> Option<Box<KdNode>> {
        if vectors.is_empty() {
            return None;
        }
        let dims = vectors[0].dimensions();
        if dims == 0 {
            return None;
        }

        let axis = depth % dims;
        // Stable sort: equal axis values keep insertion order, which makes
        // the tree shape deterministic for a given snapshot.
        vectors.sort_by(|a, b| {
            a.component(axis)
                .partial_cmp(&b.component(axis))
                .unwrap_or(Ordering::Equal)
        });

        let median = vectors.len() / 2;
        let right = vectors.split_off(median + 1);
        let pivot = vectors.pop()?;

        Some(Box::new(KdNode {
            vector: pivot,
            left: Self::build_node(vectors, depth + 1),
            right: Self::build_node(right, depth + 1),
        }))
    }

    /// Branch-and-bound descent. The near side (the child on the query's
    /// side of the splitting hyperplane) is explored first; the far side
    /// only when fewer than `k` candidates exist or the hyperplane is
    /// closer than the current worst kept distance.
    fn nearest_into(
        node: &KdNode,
        query: &Vector,
        k: usize,
        depth: usize,
        best: &mut Vec<(f32, Vector)>,
    ) {
        let axis = depth % query.dimensions();
        let (near, far) = if node.vector.component(axis) > query.component(axis) {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(n) = near {
            Self::nearest_into(n, query, k, depth + 1, best);
        }

        let distance = node.vector.distance_to(query);
        best.push((distance, node.vector.clone()));
        // sort_by is stable, so equal distances keep discovery order.
        best.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        best.truncate(k);

        let plane = (node.vector.component(axis) - query.component(axis)).abs();
        let worst = best.last().map_or(f32::INFINITY, |(d, _)| *d);
        if best.len() < k || plane < worst {
            if let Some(f) = far {
                Self::nearest_into(f, query, k, depth + 1, best);
            }
        }
    }

    fn range_into(
        node: &KdNode,
        query: &Vector,
        radius: f32,
        depth: usize,
        out: &mut Vec<(f32, Vector)>,
    ) {
        let distance = node.vector.distance_to(query);
        if distance <= radius {
            out.push((distance, node.vector.clone()));
        }

        let axis = depth % query.dimensions();
        let plane = node.vector.component(axis) - query.component(axis);
        let (near, far) = if plane > 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(n) = near {
            Self::range_into(n, query, radius, depth + 1, out);
        }
        // The far half-space can only contain matches if the hyperplane
        // itself is within the radius.
        if plane.abs() <= radius {
            if let Some(f) = far {
                Self::range_into(f, query, radius, depth + 1, out);
            }
        }
    }

    fn collect_records(node: &KdNode, records: &mut Vec<NodeRecord>) {
        records.push(NodeRecord {
            center: node.vector.id,
            left: node
                .left
                .as_ref()
                .map_or_else(VectorId::nil, |n| n.vector.id),
            right: node
                .right
                .as_ref()
                .map_or_else(VectorId::nil, |n| n.vector.id),
        });
        if let Some(l) = &node.left {
            Self::collect_records(l, records);
        }
        if let Some(r) = &node.right {
            Self::collect_records(r, records);
        }
    }

    fn count_nodes(node: &Option<Box<KdNode>>) -> usize {
        node.as_ref().map_or(0, |n| {
            1 + Self::count_nodes(&n.left) + Self::count_nodes(&n.right)
        })
    }

    fn nodes_equal(a: &Option<Box<KdNode>>, b: &Option<Box<KdNode>>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(x), Some(y)) => {
                x.vector.id == y.vector.id
                    && Self::nodes_equal(&x.left, &y.left)
                    && Self::nodes_equal(&x.right, &y.right)
            }
            _ => false,
        }
    }
}

impl SpatialIndex for KdTree {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::KdTree
    }

    fn build(&mut self, vectors: &[Vector]) {
        self.root = Self::build_node(vectors.to_vec(), 0);
    }

    fn node_count(&self) -> usize {
        Self::count_nodes(&self.root)
    }

    /// Results are sorted ascending by distance; equal distances keep
    /// discovery order (stable sort).
    fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<Vector>> {
        validate_query(query, k)?;

        let mut best = Vec::new();
        if let Some(root) = &self.root {
            Self::nearest_into(root, query, k, 0, &mut best);
        }
        Ok(best.into_iter().map(|(_, v)| v).collect())
    }

    fn range(&self, query: &Vector, radius: f32) -> Option<Result<Vec<Vector>>> {
        Some(self.range_native(query, radius))
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> {
        let mut records = Vec::with_capacity(self.node_count());
        if let Some(root) = &self.root {
            Self::collect_records(root, &mut records);
        }
        write_records(writer, &records)
    }

    fn load(&mut self, reader: &mut dyn Read, vectors: &VectorList) -> Result<()> {
        let records = read_records(reader)?;
        self.root = reconstruct(&records, vectors, &mut |vector, left, right| KdNode {
            vector,
            left: left.map(Box::new),
            right: right.map(Box::new),
        })?
        .map(Box::new);
        Ok(())
    }
}

impl KdTree {
    fn range_native(&self, query: &Vector, radius: f32) -> Result<Vec<Vector>> {
        if radius.is_nan() || radius < 0.0 {
            return Err(
                ValidationError::invalid_argument("radius", "must be non-negative").into(),
            );
        }
        if query.dimensions() == 0 {
            return Err(ValidationError::invalid_argument(
                "query",
                "must have at least one dimension",
            )
            .into());
        }

        let mut out = Vec::new();
        if let Some(root) = &self.root {
            Self::range_into(root, query, radius, 0, &mut out);
        }
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        Ok(out.into_iter().map(|(_, v)| v).collect())
    }
}

/// Structural equality: same pivot ids in the same shape.
impl PartialEq for KdTree {
    fn eq(&self, other: &Self) -> bool {
        Self::nodes_equal(&self.root, &other.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn v(values: &[f32]) -> Vector {
        Vector::new(values.to_vec())
    }

    fn build_tree(vectors: &[Vector]) -> KdTree {
        let mut tree = KdTree::new();
        tree.build(vectors);
        tree
    }

    #[test]
    fn test_empty_input_builds_empty_tree() {
        let tree = build_tree(&[]);
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 0);
    }

    #[test]
    fn test_zero_dimensional_input_builds_empty_tree() {
        let tree = build_tree(&[v(&[]), v(&[])]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_build_is_deterministic() {
        let vectors: Vec<Vector> = (0..17).map(|i| v(&[(i * 7 % 13) as f32, i as f32])).collect();
        let a = build_tree(&vectors);
        let b = build_tree(&vectors);
        assert_eq!(a, b);
        assert_eq!(a.node_count(), 17);
    }

    #[test]
    fn test_nearest_example_scenario() {
        // A=[0,0], B=[1,1], C=[5,5], D=[1,0]; query [0,0], k=2 → A first.
        let a = v(&[0.0, 0.0]);
        let b = v(&[1.0, 1.0]);
        let c = v(&[5.0, 5.0]);
        let d = v(&[1.0, 0.0]);
        let tree = build_tree(&[a.clone(), b.clone(), c, d.clone()]);

        let results = tree.nearest(&v(&[0.0, 0.0]), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, a.id);
        assert_eq!(results[1].id, d.id, "D at distance 1 beats B at sqrt(2)");
    }

    #[test]
    fn test_nearest_returns_k_sorted_ascending() {
        let vectors: Vec<Vector> = (0..50).map(|i| v(&[i as f32, (i * 3 % 11) as f32])).collect();
        let tree = build_tree(&vectors);

        let query = v(&[20.0, 5.0]);
        let results = tree.nearest(&query, 10).unwrap();
        assert_eq!(results.len(), 10);
        let distances: Vec<f32> = results.iter().map(|r| r.distance_to(&query)).collect();
        for w in distances.windows(2) {
            assert!(w[0] <= w[1], "distances not non-decreasing: {distances:?}");
        }
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let vectors: Vec<Vector> = (0..40)
            .map(|i| v(&[(i * 13 % 29) as f32, (i * 7 % 17) as f32, (i % 5) as f32]))
            .collect();
        let tree = build_tree(&vectors);
        let query = v(&[3.0, 8.0, 2.0]);

        let mut expected: Vec<(f32, VectorId)> = vectors
            .iter()
            .map(|x| (x.distance_to(&query), x.id))
            .collect();
        expected.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let results = tree.nearest(&query, 5).unwrap();
        let got: Vec<f32> = results.iter().map(|r| r.distance_to(&query)).collect();
        let want: Vec<f32> = expected.iter().take(5).map(|(d, _)| *d).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_nearest_k_larger_than_collection() {
        let vectors: Vec<Vector> = (0..3).map(|i| v(&[i as f32])).collect();
        let tree = build_tree(&vectors);
        let results = tree.nearest(&v(&[0.0]), 10).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_nearest_zero_k_is_validation_error() {
        let tree = build_tree(&[v(&[1.0])]);
        let err = tree.nearest(&v(&[0.0]), 0).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_nearest_zero_dimension_query_is_validation_error() {
        let tree = build_tree(&[v(&[1.0])]);
        let err = tree.nearest(&v(&[]), 1).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_nearest_on_empty_tree_is_empty() {
        let tree = KdTree::new();
        assert!(tree.nearest(&v(&[1.0]), 3).unwrap().is_empty());
    }

    #[test]
    fn test_range_matches_brute_force() {
        let vectors: Vec<Vector> = (0..30)
            .map(|i| v(&[(i % 6) as f32, (i / 6) as f32]))
            .collect();
        let tree = build_tree(&vectors);
        let query = v(&[2.0, 2.0]);
        let radius = 1.5;

        let mut expected: Vec<VectorId> = vectors
            .iter()
            .filter(|x| x.distance_to(&query) <= radius)
            .map(|x| x.id)
            .collect();
        expected.sort();

        let mut got: Vec<VectorId> = tree
            .range(&query, radius)
            .unwrap()
            .unwrap()
            .iter()
            .map(|x| x.id)
            .collect();
        got.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_range_negative_radius_is_validation_error() {
        let tree = build_tree(&[v(&[1.0])]);
        let err = tree.range(&v(&[0.0]), -1.0).unwrap().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_save_load_roundtrip_is_structurally_equal() {
        let vectors: Vec<Vector> = (0..9).map(|i| v(&[i as f32, (8 - i) as f32])).collect();
        let tree = build_tree(&vectors);

        let mut list = VectorList::new();
        for vector in &vectors {
            list.add(vector.clone());
        }

        let mut buf = Vec::new();
        tree.save(&mut buf).unwrap();

        let mut restored = KdTree::new();
        restored.load(&mut Cursor::new(buf), &list).unwrap();
        assert_eq!(restored, tree);
        assert_eq!(restored.node_count(), 9);
    }

    #[test]
    fn test_save_load_empty_tree() {
        let tree = KdTree::new();
        let mut buf = Vec::new();
        tree.save(&mut buf).unwrap();

        let mut restored = KdTree::new();
        restored.load(&mut Cursor::new(buf), &VectorList::new()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored, tree);
    }

    #[test]
    fn test_load_with_missing_vector_is_corruption() {
        let vectors: Vec<Vector> = (0..5).map(|i| v(&[i as f32])).collect();
        let tree = build_tree(&vectors);

        let mut buf = Vec::new();
        tree.save(&mut buf).unwrap();

        // Collection is missing every vector the index references.
        let mut restored = KdTree::new();
        let err = restored
            .load(&mut Cursor::new(buf), &VectorList::new())
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_nearest_ties_keep_discovery_order() {
        // Two vectors equidistant from the query.
        let a = v(&[1.0, 0.0]);
        let b = v(&[-1.0, 0.0]);
        let tree = build_tree(&[a.clone(), b.clone()]);

        let r1 = tree.nearest(&v(&[0.0, 0.0]), 2).unwrap();
        let r2 = tree.nearest(&v(&[0.0, 0.0]), 2).unwrap();
        let ids1: Vec<VectorId> = r1.iter().map(|x| x.id).collect();
        let ids2: Vec<VectorId> = r2.iter().map(|x| x.id).collect();
        assert_eq!(ids1, ids2, "tie-break must be consistent across calls");
    }
}
