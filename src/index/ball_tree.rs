//! Ball tree index, structurally equivalent to the k-d tree.
//!
//! Each node owns a pivot vector and a bounding radius covering its entire
//! subtree. Build picks the vector nearest the slice centroid as pivot,
//! sorts the rest by distance to it, and recurses on the near and far
//! halves. Queries prune subtrees whose bounding ball cannot contain a
//! better candidate (triangle inequality).
//!
//! The persisted form is the shared id-triple contract; radii are derived
//! data and are recomputed from the reconstructed subtrees on load.

use std::cmp::Ordering;
use std::io::{Read, Write};

use crate::collection::VectorList;
use crate::error::Result;
use crate::types::VectorId;
use crate::vector::Vector;

use super::{
    read_records, reconstruct, validate_query, write_records, NodeRecord, SearchAlgorithm,
    SpatialIndex,
};

/// Ball tree over a snapshot of vectors. No native range support; the
/// search service falls back to a linear scan.
#[derive(Debug, Default)]
pub struct BallTree {
    root: Option<Box<BallNode>>,
}

#[derive(Clone, Debug)]
struct BallNode {
    vector: Vector,
    radius: f32,
    left: Option<Box<BallNode>>,
    right: Option<Box<BallNode>>,
}

impl BallTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the tree has no root.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn build_node(vectors: Vec<Vector>) -> Option<Box<BallNode>> {
        if vectors.is_empty() {
            return None;
        }
        let dims = vectors.iter().map(Vector::dimensions).max()?;
        if dims == 0 {
            return None;
        }

        // Pivot: the vector nearest the slice centroid, first index wins.
        let mut centroid = vec![0.0f32; dims];
        for vector in &vectors {
            for (i, c) in centroid.iter_mut().enumerate() {
                *c += vector.component(i);
            }
        }
        let n = vectors.len() as f32;
        for c in &mut centroid {
            *c /= n;
        }
        let centroid = Vector::new(centroid);

        let mut pivot_idx = 0;
        let mut best = f32::INFINITY;
        for (i, vector) in vectors.iter().enumerate() {
            let d = vector.distance_to(&centroid);
            if d < best {
                best = d;
                pivot_idx = i;
            }
        }

        let mut vectors = vectors;
        let pivot = vectors.remove(pivot_idx);

        let mut by_distance: Vec<(f32, Vector)> = vectors
            .into_iter()
            .map(|v| (v.distance_to(&pivot), v))
            .collect();
        by_distance.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let radius = by_distance.last().map_or(0.0, |(d, _)| *d);
        let median = by_distance.len() / 2;
        let far: Vec<Vector> = by_distance.split_off(median).into_iter().map(|(_, v)| v).collect();
        let near: Vec<Vector> = by_distance.into_iter().map(|(_, v)| v).collect();

        Some(Box::new(BallNode {
            vector: pivot,
            radius,
            left: Self::build_node(near),
            right: Self::build_node(far),
        }))
    }

    fn nearest_into(node: &BallNode, query: &Vector, k: usize, best: &mut Vec<(f32, Vector)>) {
        let distance = node.vector.distance_to(query);
        best.push((distance, node.vector.clone()));
        best.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        best.truncate(k);

        // Visit the child whose bounding ball is nearer first; prune any
        // ball that cannot beat the current worst kept distance.
        let mut children: Vec<(&BallNode, f32)> = node
            .left
            .iter()
            .chain(node.right.iter())
            .map(|child| {
                let bound = query.distance_to(&child.vector) - child.radius;
                (child.as_ref(), bound)
            })
            .collect();
        children.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        for (child, bound) in children {
            let worst = best.last().map_or(f32::INFINITY, |(d, _)| *d);
            if best.len() < k || bound < worst {
                Self::nearest_into(child, query, k, best);
            }
        }
    }

    fn collect_records(node: &BallNode, records: &mut Vec<NodeRecord>) {
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

    fn count_nodes(node: &Option<Box<BallNode>>) -> usize {
        node.as_ref().map_or(0, |n| {
            1 + Self::count_nodes(&n.left) + Self::count_nodes(&n.right)
        })
    }

    fn subtree_max_distance(node: &BallNode, from: &Vector) -> f32 {
        let mut max = from.distance_to(&node.vector);
        if let Some(l) = &node.left {
            max = max.max(Self::subtree_max_distance(l, from));
        }
        if let Some(r) = &node.right {
            max = max.max(Self::subtree_max_distance(r, from));
        }
        max
    }

    /// Recomputes the derived radii bottom-up after reconstruction.
    fn fix_radii(node: &mut BallNode) {
        if let Some(l) = &mut node.left {
            Self::fix_radii(l);
        }
        if let Some(r) = &mut node.right {
            Self::fix_radii(r);
        }
        let mut radius = 0.0f32;
        if let Some(l) = &node.left {
            radius = radius.max(Self::subtree_max_distance(l, &node.vector));
        }
        if let Some(r) = &node.right {
            radius = radius.max(Self::subtree_max_distance(r, &node.vector));
        }
        node.radius = radius;
    }

    fn nodes_equal(a: &Option<Box<BallNode>>, b: &Option<Box<BallNode>>) -> bool {
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

impl SpatialIndex for BallTree {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::BallTree
    }

    fn build(&mut self, vectors: &[Vector]) {
        self.root = Self::build_node(vectors.to_vec());
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
            Self::nearest_into(root, query, k, &mut best);
        }
        Ok(best.into_iter().map(|(_, v)| v).collect())
    }

    fn range(&self, _query: &Vector, _radius: f32) -> Option<Result<Vec<Vector>>> {
        None
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
        self.root = reconstruct(&records, vectors, &mut |vector, left, right| BallNode {
            vector,
            radius: 0.0,
            left: left.map(Box::new),
            right: right.map(Box::new),
        })?
        .map(Box::new);
        if let Some(root) = &mut self.root {
            Self::fix_radii(root);
        }
        Ok(())
    }
}

/// Structural equality: same pivot ids in the same shape. Radii are
/// derived data and do not participate.
impl PartialEq for BallTree {
    fn eq(&self, other: &Self) -> bool {
        Self::nodes_equal(&self.root, &other.root)
    }
}
