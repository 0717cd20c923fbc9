//! Search dispatch and index composition.
//!
//! [`SearchService`] owns the maintained spatial indexes (a dispatch table
//! keyed by [`SearchAlgorithm`]), the distance calculator used by linear
//! scans, and the embedding service that resolves text queries to vectors.
//! The linear scan is always available; requesting an algorithm the service
//! does not maintain is a not-supported error, never silently swallowed.

mod linear;

use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::collection::VectorList;
use crate::embedding::{EmbeddingService, ExternalEmbedding};
use crate::error::{Result, StorageError, VicinityError};
use crate::index::{BallTree, KdTree, SearchAlgorithm, SpatialIndex};
use crate::vector::distance::{DistanceMetric, Euclidean};
use crate::vector::Vector;

/// Version tag written at the head of the index section.
const SECTION_FORMAT_VERSION: i32 = 1;

/// Default embedding dimension expected when no generating service is
/// installed (matches common sentence-embedding models).
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Creates an empty index for an index-backed algorithm.
pub(crate) fn make_index(algorithm: SearchAlgorithm) -> Option<Box<dyn SpatialIndex>> {
    match algorithm {
        SearchAlgorithm::KdTree => Some(Box::new(KdTree::new())),
        SearchAlgorithm::BallTree => Some(Box::new(BallTree::new())),
        SearchAlgorithm::Linear => None,
    }
}

/// Composes spatial indexes, the linear fallback, and the embedding
/// generator behind one dispatch surface.
pub struct SearchService {
    indexes: HashMap<SearchAlgorithm, Box<dyn SpatialIndex>>,
    metric: Box<dyn DistanceMetric>,
    embedding: Box<dyn EmbeddingService>,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("maintained", &self.maintained_algorithms())
            .field("metric", &self.metric.name())
            .finish_non_exhaustive()
    }
}

impl Default for SearchService {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchService {
    /// Creates a service maintaining the default indexes (k-d tree and
    /// ball tree) with Euclidean ranking and the external embedding
    /// provider.
    pub fn new() -> Self {
        Self::with_algorithms(&[SearchAlgorithm::KdTree, SearchAlgorithm::BallTree])
    }

    /// Creates a service maintaining exactly the given index algorithms.
    /// Non-index entries (`Linear`) are ignored; the scan needs no index.
    pub fn with_algorithms(algorithms: &[SearchAlgorithm]) -> Self {
        let mut indexes: HashMap<SearchAlgorithm, Box<dyn SpatialIndex>> = HashMap::new();
        for &algorithm in algorithms {
            if let Some(index) = make_index(algorithm) {
                indexes.insert(algorithm, index);
            }
        }
        Self {
            indexes,
            metric: Box::new(Euclidean),
            embedding: Box::new(ExternalEmbedding::new(DEFAULT_EMBEDDING_DIMENSION)),
        }
    }

    /// Replaces the embedding service used for text queries.
    pub fn set_embedding_service(&mut self, embedding: Box<dyn EmbeddingService>) {
        self.embedding = embedding;
    }

    /// The embedding service used for text queries.
    pub fn embedding(&self) -> &dyn EmbeddingService {
        self.embedding.as_ref()
    }

    /// Replaces the distance calculator used by linear ranking.
    pub fn set_distance_metric(&mut self, metric: Box<dyn DistanceMetric>) {
        self.metric = metric;
    }

    /// True if the service maintains an index for `algorithm` (or it is
    /// the always-available linear scan).
    pub fn supports(&self, algorithm: SearchAlgorithm) -> bool {
        algorithm == SearchAlgorithm::Linear || self.indexes.contains_key(&algorithm)
    }

    /// The index-backed algorithms this service maintains, sorted by tag
    /// for deterministic iteration.
    pub fn maintained_algorithms(&self) -> Vec<SearchAlgorithm> {
        let mut algorithms: Vec<SearchAlgorithm> = self.indexes.keys().copied().collect();
        algorithms.sort_by_key(SearchAlgorithm::tag);
        algorithms
    }

    /// Total nodes across maintained indexes (diagnostics).
    pub fn node_count(&self, algorithm: SearchAlgorithm) -> usize {
        self.indexes
            .get(&algorithm)
            .map_or(0, |index| index.node_count())
    }

    /// Resolves text to a vector through the embedding service.
    pub fn generate_vector(&self, text: &str) -> Result<Vector> {
        let values = self.embedding.embed(text)?;
        Ok(Vector::with_text(values, text))
    }

    /// Builds exactly the named index from the snapshot.
    ///
    /// # Errors
    ///
    /// Not-supported if the algorithm is not index-backed or not
    /// maintained by this service.
    pub fn build_index(&mut self, algorithm: SearchAlgorithm, snapshot: &[Vector]) -> Result<()> {
        if !algorithm.is_index() {
            return Err(VicinityError::not_supported(
                "the linear scan does not use an index",
            ));
        }
        let index = self.indexes.get_mut(&algorithm).ok_or_else(|| {
            VicinityError::not_supported(format!("no {algorithm} index is maintained"))
        })?;
        index.build(snapshot);
        debug!(%algorithm, nodes = index.node_count(), "index built");
        Ok(())
    }

    /// Builds every maintained index from the snapshot.
    pub fn build_all_indexes(&mut self, snapshot: &[Vector]) {
        for index in self.indexes.values_mut() {
            index.build(snapshot);
        }
    }

    /// Replaces the maintained indexes wholesale with pre-built ones.
    ///
    /// Used by the database to install indexes built outside its lock.
    pub(crate) fn install_indexes(&mut self, built: Vec<Box<dyn SpatialIndex>>) {
        self.indexes = built
            .into_iter()
            .map(|index| (index.algorithm(), index))
            .collect();
    }

    /// Text k-NN search: embeds `text`, then delegates to [`search`].
    ///
    /// [`search`]: SearchService::search
    pub fn search_text(
        &self,
        vectors: &VectorList,
        text: &str,
        k: usize,
        algorithm: SearchAlgorithm,
        threshold: Option<f32>,
    ) -> Result<Vec<Vector>> {
        let query = self.generate_vector(text)?;
        self.search(vectors, &query, k, algorithm, threshold)
    }

    /// k-NN search dispatched by algorithm.
    ///
    /// `threshold`, when set, drops results farther than the given
    /// distance after ranking.
    ///
    /// # Errors
    ///
    /// Validation error for `k == 0` (and zero-dimension queries on tree
    /// indexes); not-supported for algorithms this service does not
    /// maintain.
    pub fn search(
        &self,
        vectors: &VectorList,
        query: &Vector,
        k: usize,
        algorithm: SearchAlgorithm,
        threshold: Option<f32>,
    ) -> Result<Vec<Vector>> {
        let mut results = match algorithm {
            SearchAlgorithm::Linear => {
                linear::nearest(vectors.as_slice(), query, k, self.metric.as_ref())?
            }
            indexed => {
                let index = self.indexes.get(&indexed).ok_or_else(|| {
                    VicinityError::not_supported(format!(
                        "no {indexed} index is maintained by this search service"
                    ))
                })?;
                index.nearest(query, k)?
            }
        };

        if let Some(max_distance) = threshold {
            results.retain(|v| v.distance_to(query) <= max_distance);
        }
        Ok(results)
    }

    /// Text range search: embeds `text`, then delegates to
    /// [`range_search`].
    ///
    /// [`range_search`]: SearchService::range_search
    pub fn range_search_text(
        &self,
        vectors: &VectorList,
        text: &str,
        radius: f32,
        algorithm: SearchAlgorithm,
        metric: Option<&dyn DistanceMetric>,
    ) -> Result<Vec<Vector>> {
        let query = self.generate_vector(text)?;
        self.range_search(vectors, &query, radius, algorithm, metric)
    }

    /// Range search dispatched by algorithm.
    ///
    /// Algorithms without native range support fall back to the linear
    /// scan. `metric` overrides the injected calculator for scans; native
    /// index range search is inherently Euclidean.
    ///
    /// # Errors
    ///
    /// Validation error for negative or NaN radius; not-supported for
    /// algorithms this service does not maintain.
    pub fn range_search(
        &self,
        vectors: &VectorList,
        query: &Vector,
        radius: f32,
        algorithm: SearchAlgorithm,
        metric: Option<&dyn DistanceMetric>,
    ) -> Result<Vec<Vector>> {
        if radius.is_nan() || radius < 0.0 {
            return Err(crate::error::ValidationError::invalid_argument(
                "radius",
                "must be non-negative",
            )
            .into());
        }

        let scan_metric = metric.unwrap_or(self.metric.as_ref());
        match algorithm {
            SearchAlgorithm::Linear => {
                linear::range(vectors.as_slice(), query, radius, scan_metric)
            }
            indexed => {
                let index = self.indexes.get(&indexed).ok_or_else(|| {
                    VicinityError::not_supported(format!(
                        "no {indexed} index is maintained by this search service"
                    ))
                })?;
                match index.range(query, radius) {
                    Some(native) => native,
                    None => {
                        debug!(algorithm = %indexed, "no native range support; using linear scan");
                        linear::range(vectors.as_slice(), query, radius, scan_metric)
                    }
                }
            }
        }
    }

    /// Writes the index section: section version, index count, then each
    /// maintained index (algorithm tag + blob) in tag order.
    pub fn save(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_i32::<LittleEndian>(SECTION_FORMAT_VERSION)?;
        let algorithms = self.maintained_algorithms();
        writer.write_i32::<LittleEndian>(algorithms.len() as i32)?;
        for algorithm in algorithms {
            writer.write_i32::<LittleEndian>(algorithm.tag())?;
            if let Some(index) = self.indexes.get(&algorithm) {
                index.save(writer)?;
            }
        }
        Ok(())
    }

    /// Reads the index section, replacing the maintained set with the
    /// indexes the file contains. Fails closed on unknown section
    /// versions and unknown algorithm tags.
    pub fn load(&mut self, reader: &mut dyn Read, vectors: &VectorList) -> Result<()> {
        let version = reader.read_i32::<LittleEndian>()?;
        if version != SECTION_FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: version,
                supported: SECTION_FORMAT_VERSION,
            }
            .into());
        }

        let count = reader.read_i32::<LittleEndian>()?;
        if count < 0 {
            return Err(
                StorageError::corrupted(format!("negative index section count: {count}")).into(),
            );
        }

        let mut loaded: HashMap<SearchAlgorithm, Box<dyn SpatialIndex>> = HashMap::new();
        for _ in 0..count {
            let tag = reader.read_i32::<LittleEndian>()?;
            let algorithm = SearchAlgorithm::from_tag(tag).ok_or_else(|| {
                StorageError::corrupted(format!("unknown index algorithm tag: {tag}"))
            })?;
            let mut index = make_index(algorithm).ok_or_else(|| {
                StorageError::corrupted(format!("algorithm {algorithm} cannot carry an index"))
            })?;
            index.load(reader, vectors)?;
            loaded.insert(algorithm, index);
        }

        self.indexes = loaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn v(values: &[f32]) -> Vector {
        Vector::new(values.to_vec())
    }

    fn populated_service() -> (SearchService, VectorList) {
        let mut list = VectorList::new();
        for i in 0..20 {
            list.add(v(&[i as f32, (i * 3 % 7) as f32]));
        }
        let mut service = SearchService::new();
        service.build_all_indexes(list.as_slice());
        (service, list)
    }

    #[test]
    fn test_default_maintains_both_trees() {
        let service = SearchService::new();
        assert!(service.supports(SearchAlgorithm::KdTree));
        assert!(service.supports(SearchAlgorithm::BallTree));
        assert!(service.supports(SearchAlgorithm::Linear));
    }

    #[test]
    fn test_all_algorithms_agree_on_nearest() {
        let (service, list) = populated_service();
        let query = v(&[7.0, 2.0]);

        let by_linear = service
            .search(&list, &query, 5, SearchAlgorithm::Linear, None)
            .unwrap();
        let by_kd = service
            .search(&list, &query, 5, SearchAlgorithm::KdTree, None)
            .unwrap();
        let by_ball = service
            .search(&list, &query, 5, SearchAlgorithm::BallTree, None)
            .unwrap();

        let d = |r: &[Vector]| -> Vec<f32> { r.iter().map(|x| x.distance_to(&query)).collect() };
        assert_eq!(d(&by_linear), d(&by_kd));
        assert_eq!(d(&by_linear), d(&by_ball));
    }

    #[test]
    fn test_unmaintained_algorithm_is_not_supported() {
        let mut list = VectorList::new();
        list.add(v(&[1.0]));
        let mut service = SearchService::with_algorithms(&[SearchAlgorithm::KdTree]);
        service.build_all_indexes(list.as_slice());

        let err = service
            .search(&list, &v(&[0.0]), 1, SearchAlgorithm::BallTree, None)
            .unwrap_err();
        assert!(err.is_not_supported());

        let err = service
            .range_search(&list, &v(&[0.0]), 1.0, SearchAlgorithm::BallTree, None)
            .unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_build_index_for_linear_is_not_supported() {
        let mut service = SearchService::new();
        let err = service
            .build_index(SearchAlgorithm::Linear, &[])
            .unwrap_err();
        assert!(err.is_not_supported());
    }

    #[test]
    fn test_threshold_filters_by_distance() {
        let mut list = VectorList::new();
        list.add(v(&[0.0]));
        list.add(v(&[10.0]));
        let mut service = SearchService::new();
        service.build_all_indexes(list.as_slice());

        let results = service
            .search(&list, &v(&[0.0]), 10, SearchAlgorithm::KdTree, Some(1.0))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].values, vec![0.0]);
    }

    #[test]
    fn test_range_search_ball_tree_falls_back_to_linear() {
        let (service, list) = populated_service();
        let query = v(&[5.0, 2.0]);

        let by_ball = service
            .range_search(&list, &query, 3.0, SearchAlgorithm::BallTree, None)
            .unwrap();
        let by_linear = service
            .range_search(&list, &query, 3.0, SearchAlgorithm::Linear, None)
            .unwrap();
        assert_eq!(by_ball.len(), by_linear.len());
    }

    #[test]
    fn test_range_search_negative_radius_is_validation_error() {
        let (service, list) = populated_service();
        let err = service
            .range_search(&list, &v(&[0.0, 0.0]), -1.0, SearchAlgorithm::Linear, None)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_search_text_without_generator_is_embedding_error() {
        let (service, list) = populated_service();
        let err = service
            .search_text(&list, "hello", 3, SearchAlgorithm::KdTree, None)
            .unwrap_err();
        assert!(matches!(err, VicinityError::Embedding(_)));
    }

    #[test]
    fn test_section_roundtrip_preserves_structure() {
        let (service, list) = populated_service();

        let mut buf = Vec::new();
        service.save(&mut buf).unwrap();

        let mut restored = SearchService::with_algorithms(&[]);
        restored.load(&mut Cursor::new(buf), &list).unwrap();

        assert_eq!(
            restored.maintained_algorithms(),
            service.maintained_algorithms()
        );
        assert_eq!(
            restored.node_count(SearchAlgorithm::KdTree),
            service.node_count(SearchAlgorithm::KdTree)
        );

        // The reloaded indexes answer queries identically.
        let query = v(&[3.0, 1.0]);
        let before = service
            .search(&list, &query, 4, SearchAlgorithm::KdTree, None)
            .unwrap();
        let after = restored
            .search(&list, &query, 4, SearchAlgorithm::KdTree, None)
            .unwrap();
        let ids = |r: &[Vector]| -> Vec<crate::types::VectorId> { r.iter().map(|x| x.id).collect() };
        assert_eq!(ids(&before), ids(&after));
    }

    #[test]
    fn test_section_unknown_version_fails_closed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&9i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());

        let mut service = SearchService::new();
        let err = service
            .load(&mut Cursor::new(buf), &VectorList::new())
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_section_unknown_algorithm_tag_fails_closed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&SECTION_FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&42i32.to_le_bytes());

        let mut service = SearchService::new();
        let err = service
            .load(&mut Cursor::new(buf), &VectorList::new())
            .unwrap_err();
        assert!(err.is_corruption());
    }
}
