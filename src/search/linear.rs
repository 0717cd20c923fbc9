//! Exhaustive linear scan.
//!
//! The scan is the baseline correctness oracle and the fallback for
//! algorithms without native range support. It ranks with the injected
//! distance metric, unlike the tree indexes whose internal bounds are
//! inherently Euclidean.

use std::cmp::Ordering;

use crate::error::{Result, ValidationError};
use crate::vector::distance::DistanceMetric;
use crate::vector::Vector;

/// The `k` nearest vectors by exhaustive scan, ascending by distance.
/// Equal distances keep collection order (stable sort).
pub(crate) fn nearest(
    vectors: &[Vector],
    query: &Vector,
    k: usize,
    metric: &dyn DistanceMetric,
) -> Result<Vec<Vector>> {
    if k == 0 {
        return Err(ValidationError::invalid_argument("k", "must be greater than 0").into());
    }

    let mut ranked: Vec<(f32, &Vector)> = vectors
        .iter()
        .map(|v| (metric.distance(v, query), v))
        .collect();
    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    ranked.truncate(k);
    Ok(ranked.into_iter().map(|(_, v)| v.clone()).collect())
}

/// All vectors within `radius` of `query`, ascending by distance.
pub(crate) fn range(
    vectors: &[Vector],
    query: &Vector,
    radius: f32,
    metric: &dyn DistanceMetric,
) -> Result<Vec<Vector>> {
    if radius.is_nan() || radius < 0.0 {
        return Err(ValidationError::invalid_argument("radius", "must be non-negative").into());
    }

    let mut matched: Vec<(f32, &Vector)> = vectors
        .iter()
        .filter_map(|v| {
            let d = metric.distance(v, query);
            (d <= radius).then_some((d, v))
        })
        .collect();
    matched.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    Ok(matched.into_iter().map(|(_, v)| v.clone()).collect())
}
