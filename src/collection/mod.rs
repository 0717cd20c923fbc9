//! The mutable vector collection.
//!
//! [`VectorList`] owns membership (unique by id, insertion order preserved
//! for iteration) and the tag map. Every successful mutation invokes the
//! registered modification callback exactly once, after the mutation is
//! visible; the owning database registers the callback at construction and
//! deregisters it at disposal. There is no global event bus.

mod tags;

pub use tags::VectorTags;

use std::collections::HashMap;

use crate::types::VectorId;
use crate::vector::Vector;

/// Callback invoked after each successful mutation.
pub type ModifiedCallback = Box<dyn Fn() + Send + Sync>;

/// Ordered, mutable collection of vectors keyed by stable id.
#[derive(Default)]
pub struct VectorList {
    vectors: Vec<Vector>,
    positions: HashMap<VectorId, usize>,
    tags: VectorTags,
    on_modified: Option<ModifiedCallback>,
}

impl std::fmt::Debug for VectorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorList")
            .field("len", &self.vectors.len())
            .field("tags", &self.tags.len())
            .finish_non_exhaustive()
    }
}

impl VectorList {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the modification callback. Replaces any previous one.
    pub fn set_modified_callback(&mut self, callback: ModifiedCallback) {
        self.on_modified = Some(callback);
    }

    /// Deregisters the modification callback.
    pub fn clear_modified_callback(&mut self) {
        self.on_modified = None;
    }

    fn signal_modified(&self) {
        if let Some(cb) = &self.on_modified {
            cb();
        }
    }

    /// Appends a vector and signals modification.
    ///
    /// If a vector with the same id is already present it is replaced in
    /// place, preserving membership uniqueness by id.
    pub fn add(&mut self, vector: Vector) {
        match self.positions.get(&vector.id) {
            Some(&pos) => self.vectors[pos] = vector,
            None => {
                self.positions.insert(vector.id, self.vectors.len());
                self.vectors.push(vector);
            }
        }
        self.signal_modified();
    }

    /// Replaces the vector stored under `id` with `vector`, in place.
    ///
    /// Returns `false` without signalling if `id` is absent, or if the
    /// replacement's id already names a different entry (membership stays
    /// unique by id). The replacement keeps its own id, which may differ
    /// from `id`.
    pub fn update(&mut self, id: VectorId, vector: Vector) -> bool {
        if vector.id != id && self.positions.contains_key(&vector.id) {
            return false;
        }
        let Some(pos) = self.positions.remove(&id) else {
            return false;
        };
        self.positions.insert(vector.id, pos);
        self.vectors[pos] = vector;
        self.signal_modified();
        true
    }

    /// Removes a vector by identity. Returns `false` if absent.
    pub fn remove(&mut self, vector: &Vector) -> bool {
        self.remove_by_id(vector.id)
    }

    /// Removes the vector stored under `id`. Returns `false` if absent.
    pub fn remove_by_id(&mut self, id: VectorId) -> bool {
        let Some(pos) = self.positions.remove(&id) else {
            return false;
        };
        self.vectors.remove(pos);
        for later in &self.vectors[pos..] {
            if let Some(p) = self.positions.get_mut(&later.id) {
                *p -= 1;
            }
        }
        self.signal_modified();
        true
    }

    /// The vector stored under `id`, if present.
    pub fn get_by_id(&self, id: VectorId) -> Option<&Vector> {
        self.positions.get(&id).map(|&pos| &self.vectors[pos])
    }

    /// True if a vector with `id` is present.
    pub fn contains(&self, id: VectorId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Empties the vector mapping and the tag map, signalling once.
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.positions.clear();
        self.tags.clear();
        self.signal_modified();
    }

    /// Number of live vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True if the collection holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Iterates vectors in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Vector> {
        self.vectors.iter()
    }

    /// The vectors as a slice, in insertion order.
    pub fn as_slice(&self) -> &[Vector] {
        &self.vectors
    }

    /// Owned point-in-time copy for out-of-lock index builds.
    pub fn snapshot(&self) -> Vec<Vector> {
        self.vectors.clone()
    }

    /// Live ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.vectors.iter().map(|v| v.id)
    }

    /// Rebuilds the tag map wholesale from the current vectors.
    pub fn rebuild_tag_map(&mut self) {
        self.tags.build_map(&self.vectors);
    }

    /// The tag map. Consistent with the last [`rebuild_tag_map`] call,
    /// not with later mutations.
    ///
    /// [`rebuild_tag_map`]: VectorList::rebuild_tag_map
    pub fn tags(&self) -> &VectorTags {
        &self.tags
    }

    /// Vectors carrying `tag`, in insertion order, per the current tag map.
    pub fn find_by_tag(&self, tag: &str) -> Vec<&Vector> {
        let Some(ids) = self.tags.ids_for(tag) else {
            return Vec::new();
        };
        self.vectors.iter().filter(|v| ids.contains(&v.id)).collect()
    }
}

impl<'a> IntoIterator for &'a VectorList {
    type Item = &'a Vector;
    type IntoIter = std::slice::Iter<'a, Vector>;

    fn into_iter(self) -> Self::IntoIter {
        self.vectors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted_list() -> (VectorList, Arc<AtomicUsize>) {
        let mut list = VectorList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        list.set_modified_callback(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        (list, count)
    }

    #[test]
    fn test_add_and_get_by_id() {
        let mut list = VectorList::new();
        let v = Vector::new(vec![1.0, 2.0]);
        let id = v.id;
        list.add(v);

        assert_eq!(list.len(), 1);
        assert_eq!(list.get_by_id(id).unwrap().values, vec![1.0, 2.0]);
        assert!(list.get_by_id(VectorId::new()).is_none());
    }

    #[test]
    fn test_add_duplicate_id_replaces_in_place() {
        let mut list = VectorList::new();
        let mut v = Vector::new(vec![1.0]);
        let id = v.id;
        list.add(v.clone());

        v.values = vec![9.0];
        list.add(v);

        assert_eq!(list.len(), 1);
        assert_eq!(list.get_by_id(id).unwrap().values, vec![9.0]);
    }

    #[test]
    fn test_update_absent_returns_false() {
        let (mut list, count) = counted_list();
        assert!(!list.update(VectorId::new(), Vector::new(vec![1.0])));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_update_replaces_in_place_preserving_order() {
        let mut list = VectorList::new();
        let a = Vector::new(vec![1.0]);
        let b = Vector::new(vec![2.0]);
        let c = Vector::new(vec![3.0]);
        let b_id = b.id;
        list.add(a);
        list.add(b);
        list.add(c);

        let replacement = Vector::new(vec![20.0]);
        let new_id = replacement.id;
        assert!(list.update(b_id, replacement));

        assert_eq!(list.len(), 3);
        assert!(!list.contains(b_id));
        let middle = list.iter().nth(1).unwrap();
        assert_eq!(middle.id, new_id);
        assert_eq!(middle.values, vec![20.0]);
    }

    #[test]
    fn test_update_rejects_id_collision_with_other_entry() {
        let mut list = VectorList::new();
        let a = Vector::new(vec![1.0]);
        let b = Vector::new(vec![2.0]);
        let (a_id, b_id) = (a.id, b.id);
        list.add(a);
        list.add(b.clone());

        // Replacing a with b's record would leave two entries under one id.
        assert!(!list.update(a_id, b));
        assert_eq!(list.len(), 2);
        assert!(list.contains(a_id) && list.contains(b_id));
    }

    #[test]
    fn test_remove_keeps_positions_consistent() {
        let mut list = VectorList::new();
        let a = Vector::new(vec![1.0]);
        let b = Vector::new(vec![2.0]);
        let c = Vector::new(vec![3.0]);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        list.add(a);
        list.add(b.clone());
        list.add(c);

        assert!(list.remove(&b));
        assert!(!list.remove(&b));

        assert_eq!(list.len(), 2);
        assert!(list.contains(a_id) && list.contains(c_id));
        assert!(!list.contains(b_id));
        assert_eq!(list.get_by_id(c_id).unwrap().values, vec![3.0]);
    }

    #[test]
    fn test_count_matches_live_set_under_mixed_operations() {
        let mut list = VectorList::new();
        let mut live = Vec::new();
        for i in 0..10 {
            let v = Vector::new(vec![i as f32]);
            live.push(v.id);
            list.add(v);
        }
        for id in live.drain(0..5) {
            assert!(list.remove_by_id(id));
        }
        assert_eq!(list.len(), 5);
        let remaining: Vec<VectorId> = list.ids().collect();
        for id in &remaining {
            assert!(list.get_by_id(*id).is_some());
        }
        assert_eq!(remaining.len(), 5);
    }

    #[test]
    fn test_modified_signal_once_per_successful_mutation() {
        let (mut list, count) = counted_list();
        let v = Vector::new(vec![1.0]);
        let id = v.id;

        list.add(v.clone()); // 1
        list.update(id, Vector::new(vec![2.0])); // 2
        list.remove(&v); // the original id is gone after update
        assert_eq!(count.load(Ordering::SeqCst), 2);

        list.clear(); // 3
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_callback_deregistration() {
        let (mut list, count) = counted_list();
        list.clear_modified_callback();
        list.add(Vector::new(vec![1.0]));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_empties_vectors_and_tags() {
        let mut list = VectorList::new();
        list.add(Vector::with_tags(vec![1.0], None, vec!["t".into()]));
        list.rebuild_tag_map();
        assert!(!list.tags().is_empty());

        list.clear();
        assert!(list.is_empty());
        assert!(list.tags().is_empty());
    }

    #[test]
    fn test_find_by_tag_uses_current_map() {
        let mut list = VectorList::new();
        let v = Vector::with_tags(vec![1.0], None, vec!["red".into()]);
        let id = v.id;
        list.add(v);

        // Map not rebuilt yet: lookup misses.
        assert!(list.find_by_tag("red").is_empty());

        list.rebuild_tag_map();
        let found = list.find_by_tag("red");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
    }

    #[test]
    fn test_iteration_preserves_insertion_order() {
        let mut list = VectorList::new();
        for i in 0..5 {
            list.add(Vector::new(vec![i as f32]));
        }
        let order: Vec<f32> = list.iter().map(|v| v.values[0]).collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
