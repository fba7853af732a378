//! Correspondence from one input graph's nodes to the joint graph's nodes.

use std::collections::HashMap;

use crate::types::{ObjectId, ValueId};

/// Grows monotonically while a join runs: once an input node is mapped to a
/// destination node, the pair is never changed. Re-encountering a mapped node
/// therefore terminates recursion even on cyclic graphs.
///
/// The null object and null value are pre-mapped to their destination
/// counterparts, so joins through null edges bottom out immediately.
#[derive(Debug, Clone, Default)]
pub struct NodeMapping {
    objects: HashMap<ObjectId, ObjectId>,
    values: HashMap<ValueId, ValueId>,
}

impl NodeMapping {
    pub fn new() -> Self {
        let mut mapping = NodeMapping::default();
        mapping.map_object(ObjectId::NULL, ObjectId::NULL);
        mapping.map_value(ValueId::NULL, ValueId::NULL);
        mapping
    }

    pub fn map_object(&mut self, from: ObjectId, to: ObjectId) {
        self.objects.insert(from, to);
    }

    pub fn map_value(&mut self, from: ValueId, to: ValueId) {
        self.values.insert(from, to);
    }

    pub fn get_object(&self, from: ObjectId) -> Option<ObjectId> {
        self.objects.get(&from).copied()
    }

    pub fn get_value(&self, from: ValueId) -> Option<ValueId> {
        self.values.get(&from).copied()
    }

    pub fn contains_object(&self, from: ObjectId) -> bool {
        self.objects.contains_key(&from)
    }

    pub fn contains_value(&self, from: ValueId) -> bool {
        self.values.contains_key(&from)
    }

    /// Whether some input object already maps onto the given destination object.
    pub fn contains_object_target(&self, to: ObjectId) -> bool {
        self.objects.values().any(|&t| t == to)
    }

    /// Whether some input value already maps onto the given destination value.
    pub fn contains_value_target(&self, to: ValueId) -> bool {
        self.values.values().any(|&t| t == to)
    }

    /// Drops every pair mapping onto the given destination object.
    pub fn remove_object_target(&mut self, to: ObjectId) {
        self.objects.retain(|_, &mut t| t != to);
    }

    /// Drops every pair mapping onto the given destination value.
    pub fn remove_value_target(&mut self, to: ValueId) {
        self.values.retain(|_, &mut t| t != to);
    }

    pub fn object_entries(&self) -> impl Iterator<Item = (ObjectId, ObjectId)> + '_ {
        self.objects.iter().map(|(&from, &to)| (from, to))
    }

    pub fn value_entries(&self) -> impl Iterator<Item = (ValueId, ValueId)> + '_ {
        self.values.iter().map(|(&from, &to)| (from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_premapped() {
        let mapping = NodeMapping::new();
        assert_eq!(mapping.get_object(ObjectId::NULL), Some(ObjectId::NULL));
        assert_eq!(mapping.get_value(ValueId::NULL), Some(ValueId::NULL));
    }

    #[test]
    fn test_map_and_get() {
        let mut mapping = NodeMapping::new();
        mapping.map_object(ObjectId::new(1), ObjectId::new(7));
        mapping.map_value(ValueId::new(2), ValueId::new(9));
        assert_eq!(mapping.get_object(ObjectId::new(1)), Some(ObjectId::new(7)));
        assert_eq!(mapping.get_value(ValueId::new(2)), Some(ValueId::new(9)));
        assert_eq!(mapping.get_object(ObjectId::new(2)), None);
        assert!(mapping.contains_object(ObjectId::new(1)));
        assert!(!mapping.contains_value(ValueId::new(3)));
    }

    #[test]
    fn test_targets() {
        let mut mapping = NodeMapping::new();
        mapping.map_object(ObjectId::new(1), ObjectId::new(7));
        mapping.map_object(ObjectId::new(2), ObjectId::new(7));
        mapping.map_value(ValueId::new(3), ValueId::new(4));
        assert!(mapping.contains_object_target(ObjectId::new(7)));
        assert!(!mapping.contains_object_target(ObjectId::new(8)));
        assert!(mapping.contains_value_target(ValueId::new(4)));

        mapping.remove_object_target(ObjectId::new(7));
        assert!(!mapping.contains_object(ObjectId::new(1)));
        assert!(!mapping.contains_object(ObjectId::new(2)));
        // Null pair untouched
        assert!(mapping.contains_object(ObjectId::NULL));

        mapping.remove_value_target(ValueId::new(4));
        assert!(!mapping.contains_value(ValueId::new(3)));
    }
}
