//! The symbolic memory graph: arenas of objects and values plus edge sets.

use std::collections::{BTreeMap, BTreeSet};

use crate::bitset::BitSet;
use crate::edge::{HasValueEdge, HvFilter, PointsToEdge, TargetSpecifier};
use crate::object::{Object, ObjectKind};
use crate::types::{ObjectId, ValueId};

/// A symbolic memory graph.
///
/// Objects and values live in arenas indexed by [`ObjectId`] / [`ValueId`].
/// Every graph owns a null object and a null value at id 0, connected by a
/// points-to edge, so a null pointer dereference target is always resolvable.
///
/// Edge sets are ordered (`BTreeSet` / `BTreeMap`) so iteration order, and
/// with it join output, is deterministic.
#[derive(Debug, Clone)]
pub struct Smg {
    objects: BTreeMap<ObjectId, Object>,
    values: BTreeSet<ValueId>,
    hv_edges: BTreeSet<HasValueEdge>,
    pt_edges: BTreeMap<ValueId, PointsToEdge>,
    next_object: u32,
    next_value: u32,
}

impl Default for Smg {
    fn default() -> Self {
        Self::new()
    }
}

impl Smg {
    /// Creates a graph holding only the null singletons.
    pub fn new() -> Self {
        let null_object = Object {
            size: 0,
            valid: false,
            level: 0,
            kind: ObjectKind::Region,
        };
        let mut smg = Smg {
            objects: BTreeMap::new(),
            values: BTreeSet::new(),
            hv_edges: BTreeSet::new(),
            pt_edges: BTreeMap::new(),
            next_object: 1,
            next_value: 1,
        };
        smg.objects.insert(ObjectId::NULL, null_object);
        smg.values.insert(ValueId::NULL);
        smg.pt_edges.insert(
            ValueId::NULL,
            PointsToEdge::new(ValueId::NULL, ObjectId::NULL, 0, TargetSpecifier::Region),
        );
        smg
    }

    pub fn null_object(&self) -> ObjectId {
        ObjectId::NULL
    }

    /// Bumps this graph's fresh-id counters past everything the other graph
    /// could have allocated. A destination graph does this once against both
    /// inputs, so destination-fresh ids never collide with input ids.
    pub fn reserve_ids(&mut self, other: &Smg) {
        self.next_object = self.next_object.max(other.next_object);
        self.next_value = self.next_value.max(other.next_value);
    }

    pub fn null_value(&self) -> ValueId {
        ValueId::NULL
    }

    // ----- objects -----

    /// Adds an object under a fresh id.
    pub fn add_object(&mut self, object: Object) -> ObjectId {
        let id = ObjectId::new(self.next_object);
        self.next_object += 1;
        self.objects.insert(id, object);
        id
    }

    /// Installs an object under a caller-chosen id, bumping the fresh-id
    /// counter past it. Used when the destination graph must reuse an input
    /// graph's identity for a node.
    ///
    /// # Panics
    ///
    /// If the id is already taken.
    pub fn install_object(&mut self, id: ObjectId, object: Object) {
        assert!(!self.objects.contains_key(&id), "object id {} already taken", id);
        self.objects.insert(id, object);
        if id.raw() >= self.next_object {
            self.next_object = id.raw() + 1;
        }
    }

    pub fn has_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// # Panics
    ///
    /// If the object is not in this graph.
    pub fn object(&self, id: ObjectId) -> Object {
        match self.objects.get(&id) {
            Some(&object) => object,
            None => panic!("object {} not in graph", id),
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, Object)> + '_ {
        self.objects.iter().map(|(&id, &object)| (id, object))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn set_validity(&mut self, id: ObjectId, valid: bool) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.valid = valid;
        }
    }

    /// Removes an object together with its field edges and every pointer
    /// edge targeting it. The pointer values themselves stay in the graph.
    pub fn remove_object_and_edges(&mut self, id: ObjectId) {
        assert!(!id.is_null(), "cannot remove the null object");
        self.objects.remove(&id);
        self.hv_edges.retain(|e| e.object != id);
        self.pt_edges.retain(|_, e| e.target != id);
    }

    // ----- values -----

    /// Allocates a fresh value.
    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId::new(self.next_value);
        self.next_value += 1;
        self.values.insert(id);
        id
    }

    /// Installs a value under a caller-chosen id, bumping the fresh-id
    /// counter past it.
    pub fn install_value(&mut self, id: ValueId) {
        self.values.insert(id);
        if id.raw() >= self.next_value {
            self.next_value = id.raw() + 1;
        }
    }

    pub fn has_value(&self, id: ValueId) -> bool {
        self.values.contains(&id)
    }

    pub fn remove_value(&mut self, id: ValueId) {
        assert!(!id.is_null(), "cannot remove the null value");
        self.values.remove(&id);
        self.pt_edges.remove(&id);
    }

    pub fn values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.values.iter().copied()
    }

    // ----- field edges -----

    pub fn add_hv_edge(&mut self, edge: HasValueEdge) {
        debug_assert!(self.objects.contains_key(&edge.object));
        self.hv_edges.insert(edge);
    }

    pub fn remove_hv_edge(&mut self, edge: &HasValueEdge) {
        self.hv_edges.remove(edge);
    }

    /// Iterates the field edges matching a filter.
    pub fn hv_edges(&self, filter: HvFilter) -> impl Iterator<Item = HasValueEdge> + '_ {
        self.hv_edges.iter().copied().filter(move |e| filter.matches(e))
    }

    /// Replaces every field edge of one object with a new edge set.
    pub fn replace_object_edges(&mut self, object: ObjectId, edges: Vec<HasValueEdge>) {
        self.hv_edges.retain(|e| e.object != object);
        for edge in edges {
            assert_eq!(edge.object, object);
            self.hv_edges.insert(edge);
        }
    }

    /// The byte offsets of `object` covered by null-valued field edges.
    pub fn null_bytes_for_object(&self, object: ObjectId) -> BitSet {
        let size = self.object(object).size as usize;
        let mut bytes = BitSet::new(size);
        for edge in self.hv_edges(HvFilter::object(object).with_value(ValueId::NULL)) {
            bytes.set_range(edge.offset as usize, (edge.offset + edge.width) as usize);
        }
        bytes
    }

    // ----- pointer edges -----

    /// Records a pointer edge for a value.
    ///
    /// # Panics
    ///
    /// If the value already has a pointer edge.
    pub fn add_pt_edge(&mut self, edge: PointsToEdge) {
        debug_assert!(self.values.contains(&edge.value));
        debug_assert!(self.objects.contains_key(&edge.target));
        let prev = self.pt_edges.insert(edge.value, edge);
        assert!(prev.is_none(), "value {} already has a pointer edge", edge.value);
    }

    pub fn remove_pt_edge(&mut self, value: ValueId) {
        self.pt_edges.remove(&value);
    }

    pub fn pointer(&self, value: ValueId) -> Option<PointsToEdge> {
        self.pt_edges.get(&value).copied()
    }

    pub fn is_pointer(&self, value: ValueId) -> bool {
        self.pt_edges.contains_key(&value)
    }

    /// Every pointer value addressing the given object.
    pub fn pointers_to(&self, target: ObjectId) -> impl Iterator<Item = PointsToEdge> + '_ {
        self.pt_edges.values().copied().filter(move |e| e.target == target)
    }
}
