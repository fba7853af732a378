//! Type-safe handles for SMG nodes.
//!
//! Objects and values are stored in per-graph arenas and referenced by these
//! lightweight ids. Id 0 is reserved for the distinguished null object / null
//! value of each graph.

use std::fmt;

/// Handle of an object (a memory region or a list-segment summary) in an SMG.
///
/// # Invariants
///
/// - Id 0 is the null object of every graph.
/// - Ids are only meaningful within the graph that allocated them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    /// The null object present in every graph.
    pub const NULL: ObjectId = ObjectId(0);

    pub fn new(raw: u32) -> Self {
        ObjectId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the null object.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Handle of a symbolic value in an SMG.
///
/// A value may or may not be a pointer; it is a pointer exactly when the graph
/// records a points-to edge for it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValueId(u32);

impl ValueId {
    /// The null value present in every graph.
    pub const NULL: ValueId = ValueId(0);

    pub fn new(raw: u32) -> Self {
        ValueId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the null value.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
