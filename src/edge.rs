//! Edges of an SMG: field contents and pointer targets.

use crate::types::{ObjectId, ValueId};

/// A field edge: `object` holds `value` in the `width` bytes at `offset`.
///
/// The (offset, width) pair identifies the field; two edges on matching
/// objects describe the same field exactly when both agree.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HasValueEdge {
    pub object: ObjectId,
    pub offset: u64,
    pub width: u64,
    pub value: ValueId,
}

impl HasValueEdge {
    pub fn new(object: ObjectId, offset: u64, width: u64, value: ValueId) -> Self {
        HasValueEdge {
            object,
            offset,
            width,
            value,
        }
    }

    /// Whether the two edges read the same field of matching objects.
    pub fn same_field(&self, other: &HasValueEdge) -> bool {
        self.offset == other.offset && self.width == other.width
    }
}

/// Which part of a target object a pointer addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TargetSpecifier {
    /// Pointer into a concrete region.
    Region,
    /// Pointer to the first node summarized by a list segment.
    First,
    /// Pointer to the last node summarized by a list segment.
    Last,
    /// Pointer held by every node summarized by a list segment.
    All,
}

/// A pointer edge: `value` is an address `offset` bytes into `target`.
///
/// A graph records at most one points-to edge per value; a value is a pointer
/// exactly when it has one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PointsToEdge {
    pub value: ValueId,
    pub target: ObjectId,
    pub offset: u64,
    pub specifier: TargetSpecifier,
}

impl PointsToEdge {
    pub fn new(value: ValueId, target: ObjectId, offset: u64, specifier: TargetSpecifier) -> Self {
        PointsToEdge {
            value,
            target,
            offset,
            specifier,
        }
    }
}

/// A chainable filter over field edges.
///
/// ```rust
/// # use smg_join::edge::HvFilter;
/// # use smg_join::types::ObjectId;
/// let filter = HvFilter::object(ObjectId::new(3)).at_offset(8);
/// ```
#[derive(Debug, Copy, Clone, Default)]
pub struct HvFilter {
    object: Option<ObjectId>,
    offset: Option<u64>,
    width: Option<u64>,
    value: Option<ValueId>,
}

impl HvFilter {
    /// Matches every edge.
    pub fn any() -> Self {
        HvFilter::default()
    }

    /// Matches edges on the given object.
    pub fn object(object: ObjectId) -> Self {
        HvFilter {
            object: Some(object),
            ..HvFilter::default()
        }
    }

    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_width(mut self, width: u64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_value(mut self, value: ValueId) -> Self {
        self.value = Some(value);
        self
    }

    pub fn matches(&self, edge: &HasValueEdge) -> bool {
        if let Some(object) = self.object {
            if edge.object != object {
                return false;
            }
        }
        if let Some(offset) = self.offset {
            if edge.offset != offset {
                return false;
            }
        }
        if let Some(width) = self.width {
            if edge.width != width {
                return false;
            }
        }
        if let Some(value) = self.value {
            if edge.value != value {
                return false;
            }
        }
        true
    }
}
