//! SMG objects: concrete regions and doubly-linked list segments.

/// Layout of a doubly-linked list segment.
///
/// Offsets are in bytes from the start of the object. `min_length` is the
/// least number of concrete list nodes the segment stands for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DlsParams {
    /// Head field offset: where pointers into the list land.
    pub hfo: u64,
    /// Next field offset.
    pub nfo: u64,
    /// Prev field offset.
    pub pfo: u64,
    /// Minimum number of summarized nodes.
    pub min_length: u64,
}

/// What an object summarizes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ObjectKind {
    /// A single concrete memory region.
    Region,
    /// A doubly-linked list segment summarizing `min_length` or more nodes.
    Dls(DlsParams),
}

/// A node of an SMG: a typed chunk of memory.
///
/// `level` tracks nesting under abstraction: objects reachable only through a
/// list segment live one level below the segment itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Object {
    /// Size in bytes.
    pub size: u64,
    /// Invalid objects model freed or out-of-scope memory.
    pub valid: bool,
    /// Nesting level under list abstraction.
    pub level: i32,
    pub kind: ObjectKind,
}

impl Object {
    /// A valid concrete region of `size` bytes at level 0.
    pub fn region(size: u64) -> Self {
        Object {
            size,
            valid: true,
            level: 0,
            kind: ObjectKind::Region,
        }
    }

    /// A valid list segment of `size` bytes at level 0.
    pub fn dls(size: u64, params: DlsParams) -> Self {
        Object {
            size,
            valid: true,
            level: 0,
            kind: ObjectKind::Dls(params),
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Whether this object summarizes more than one concrete node.
    pub fn is_abstract(self) -> bool {
        matches!(self.kind, ObjectKind::Dls(_))
    }

    /// The segment layout, if this object is a list segment.
    pub fn dls_params(self) -> Option<DlsParams> {
        match self.kind {
            ObjectKind::Dls(params) => Some(params),
            ObjectKind::Region => None,
        }
    }

    /// Whether the two objects are the same sort of node (both regions, or
    /// both list segments), ignoring layout and length.
    pub fn match_generic_shape(self, other: Object) -> bool {
        matches!(
            (self.kind, other.kind),
            (ObjectKind::Region, ObjectKind::Region) | (ObjectKind::Dls(_), ObjectKind::Dls(_))
        )
    }

    /// Whether the two objects agree on everything a join would have to
    /// preserve: size, and for segments the link-field layout. Minimum
    /// lengths may differ.
    pub fn match_specific_shape(self, other: Object) -> bool {
        if self.size != other.size {
            return false;
        }
        match (self.kind, other.kind) {
            (ObjectKind::Region, ObjectKind::Region) => true,
            (ObjectKind::Dls(a), ObjectKind::Dls(b)) => {
                a.hfo == b.hfo && a.nfo == b.nfo && a.pfo == b.pfo
            }
            _ => false,
        }
    }

    /// Whether this object subsumes the other: a list segment covers any
    /// concrete region, never the other way around.
    pub fn is_more_general(self, other: Object) -> bool {
        self.is_abstract() && !other.is_abstract()
    }

    /// Builds the destination object for a pair of joined objects.
    ///
    /// Segment + segment keeps the shared layout with the smaller minimum
    /// length; segment + region degrades to a possibly-empty segment; region +
    /// region stays a region. The result's level is the larger of the two
    /// input levels, bumped by one when `increase_level` is set.
    ///
    /// # Panics
    ///
    /// If the objects do not match in specific shape.
    pub fn join_with(self, other: Object, increase_level: bool) -> Object {
        assert!(
            self.match_specific_shape(other) || self.is_more_general(other) || other.is_more_general(self),
            "join of shape-incompatible objects: {:?} vs {:?}",
            self,
            other
        );
        assert_eq!(self.size, other.size, "join of objects of unequal size");

        let kind = match (self.kind, other.kind) {
            (ObjectKind::Region, ObjectKind::Region) => ObjectKind::Region,
            (ObjectKind::Dls(a), ObjectKind::Dls(b)) => ObjectKind::Dls(DlsParams {
                min_length: a.min_length.min(b.min_length),
                ..a
            }),
            (ObjectKind::Dls(a), ObjectKind::Region) | (ObjectKind::Region, ObjectKind::Dls(a)) => {
                ObjectKind::Dls(DlsParams { min_length: 0, ..a })
            }
        };

        let mut level = self.level.max(other.level);
        if increase_level {
            level += 1;
        }

        Object {
            size: self.size,
            valid: self.valid && other.valid,
            level,
            kind,
        }
    }
}
