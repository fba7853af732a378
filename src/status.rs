//! The join status lattice.

use std::fmt;

/// Relative precision of the two inputs of a join.
///
/// `Equal` is the unit of [`combine`][JoinStatus::combine]: the verdict of a
/// compound join is the pointwise combination of the verdicts of its parts.
/// `Incomplete` is never produced by this crate; it is reserved for callers
/// that compose several joins and need a "not finished" marker.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum JoinStatus {
    /// The two inputs are interchangeable for coverage purposes.
    Equal,
    /// The first input is entailed: the joint graph adds nothing over the second.
    LeftEntail,
    /// The second input is entailed: the joint graph adds nothing over the first.
    RightEntail,
    /// Neither input covers the other; the joint graph over-approximates both.
    Incomparable,
    /// Reserved for callers composing multiple joins.
    Incomplete,
}

impl JoinStatus {
    /// Combines two verdicts. Pure, total, commutative and associative:
    /// `Equal` is the unit, combining a verdict with itself is a no-op, and
    /// any two differing non-`Equal` verdicts give `Incomparable`.
    pub fn combine(self, other: JoinStatus) -> JoinStatus {
        if self == JoinStatus::Equal {
            return other;
        }
        if other == JoinStatus::Equal || self == other {
            return self;
        }
        JoinStatus::Incomparable
    }

    /// The same verdict as seen with the two inputs swapped.
    ///
    /// Used when a sub-join runs with its arguments reversed, so that the
    /// reported direction stays consistent with the original argument order.
    pub fn swapped(self) -> JoinStatus {
        match self {
            JoinStatus::LeftEntail => JoinStatus::RightEntail,
            JoinStatus::RightEntail => JoinStatus::LeftEntail,
            other => other,
        }
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JoinStatus::Equal => "EQUAL",
            JoinStatus::LeftEntail => "LEFT_ENTAIL",
            JoinStatus::RightEntail => "RIGHT_ENTAIL",
            JoinStatus::Incomparable => "INCOMPARABLE",
            JoinStatus::Incomplete => "INCOMPLETE",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::JoinStatus::*;

    const ALL: [super::JoinStatus; 5] = [Equal, LeftEntail, RightEntail, Incomparable, Incomplete];

    #[test]
    fn test_equal_is_unit() {
        for s in ALL {
            assert_eq!(Equal.combine(s), s);
            assert_eq!(s.combine(Equal), s);
        }
    }

    #[test]
    fn test_idempotent() {
        for s in ALL {
            assert_eq!(s.combine(s), s);
        }
    }

    #[test]
    fn test_differing_give_incomparable() {
        assert_eq!(LeftEntail.combine(RightEntail), Incomparable);
        assert_eq!(RightEntail.combine(LeftEntail), Incomparable);
        assert_eq!(LeftEntail.combine(Incomparable), Incomparable);
        assert_eq!(Incomplete.combine(RightEntail), Incomparable);
    }

    #[test]
    fn test_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.combine(b), b.combine(a));
            }
        }
    }

    #[test]
    fn test_associative() {
        for a in ALL {
            for b in ALL {
                for c in ALL {
                    assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
                }
            }
        }
    }

    #[test]
    fn test_swapped() {
        assert_eq!(LeftEntail.swapped(), RightEntail);
        assert_eq!(RightEntail.swapped(), LeftEntail);
        assert_eq!(Equal.swapped(), Equal);
        assert_eq!(Incomparable.swapped(), Incomparable);
    }
}
