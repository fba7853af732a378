//! Error type for the diagnostic consistency check.

use thiserror::Error;

/// Errors reported by a join run with consistency checks enabled.
///
/// Join infeasibility is not an error; it is reported through the `defined`
/// flag of each result. This type only surfaces internal postcondition
/// violations, and with checks disabled (the default) is never produced.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum JoinError {
    /// The field aligner produced edge sets that are not pointwise comparable.
    #[error("inconsistent field alignment: {0}")]
    InconsistentJoin(String),
}
