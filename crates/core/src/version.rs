//! Revision tracking and optimistic concurrency for mutable records.

/// A record with a stable identity and a revision counter.
///
/// The revision increases by one each time the record's guarded state is
/// committed, so a writer can detect that somebody else committed in between
/// its read and its write.
pub trait Versioned {
    /// Strongly-typed identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Revision of the guarded state as last read from storage.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip the check.
    Any,
    /// Require the stored record to be at an exact revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    /// The revision as a nullable parameter (`None` for [`ExpectedVersion::Any`]).
    pub fn as_option(self) -> Option<u64> {
        match self {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(v) => Some(v),
        }
    }
}
