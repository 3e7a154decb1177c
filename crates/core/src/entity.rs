//! Entity trait: identity that survives state changes.

/// A record identified by its id rather than its field values.
///
/// Append-only records (stock movements) are entities too: two movements with
/// identical quantities are still two distinct audit entries.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
