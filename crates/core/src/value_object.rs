//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity; two instances with the same fields are
/// interchangeable. In this workspace that covers stock levels, requested
/// quantities and the box-to-piece conversion factor:
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct StockDelta { boxes: u64, pieces: u64 }
///
/// impl ValueObject for StockDelta {}
///
/// assert_eq!(StockDelta { boxes: 1, pieces: 0 }, StockDelta { boxes: 1, pieces: 0 });
/// ```
///
/// Value objects are immutable: a "changed" stock level is a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
