//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances with the same attribute values are
/// the same value. Document numbers, inventory keys and stock-level thresholds are value
/// objects; requisitions and inventory items are not.
///
/// Value objects are immutable. To "modify" one, build a new value.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
