//! Row and field identifiers.

/// Identifier of a logical record within one table.
///
/// Ids are recycled after removal, so an id only denotes the same entity
/// while it stays live.
pub type RowId = u32;

/// Identifier of a field within one schema; equal to its position.
pub type FieldId = usize;
