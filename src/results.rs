//! Write-operation result types reported back to callers.

use bson::Bson;

/// Outcome of a successful single-document insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// The `_id` of the inserted document, either caller-supplied or
    /// freshly generated.
    pub inserted_id: Bson,
}

/// Outcome of a successful bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// Number of documents written.
    pub inserted_count: u64,
    /// The `_id` of each inserted document, in input order.
    pub inserted_ids: Vec<Bson>,
}

/// Outcome of a replace or update operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Number of documents the filter matched.
    pub matched_count: u64,
    /// Number of documents actually changed. A replacement identical to
    /// the stored document matches but does not modify.
    pub modified_count: u64,
    /// The `_id` of the document created by an upsert, when one happened.
    pub upserted_id: Option<Bson>,
}

/// Outcome of a delete operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    /// Number of documents removed.
    pub deleted_count: u64,
}
