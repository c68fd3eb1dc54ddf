//! Write results and bulk write outcomes.

use bson::Bson;
use thiserror::Error;

/// The outcome of a write operation.
///
/// Counts are only meaningful for acknowledged writes; an unacknowledged result reports
/// zero for every count and no upserted id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteResult {
    acknowledged: bool,
    inserted_count: u64,
    matched_count: u64,
    modified_count: u64,
    deleted_count: u64,
    upserted_id: Option<Bson>,
}

impl WriteResult {
    pub fn unacknowledged() -> Self {
        Self::default()
    }

    pub(crate) fn inserted(count: u64) -> Self {
        Self {
            acknowledged: true,
            inserted_count: count,
            ..Self::default()
        }
    }

    pub(crate) fn updated(matched: u64, modified: u64, upserted_id: Option<Bson>) -> Self {
        Self {
            acknowledged: true,
            matched_count: matched,
            modified_count: modified,
            upserted_id,
            ..Self::default()
        }
    }

    pub(crate) fn deleted(count: u64) -> Self {
        Self {
            acknowledged: true,
            deleted_count: count,
            ..Self::default()
        }
    }

    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn inserted_count(&self) -> u64 {
        self.inserted_count
    }

    pub fn matched_count(&self) -> u64 {
        self.matched_count
    }

    pub fn modified_count(&self) -> u64 {
        self.modified_count
    }

    pub fn deleted_count(&self) -> u64 {
        self.deleted_count
    }

    /// The `_id` of the document inserted by an upsert, if any.
    pub fn upserted_id(&self) -> Option<&Bson> {
        self.upserted_id.as_ref()
    }
}

/// What happened to one document of a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    Failed {
        code: i32,
        message: String,
    },
    /// An earlier failure stopped an ordered insert before this document was tried.
    NotAttempted,
}

/// A bulk insert in which at least one document failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("bulk write failed: {inserted_count} of {} documents inserted", .outcomes.len())]
pub struct BulkWriteError {
    /// Whether the insert stopped at the first failure.
    pub ordered: bool,
    pub inserted_count: u64,
    /// One outcome per submitted document, in submission order.
    pub outcomes: Vec<InsertOutcome>,
}

impl BulkWriteError {
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, InsertOutcome::Failed { .. }))
            .count()
    }

    /// Index and outcome of every failed document.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &InsertOutcome)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| matches!(outcome, InsertOutcome::Failed { .. }))
    }
}
