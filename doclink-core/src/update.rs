//! Update expression construction.
//!
//! An [`Update`] is an immutable list of mutation operations, disjoint from
//! [`Filter`](crate::filter::Filter).
//! The empty list is the distinguished no-op update, which every update operation rejects.

use std::collections::HashSet;

use bson::{Bson, Document};

use crate::{
    error::{ClientError, ClientResult},
    filter::validate_field_path,
};

/// A single mutation applied to a matched document.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Sets the field to the value, creating it if missing.
    Set(String, Bson),
    /// Increments the numeric field by the amount, creating it if missing.
    Inc(String, Bson),
    /// Removes the field.
    Unset(String),
    /// Appends the value to the array field, creating the array if missing.
    Push(String, Bson),
}

impl UpdateOp {
    /// The field path this operation mutates.
    pub fn field(&self) -> &str {
        match self {
            UpdateOp::Set(field, _)
            | UpdateOp::Inc(field, _)
            | UpdateOp::Unset(field)
            | UpdateOp::Push(field, _) => field,
        }
    }

    /// The update operator this operation serializes under.
    pub fn operator(&self) -> &'static str {
        match self {
            UpdateOp::Set(..) => "$set",
            UpdateOp::Inc(..) => "$inc",
            UpdateOp::Unset(_) => "$unset",
            UpdateOp::Push(..) => "$push",
        }
    }
}

/// An immutable update expression.
///
/// # Example
///
/// ```ignore
/// use doclink_core::update::Update;
///
/// let update = Update::builder()
///     .inc("number", 10)
///     .set("touched", true)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// The distinguished no-op update.
    pub fn noop() -> Self {
        Update { ops: Vec::new() }
    }

    /// Returns `true` for the no-op update.
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// Creates a new update builder.
    pub fn builder() -> UpdateBuilder {
        UpdateBuilder::default()
    }

    /// An update setting a single field.
    pub fn set(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Update::builder().set(field, value).build()
    }

    /// An update incrementing a single field.
    pub fn inc(field: impl Into<String>, amount: impl Into<Bson>) -> Self {
        Update::builder().inc(field, amount).build()
    }

    /// An update removing a single field.
    pub fn unset(field: impl Into<String>) -> Self {
        Update::builder().unset(field).build()
    }

    /// An update appending to a single array field.
    pub fn push(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Update::builder().push(field, value).build()
    }

    /// Concatenates two updates.
    pub fn and_then(mut self, other: Update) -> Self {
        self.ops.extend(other.ops);
        self
    }

    /// The operations in application order.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Checks the update before it is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] for the no-op update, malformed field paths,
    /// non-numeric increments and fields targeted by more than one operation.
    pub fn validate(&self) -> ClientResult<()> {
        if self.is_noop() {
            return Err(ClientError::invalid_argument(
                "update must contain at least one operation",
            ));
        }

        let mut seen = HashSet::new();
        for op in &self.ops {
            validate_field_path(op.field())?;
            if !seen.insert(op.field()) {
                return Err(ClientError::invalid_argument(format!(
                    "field {:?} is targeted by more than one update operation",
                    op.field()
                )));
            }
            if let UpdateOp::Inc(field, amount) = op {
                if !matches!(amount, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                    return Err(ClientError::invalid_argument(format!(
                        "$inc on {field:?} requires a numeric amount"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Serializes the update into an update document grouped by operator.
    pub fn to_document(&self) -> ClientResult<Document> {
        self.validate()?;

        let mut groups: Vec<(&'static str, Document)> = Vec::new();
        for op in &self.ops {
            let value = match op {
                UpdateOp::Set(_, value) | UpdateOp::Inc(_, value) | UpdateOp::Push(_, value) => {
                    value.clone()
                }
                UpdateOp::Unset(_) => Bson::String(String::new()),
            };
            match groups.iter_mut().find(|(operator, _)| *operator == op.operator()) {
                Some((_, group)) => {
                    group.insert(op.field(), value);
                }
                None => {
                    let mut group = Document::new();
                    group.insert(op.field(), value);
                    groups.push((op.operator(), group));
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|(operator, group)| (operator.to_string(), Bson::Document(group)))
            .collect())
    }
}

/// Builder for multi-operation updates.
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    ops: Vec<UpdateOp>,
}

impl UpdateBuilder {
    /// Sets the field to the value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Set(field.into(), value.into()));
        self
    }

    /// Increments the field by the amount.
    pub fn inc(mut self, field: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Inc(field.into(), amount.into()));
        self
    }

    /// Removes the field.
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(field.into()));
        self
    }

    /// Appends the value to the array field.
    pub fn push(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Push(field.into(), value.into()));
        self
    }

    /// Builds the update.
    pub fn build(self) -> Update {
        Update { ops: self.ops }
    }
}
