//! Per-operation options.
//!
//! Every option struct implements `Default`; the defaults correspond to the sentinel values
//! of the data model (match-all filter, all fields, unbounded limit) and to the client's
//! configured defaults for ordering and batch size.

use crate::{
    error::{ClientError, ClientResult},
    projection::Projection,
};

/// Maximum number of documents a find returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    #[default]
    Unbounded,
    At(u64),
}

impl Limit {
    pub fn validate(&self) -> ClientResult<()> {
        match self {
            Limit::At(0) => Err(ClientError::invalid_argument(
                "limit must be at least 1; use Limit::Unbounded for no limit",
            )),
            _ => Ok(()),
        }
    }

    pub fn get(&self) -> Option<u64> {
        match self {
            Limit::Unbounded => None,
            Limit::At(n) => Some(*n),
        }
    }
}

/// Which version of the document a find-and-modify returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    /// The document as it was before the update.
    #[default]
    Before,
    /// The document as it is after the update.
    After,
}

#[derive(Debug, Clone, Default)]
pub struct InsertManyOptions {
    /// Stop at the first failure. `None` uses the client's `default_write_ordered`.
    pub ordered: Option<bool>,
}

impl InsertManyOptions {
    pub fn ordered(ordered: bool) -> Self {
        Self {
            ordered: Some(ordered),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Projection,
    pub limit: Limit,
    /// Documents per batch. `None` uses the client's `default_batch_size`.
    pub batch_size: Option<u32>,
}

impl FindOptions {
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::default()
    }

    pub fn validate(&self) -> ClientResult<()> {
        self.projection.validate()?;
        self.limit.validate()?;
        if self.batch_size == Some(0) {
            return Err(ClientError::invalid_argument("batch_size must be at least 1"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    pub fn projection(mut self, projection: Projection) -> Self {
        self.options.projection = projection;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.options.limit = Limit::At(limit);
        self
    }

    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.options.batch_size = Some(batch_size);
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FindOneAndUpdateOptions {
    pub return_document: ReturnDocument,
    /// Insert a document built from the filter's equality fields when nothing matches.
    pub upsert: bool,
}

impl FindOneAndUpdateOptions {
    pub fn return_after() -> Self {
        Self {
            return_document: ReturnDocument::After,
            upsert: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn zero_limit_and_batch_size_are_rejected() {
        assert_eq!(Limit::At(0).validate().unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert!(Limit::At(1).validate().is_ok());
        assert!(Limit::Unbounded.validate().is_ok());

        let options = FindOptions::builder().batch_size(0).build();
        assert!(options.validate().is_err());
    }

    #[test]
    fn defaults_are_sentinels() {
        let options = FindOptions::default();

        assert!(options.projection.is_all_fields());
        assert_eq!(options.limit, Limit::Unbounded);
        assert_eq!(options.batch_size, None);
        assert_eq!(FindOneAndUpdateOptions::default().return_document, ReturnDocument::Before);
    }
}
