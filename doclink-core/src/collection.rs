//! Collection handles.
//!
//! A [`Collection`] names one collection of one database and shares its client's
//! [`ConnectionManager`]. Every operation validates its arguments before leasing a session,
//! leases exactly one session for its duration and emits one log event.
//!
//! # Example
//!
//! ```ignore
//! use doclink_core::{filter::Filter, update::Update, options::UpdateOptions};
//!
//! let numbers = client.database("demo").collection("numbers");
//! numbers.insert_one(doc! { "number": 1 }).await?;
//!
//! let result = numbers
//!     .update_many(
//!         &Filter::lte("number", 5),
//!         &Update::inc("number", 10),
//!         UpdateOptions::default(),
//!     )
//!     .await?;
//! assert_eq!(result.modified_count(), 1);
//! ```

use std::{marker::PhantomData, sync::Arc};

use bson::{Document, doc, oid::ObjectId};

use crate::{
    command::{self, WriteReply},
    cursor::Cursor,
    document::DocumentExt,
    error::{ClientError, ClientResult},
    filter::Filter,
    instrument::instrument,
    options::{
        FindOneAndUpdateOptions, FindOptions, InsertManyOptions, Limit, ReturnDocument,
        UpdateOptions,
    },
    pool::ConnectionManager,
    projection::Projection,
    result::{BulkWriteError, InsertOutcome, WriteResult},
    transport::Transport,
    update::Update,
};

/// A handle to a single collection.
pub struct Collection<T: Transport> {
    database: String,
    name: String,
    manager: Arc<ConnectionManager<T>>,
}

impl<T: Transport> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            name: self.name.clone(),
            manager: self.manager.clone(),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace())
            .finish()
    }
}

impl<T: Transport> Collection<T> {
    pub(crate) fn new(database: String, name: String, manager: Arc<ConnectionManager<T>>) -> Self {
        Self {
            database,
            name,
            manager,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// `database.collection`
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// A typed view of this collection for serde models.
    pub fn typed<D: DocumentExt>(&self) -> TypedCollection<T, D> {
        TypedCollection {
            inner: self.clone(),
            _marker: PhantomData,
        }
    }

    /// Counts the documents matching `filter`.
    ///
    /// Idempotent; transport failures are retried up to `max_read_retries` times.
    pub async fn count(&self, filter: &Filter) -> ClientResult<u64> {
        instrument("count", &self.namespace(), async {
            self.check_names()?;
            let command = command::count(&self.name, filter.to_document()?);
            let reply = self.run(&command, self.read_retries()).await?;

            Ok(command::count_value(&reply))
        })
        .await
    }

    /// Inserts one document, adding an `ObjectId` `_id` when it has none.
    ///
    /// # Errors
    ///
    /// - [`ClientError::DuplicateKey`] if the `_id` is already taken
    /// - [`ClientError::ValidationError`] if the collection validator rejects the document
    /// - [`ClientError::ConnectionUnavailable`] if no session can be established
    pub async fn insert_one(&self, document: Document) -> ClientResult<WriteResult> {
        instrument("insert_one", &self.namespace(), async {
            self.check_names()?;
            let config = self.manager.config();
            let command = command::insert(
                &self.name,
                vec![with_id(document)],
                true,
                &config.write_concern,
            );
            let reply = self.run(&command, self.write_retries()).await?;
            if !config.write_concern.acknowledged {
                return Ok(WriteResult::unacknowledged());
            }

            let reply = WriteReply::parse(&reply);
            if let Some(err) = reply.first_error() {
                return Err(err);
            }

            Ok(WriteResult::inserted(reply.n))
        })
        .await
    }

    /// Inserts a batch of documents.
    ///
    /// Ordered inserts (the default unless configured otherwise) stop at the first failure;
    /// unordered inserts attempt every document. Either way a failure is reported as one
    /// [`ClientError::BulkWrite`] listing the outcome of every document.
    pub async fn insert_many(
        &self,
        documents: Vec<Document>,
        options: InsertManyOptions,
    ) -> ClientResult<WriteResult> {
        instrument("insert_many", &self.namespace(), async {
            self.check_names()?;
            if documents.is_empty() {
                return Err(ClientError::InvalidArgument(
                    "insert_many requires at least one document".to_string(),
                ));
            }

            let config = self.manager.config();
            let ordered = options.ordered.unwrap_or(config.default_write_ordered);
            let total = documents.len();
            let command = command::insert(
                &self.name,
                documents.into_iter().map(with_id).collect(),
                ordered,
                &config.write_concern,
            );
            let reply = self.run(&command, self.write_retries()).await?;
            if !config.write_concern.acknowledged {
                return Ok(WriteResult::unacknowledged());
            }

            let reply = WriteReply::parse(&reply);
            if reply.write_errors.is_empty() {
                return Ok(WriteResult::inserted(reply.n));
            }

            Err(BulkWriteError {
                ordered,
                inserted_count: reply.n,
                outcomes: bulk_outcomes(&reply, total, ordered),
            }
            .into())
        })
        .await
    }

    /// Starts a query. No round-trip happens until the first pull from the cursor.
    pub async fn find(&self, filter: &Filter, options: FindOptions) -> ClientResult<Cursor<T>> {
        instrument("find", &self.namespace(), async {
            self.check_names()?;
            options.validate()?;

            let config = self.manager.config();
            let batch_size = options.batch_size.unwrap_or(config.default_batch_size);
            let limit = options.limit.get();
            let first_batch = match limit {
                Some(limit) => limit.min(u64::from(batch_size)) as u32,
                None => batch_size,
            };
            let command = command::find(
                &self.name,
                filter.to_document()?,
                options.projection.to_document()?,
                limit,
                first_batch,
            );

            Ok(Cursor::new(
                self.manager.clone(),
                self.database.clone(),
                self.name.clone(),
                command,
                batch_size,
                limit,
                self.read_retries(),
            ))
        })
        .await
    }

    /// Returns the first document matching `filter`, or `None`.
    pub async fn find_one(
        &self,
        filter: &Filter,
        projection: Projection,
    ) -> ClientResult<Option<Document>> {
        let options = FindOptions {
            projection,
            limit: Limit::At(1),
            batch_size: Some(1),
        };
        let mut cursor = self.find(filter, options).await?;
        let found = cursor.next().await?;
        cursor.close().await;

        Ok(found)
    }

    /// Atomically updates one matching document.
    ///
    /// Returns the document as it was before the update unless
    /// [`ReturnDocument::After`] is requested; `None` when nothing matched and no upsert
    /// happened.
    pub async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        options: FindOneAndUpdateOptions,
    ) -> ClientResult<Option<Document>> {
        instrument("find_one_and_update", &self.namespace(), async {
            self.check_names()?;
            let command = command::find_and_modify(
                &self.name,
                filter.to_document()?,
                Some(update.to_document()?),
                options.return_document == ReturnDocument::After,
                options.upsert,
                &self.manager.config().write_concern,
            );
            let reply = self.run(&command, self.write_retries()).await?;

            Ok(command::find_and_modify_value(&reply))
        })
        .await
    }

    /// Updates every matching document.
    pub async fn update_many(
        &self,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> ClientResult<WriteResult> {
        self.update("update_many", filter, update, options, true)
            .await
    }

    /// Updates the first matching document.
    pub async fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> ClientResult<WriteResult> {
        self.update("update_one", filter, update, options, false)
            .await
    }

    /// Atomically removes one matching document and returns it.
    pub async fn find_one_and_delete(&self, filter: &Filter) -> ClientResult<Option<Document>> {
        instrument("find_one_and_delete", &self.namespace(), async {
            self.check_names()?;
            let command = command::find_and_modify(
                &self.name,
                filter.to_document()?,
                None,
                false,
                false,
                &self.manager.config().write_concern,
            );
            let reply = self.run(&command, self.write_retries()).await?;

            Ok(command::find_and_modify_value(&reply))
        })
        .await
    }

    /// Removes every matching document.
    pub async fn delete_many(&self, filter: &Filter) -> ClientResult<WriteResult> {
        self.delete("delete_many", filter, false).await
    }

    /// Removes the first matching document.
    pub async fn delete_one(&self, filter: &Filter) -> ClientResult<WriteResult> {
        self.delete("delete_one", filter, true).await
    }

    async fn update(
        &self,
        operation: &'static str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
        multi: bool,
    ) -> ClientResult<WriteResult> {
        instrument(operation, &self.namespace(), async {
            self.check_names()?;
            let config = self.manager.config();
            let command = command::update(
                &self.name,
                filter.to_document()?,
                update.to_document()?,
                multi,
                options.upsert,
                &config.write_concern,
            );
            let reply = self.run(&command, self.write_retries()).await?;
            if !config.write_concern.acknowledged {
                return Ok(WriteResult::unacknowledged());
            }

            let reply = WriteReply::parse(&reply);
            if let Some(err) = reply.first_error() {
                return Err(err);
            }

            // `n` counts the upserted document too.
            let matched = reply
                .n
                .saturating_sub(u64::from(reply.upserted_id.is_some()));

            Ok(WriteResult::updated(
                matched,
                reply.n_modified,
                reply.upserted_id,
            ))
        })
        .await
    }

    async fn delete(
        &self,
        operation: &'static str,
        filter: &Filter,
        single: bool,
    ) -> ClientResult<WriteResult> {
        instrument(operation, &self.namespace(), async {
            self.check_names()?;
            let config = self.manager.config();
            let command = command::delete(
                &self.name,
                filter.to_document()?,
                single,
                &config.write_concern,
            );
            let reply = self.run(&command, self.write_retries()).await?;
            if !config.write_concern.acknowledged {
                return Ok(WriteResult::unacknowledged());
            }

            let reply = WriteReply::parse(&reply);
            if let Some(err) = reply.first_error() {
                return Err(err);
            }

            Ok(WriteResult::deleted(reply.n))
        })
        .await
    }

    async fn run(&self, command: &Document, retries: u32) -> ClientResult<Document> {
        let reply = self
            .manager
            .execute(&self.database, command, retries)
            .await?;

        command::check_reply(reply)
    }

    fn read_retries(&self) -> u32 {
        self.manager.config().max_read_retries
    }

    fn write_retries(&self) -> u32 {
        u32::from(self.manager.config().retry_writes)
    }

    fn check_names(&self) -> ClientResult<()> {
        validate_database_name(&self.database)?;
        validate_collection_name(&self.name)
    }
}

fn with_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }

    let mut with_id = doc! { "_id": ObjectId::new() };
    with_id.extend(document);
    with_id
}

fn bulk_outcomes(reply: &WriteReply, total: usize, ordered: bool) -> Vec<InsertOutcome> {
    let mut outcomes = vec![InsertOutcome::Inserted; total];
    for entry in &reply.write_errors {
        if let Some(outcome) = outcomes.get_mut(entry.index) {
            *outcome = InsertOutcome::Failed {
                code: entry.code,
                message: entry.message.clone(),
            };
        }
    }
    if ordered {
        let first_failure = reply
            .write_errors
            .iter()
            .map(|entry| entry.index)
            .min()
            .unwrap_or(total);
        for outcome in outcomes.iter_mut().skip(first_failure + 1) {
            *outcome = InsertOutcome::NotAttempted;
        }
    }

    outcomes
}

pub(crate) fn validate_database_name(name: &str) -> ClientResult<()> {
    if name.is_empty() || name.contains(['.', '$', '/', '\\', ' ', '"', '\0']) {
        return Err(ClientError::InvalidArgument(format!(
            "invalid database name {name:?}"
        )));
    }

    Ok(())
}

pub(crate) fn validate_collection_name(name: &str) -> ClientResult<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['$', '\0']) {
        return Err(ClientError::InvalidArgument(format!(
            "invalid collection name {name:?}"
        )));
    }

    Ok(())
}

/// A collection whose documents are read and written as a serde model `D`.
pub struct TypedCollection<T: Transport, D> {
    inner: Collection<T>,
    _marker: PhantomData<fn() -> D>,
}

impl<T: Transport, D: DocumentExt> TypedCollection<T, D> {
    /// The untyped handle this view wraps.
    pub fn untyped(&self) -> &Collection<T> {
        &self.inner
    }

    pub async fn insert_one(&self, item: &D) -> ClientResult<WriteResult> {
        self.inner.insert_one(item.to_document()?).await
    }

    pub async fn insert_many(
        &self,
        items: &[D],
        options: InsertManyOptions,
    ) -> ClientResult<WriteResult> {
        let documents = items
            .iter()
            .map(DocumentExt::to_document)
            .collect::<ClientResult<Vec<_>>>()?;

        self.inner.insert_many(documents, options).await
    }

    /// Runs a query and deserializes every result.
    pub async fn find(&self, filter: &Filter, options: FindOptions) -> ClientResult<Vec<D>> {
        self.inner
            .find(filter, options)
            .await?
            .try_collect()
            .await?
            .into_iter()
            .map(D::from_document)
            .collect()
    }

    pub async fn find_one(&self, filter: &Filter) -> ClientResult<Option<D>> {
        self.inner
            .find_one(filter, Projection::all_fields())
            .await?
            .map(D::from_document)
            .transpose()
    }

    pub async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        options: FindOneAndUpdateOptions,
    ) -> ClientResult<Option<D>> {
        self.inner
            .find_one_and_update(filter, update, options)
            .await?
            .map(D::from_document)
            .transpose()
    }

    pub async fn count(&self, filter: &Filter) -> ClientResult<u64> {
        self.inner.count(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::WriteErrorEntry;
    use pretty_assertions::assert_eq;

    fn reply_with_errors(indexes: &[usize]) -> WriteReply {
        WriteReply {
            n: 0,
            n_modified: 0,
            upserted_id: None,
            write_errors: indexes
                .iter()
                .map(|index| WriteErrorEntry {
                    index: *index,
                    code: 11000,
                    message: "dup".into(),
                })
                .collect(),
        }
    }

    fn failed() -> InsertOutcome {
        InsertOutcome::Failed {
            code: 11000,
            message: "dup".into(),
        }
    }

    #[test]
    fn ordered_outcomes_stop_at_first_failure() {
        let outcomes = bulk_outcomes(&reply_with_errors(&[1]), 4, true);

        assert_eq!(
            outcomes,
            vec![
                InsertOutcome::Inserted,
                failed(),
                InsertOutcome::NotAttempted,
                InsertOutcome::NotAttempted,
            ]
        );
    }

    #[test]
    fn unordered_outcomes_mark_every_failure() {
        let outcomes = bulk_outcomes(&reply_with_errors(&[0, 2]), 4, false);

        assert_eq!(
            outcomes,
            vec![failed(), InsertOutcome::Inserted, failed(), InsertOutcome::Inserted]
        );
    }

    #[test]
    fn missing_id_is_generated_first() {
        let document = with_id(doc! { "number": 1 });

        assert_eq!(document.keys().next().map(String::as_str), Some("_id"));
        assert!(document.get_object_id("_id").is_ok());

        let kept = with_id(doc! { "_id": 5, "number": 1 });
        assert_eq!(kept, doc! { "_id": 5, "number": 1 });
    }

    #[test]
    fn names_are_checked() {
        assert!(validate_database_name("demo").is_ok());
        assert!(validate_database_name("a.b").is_err());
        assert!(validate_database_name("").is_err());
        assert!(validate_collection_name("numbers.archive").is_ok());
        assert!(validate_collection_name("$cmd").is_err());
    }
}
