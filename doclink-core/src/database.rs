//! Database handles.

use std::sync::Arc;

use bson::Document;

use crate::{
    collection::{Collection, validate_collection_name, validate_database_name},
    command::{self, CursorReply},
    error::{ClientError, ClientResult},
    instrument::instrument,
    pool::ConnectionManager,
    transport::Transport,
};

/// Server error code reported when a namespace does not exist.
const NAMESPACE_NOT_FOUND_CODE: i32 = 26;

/// A handle to one database of a client.
pub struct Database<T: Transport> {
    name: String,
    manager: Arc<ConnectionManager<T>>,
}

impl<T: Transport> Clone for Database<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            manager: self.manager.clone(),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Database<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .finish()
    }
}

impl<T: Transport> Database<T> {
    pub(crate) fn new(name: String, manager: Arc<ConnectionManager<T>>) -> Self {
        Self { name, manager }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a handle to a collection. Collections are created implicitly on first insert.
    pub fn collection(&self, name: &str) -> Collection<T> {
        Collection::new(self.name.clone(), name.to_string(), self.manager.clone())
    }

    /// Lists the names of every collection in this database.
    pub async fn list_collection_names(&self) -> ClientResult<Vec<String>> {
        instrument("list_collection_names", &self.name, async {
            validate_database_name(&self.name)?;
            let reply = self
                .run(&command::list_collections(true), self.manager.config().max_read_retries)
                .await?;

            Ok(CursorReply::parse(&reply)?
                .batch
                .iter()
                .filter_map(|entry| entry.get_str("name").ok())
                .map(str::to_string)
                .collect())
        })
        .await
    }

    /// Creates a collection explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BackendError`] if the collection already exists.
    pub async fn create_collection(&self, name: &str) -> ClientResult<()> {
        instrument("create_collection", &self.namespace(name), async {
            validate_database_name(&self.name)?;
            validate_collection_name(name)?;
            self.run(&command::create_collection(name), 0).await?;

            Ok(())
        })
        .await
    }

    /// Drops a collection and every document in it. Dropping a missing collection succeeds.
    pub async fn drop_collection(&self, name: &str) -> ClientResult<()> {
        instrument("drop_collection", &self.namespace(name), async {
            validate_database_name(&self.name)?;
            validate_collection_name(name)?;
            match self.run(&command::drop_collection(name), 0).await {
                Ok(_) => Ok(()),
                Err(ClientError::BackendError {
                    code: NAMESPACE_NOT_FOUND_CODE,
                    ..
                }) => Ok(()),
                Err(err) => Err(err),
            }
        })
        .await
    }

    async fn run(&self, command: &Document, retries: u32) -> ClientResult<Document> {
        let reply = self
            .manager
            .execute(&self.name, command, retries)
            .await?;

        command::check_reply(reply)
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{collection}", self.name)
    }
}
