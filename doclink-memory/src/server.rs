//! In-process document server.
//!
//! [`MemoryServer`] answers the same command documents a remote server would, keeping every
//! database in memory behind an async read-write lock. Write commands hold the write lock
//! for their whole duration, so each one is atomic with respect to every other command.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use bson::{Bson, Document, doc, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::trace;

use doclink_core::{document, filter::Filter};

use crate::{
    apply::{apply_update, project, upsert_seed},
    evaluator::{Comparable, DocumentEvaluator, parse_query},
};

/// Batch size used when a command does not ask for one.
const DEFAULT_BATCH_SIZE: usize = 101;

/// Server error codes.
pub(crate) mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const FAILED_TO_PARSE: i32 = 9;
    pub const TYPE_MISMATCH: i32 = 14;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const PATH_NOT_VIABLE: i32 = 28;
    pub const CURSOR_NOT_FOUND: i32 = 43;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const COMMAND_NOT_FOUND: i32 = 59;
    pub const IMMUTABLE_FIELD: i32 = 66;
    pub const INVALID_NAMESPACE: i32 = 73;
    pub const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
    pub const DUPLICATE_KEY: i32 = 11000;

    pub fn name(code: i32) -> &'static str {
        match code {
            BAD_VALUE => "BadValue",
            FAILED_TO_PARSE => "FailedToParse",
            TYPE_MISMATCH => "TypeMismatch",
            NAMESPACE_NOT_FOUND => "NamespaceNotFound",
            PATH_NOT_VIABLE => "PathNotViable",
            CURSOR_NOT_FOUND => "CursorNotFound",
            NAMESPACE_EXISTS => "NamespaceExists",
            COMMAND_NOT_FOUND => "CommandNotFound",
            IMMUTABLE_FIELD => "ImmutableField",
            INVALID_NAMESPACE => "InvalidNamespace",
            DOCUMENT_VALIDATION_FAILURE => "DocumentValidationFailure",
            DUPLICATE_KEY => "DuplicateKey",
            _ => "UnknownError",
        }
    }
}

/// A command failure, rendered as an `ok: 0` reply or a `writeErrors` entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CommandError {
    pub code: i32,
    pub message: String,
}

impl CommandError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn into_reply(self) -> Document {
        doc! {
            "ok": 0.0,
            "errmsg": self.message,
            "code": self.code,
            "codeName": codes::name(self.code),
        }
    }

    fn into_write_error(self, index: usize) -> Document {
        doc! {
            "index": index as i64,
            "code": self.code,
            "errmsg": self.message,
        }
    }
}

#[derive(Debug, Default)]
struct CollectionData {
    documents: Vec<Document>,
    validator: Option<Filter>,
}

#[derive(Debug, Default)]
struct UpdateOutcome {
    matched: u64,
    modified: u64,
    upserted_id: Option<Bson>,
}

impl CollectionData {
    fn matches(document: &Document, query: &Filter) -> bool {
        DocumentEvaluator::new(document).evaluate(query)
    }

    fn check_validator(&self, document: &Document) -> Result<(), CommandError> {
        match &self.validator {
            Some(validator) if !Self::matches(document, validator) => Err(CommandError::new(
                codes::DOCUMENT_VALIDATION_FAILURE,
                "Document failed validation",
            )),
            _ => Ok(()),
        }
    }

    /// Inserts one document, generating an `_id` first when it has none.
    fn insert(&mut self, document: Document) -> Result<(), CommandError> {
        let document = if document.contains_key("_id") {
            document
        } else {
            let mut with_id = doc! { "_id": ObjectId::new() };
            with_id.extend(document);
            with_id
        };

        if let Some(id) = document.get("_id") {
            let id = Comparable::from(id);
            let duplicate = self.documents.iter().any(|existing| {
                existing
                    .get("_id")
                    .is_some_and(|existing| Comparable::from(existing) == id)
            });
            if duplicate {
                return Err(CommandError::new(
                    codes::DUPLICATE_KEY,
                    format!(
                        "E11000 duplicate key error dup key: {{ _id: {} }}",
                        document.get("_id").unwrap_or(&Bson::Null)
                    ),
                ));
            }
        }
        self.check_validator(&document)?;
        self.documents.push(document);

        Ok(())
    }

    fn update_matching(
        &mut self,
        query: &Filter,
        update: &Document,
        multi: bool,
    ) -> Result<UpdateOutcome, CommandError> {
        let mut outcome = UpdateOutcome::default();
        for index in 0..self.documents.len() {
            if !Self::matches(&self.documents[index], query) {
                continue;
            }

            outcome.matched += 1;
            let mut candidate = self.documents[index].clone();
            if apply_update(&mut candidate, update)? {
                self.check_validator(&candidate)?;
                self.documents[index] = candidate;
                outcome.modified += 1;
            }
            if !multi {
                break;
            }
        }

        Ok(outcome)
    }

    fn delete_matching(&mut self, query: &Filter, single: bool) -> usize {
        if single {
            return match self
                .documents
                .iter()
                .position(|document| Self::matches(document, query))
            {
                Some(index) => {
                    self.documents.remove(index);
                    1
                }
                None => 0,
            };
        }

        let before = self.documents.len();
        self.documents
            .retain(|document| !Self::matches(document, query));
        before - self.documents.len()
    }

    fn size_on_disk(&self) -> i64 {
        self.documents
            .iter()
            .map(|document| document::encode(document).map_or(0, |bytes| bytes.len() as i64))
            .sum()
    }
}

/// Results of a `find` not yet returned to the client.
#[derive(Debug)]
struct ServerCursor {
    database: String,
    collection: String,
    pending: VecDeque<Document>,
}

type CollectionMap = BTreeMap<String, CollectionData>;

#[derive(Debug, Default)]
struct Storage {
    databases: BTreeMap<String, CollectionMap>,
    cursors: HashMap<i64, ServerCursor>,
    next_cursor_id: i64,
}

impl Storage {
    fn collection(&self, database: &str, collection: &str) -> Option<&CollectionData> {
        self.databases
            .get(database)
            .and_then(|collections| collections.get(collection))
    }

    fn collection_mut(&mut self, database: &str, collection: &str) -> Option<&mut CollectionData> {
        self.databases
            .get_mut(database)
            .and_then(|collections| collections.get_mut(collection))
    }

    /// Returns the collection, creating it (and its database) implicitly.
    fn collection_entry(&mut self, database: &str, collection: &str) -> &mut CollectionData {
        self.databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
    }

    fn documents(&self, database: &str, collection: &str) -> &[Document] {
        self.collection(database, collection)
            .map(|data| data.documents.as_slice())
            .unwrap_or_default()
    }

    /// Registers the remaining results and returns the cursor id, or `0` when nothing
    /// remains.
    fn open_cursor(
        &mut self,
        database: &str,
        collection: &str,
        pending: VecDeque<Document>,
    ) -> i64 {
        if pending.is_empty() {
            return 0;
        }

        self.next_cursor_id += 1;
        let id = self.next_cursor_id;
        self.cursors.insert(id, ServerCursor {
            database: database.to_string(),
            collection: collection.to_string(),
            pending,
        });

        id
    }

    fn apply_update_statement(
        &mut self,
        database: &str,
        collection: &str,
        statement: &Document,
    ) -> Result<UpdateOutcome, CommandError> {
        let query = parse_query(&document_arg(statement, "q")?)?;
        let update = document_arg(statement, "u")?;
        let multi = bool_arg(statement, "multi", false);
        let upsert = bool_arg(statement, "upsert", false);

        if let Some(data) = self.collection_mut(database, collection) {
            let outcome = data.update_matching(&query, &update, multi)?;
            if outcome.matched > 0 || !upsert {
                return Ok(outcome);
            }
        } else if !upsert {
            return Ok(UpdateOutcome::default());
        }

        let seed = upsert_seed(&query, &update)?;
        let id = seed.get("_id").cloned().unwrap_or(Bson::Null);
        self.collection_entry(database, collection).insert(seed)?;

        Ok(UpdateOutcome {
            upserted_id: Some(id),
            ..UpdateOutcome::default()
        })
    }
}

/// An in-process server holding every database in memory.
///
/// `MemoryServer` is cloneable; clones share the same storage.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use doclink_memory::MemoryServer;
///
/// let server = MemoryServer::new();
/// let reply = server
///     .handle("demo", doc! { "insert": "numbers", "documents": [{ "n": 1 }] })
///     .await;
/// assert_eq!(reply.get_i64("n")?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct MemoryServer {
    state: Arc<RwLock<Storage>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes one command against `database` and returns the reply document.
    ///
    /// Failures are reported in the reply (`ok: 0` with `code` and `errmsg`), never as a Rust
    /// error, the same way a remote server reports them.
    pub async fn handle(&self, database: &str, command: Document) -> Document {
        let Some(name) = command.keys().next().cloned() else {
            return CommandError::new(codes::FAILED_TO_PARSE, "empty command").into_reply();
        };
        trace!(database, command = %name, "handling command");

        let outcome = match name.as_str() {
            "ping" | "hello" | "isMaster" => Ok(Document::new()),
            "insert" => self.insert(database, &command).await,
            "find" => self.find(database, &command).await,
            "getMore" => self.get_more(database, &command).await,
            "killCursors" => self.kill_cursors(&command).await,
            "count" => self.count(database, &command).await,
            "update" => self.update(database, &command).await,
            "delete" => self.delete(database, &command).await,
            "findAndModify" => self.find_and_modify(database, &command).await,
            "listDatabases" => self.list_databases(&command).await,
            "listCollections" => self.list_collections(database).await,
            "create" => self.create(database, &command).await,
            "drop" => self.drop_collection(database, &command).await,
            other => Err(CommandError::new(
                codes::COMMAND_NOT_FOUND,
                format!("no such command: '{other}'"),
            )),
        };

        match outcome {
            Ok(mut reply) => {
                reply.insert("ok", 1.0);
                reply
            }
            Err(err) => err.into_reply(),
        }
    }

    /// Installs a validator: documents that do not match it are rejected with a
    /// validation failure on insert and update. Creates the collection if needed.
    pub async fn set_validator(&self, database: &str, collection: &str, validator: Filter) {
        let mut state = self.state.write().await;
        state.collection_entry(database, collection).validator = Some(validator);
    }

    /// A snapshot of the stored documents of one collection, in insertion order.
    pub async fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let state = self.state.read().await;
        state.documents(database, collection).to_vec()
    }

    /// The number of server-side cursors still holding results.
    pub async fn open_cursors(&self) -> usize {
        self.state.read().await.cursors.len()
    }

    async fn insert(&self, database: &str, command: &Document) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "insert")?;
        let documents = command.get_array("documents").map_err(|_| {
            CommandError::new(codes::FAILED_TO_PARSE, "insert needs a 'documents' array")
        })?;
        let ordered = bool_arg(command, "ordered", true);

        let mut state = self.state.write().await;
        let data = state.collection_entry(database, collection);
        let mut inserted = 0_i64;
        let mut write_errors = Vec::new();
        for (index, entry) in documents.iter().enumerate() {
            let outcome = match entry {
                Bson::Document(document) => data.insert(document.clone()),
                _ => Err(CommandError::new(
                    codes::BAD_VALUE,
                    "'documents' entries must be objects",
                )),
            };
            match outcome {
                Ok(()) => inserted += 1,
                Err(err) => {
                    write_errors.push(err.into_write_error(index));
                    if ordered {
                        break;
                    }
                }
            }
        }

        let mut reply = doc! { "n": inserted };
        if !write_errors.is_empty() {
            reply.insert("writeErrors", write_errors);
        }

        Ok(reply)
    }

    async fn find(&self, database: &str, command: &Document) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "find")?;
        let query = parse_query(&document_arg(command, "filter")?)?;
        let projection = document_arg(command, "projection")?;
        let limit = int_arg(command, "limit")
            .filter(|limit| *limit > 0)
            .map_or(usize::MAX, |limit| limit as usize);
        let batch_size = batch_size_arg(command);

        let mut state = self.state.write().await;
        let mut matched = state
            .documents(database, collection)
            .iter()
            .filter(|document| CollectionData::matches(document, &query))
            .take(limit)
            .map(|document| project(document, &projection))
            .collect::<VecDeque<_>>();
        let first = batch_size.min(matched.len());
        let first_batch = matched.drain(..first).collect::<Vec<_>>();
        let id = state.open_cursor(database, collection, matched);

        Ok(cursor_reply(database, collection, id, "firstBatch", first_batch))
    }

    async fn get_more(&self, database: &str, command: &Document) -> Result<Document, CommandError> {
        let id = int_arg(command, "getMore")
            .ok_or_else(|| CommandError::new(codes::FAILED_TO_PARSE, "getMore needs a cursor id"))?;
        let collection = collection_arg(command, "collection")?;
        let batch_size = batch_size_arg(command);

        let mut state = self.state.write().await;
        let not_found = || {
            CommandError::new(codes::CURSOR_NOT_FOUND, format!("cursor id {id} not found"))
        };
        let cursor = state.cursors.get_mut(&id).ok_or_else(not_found)?;
        if cursor.database != database || cursor.collection != collection {
            return Err(not_found());
        }

        let take = batch_size.min(cursor.pending.len());
        let batch = cursor.pending.drain(..take).collect::<Vec<_>>();
        let next_id = if cursor.pending.is_empty() {
            state.cursors.remove(&id);
            0
        } else {
            id
        };

        Ok(cursor_reply(database, collection, next_id, "nextBatch", batch))
    }

    async fn kill_cursors(&self, command: &Document) -> Result<Document, CommandError> {
        collection_arg(command, "killCursors")?;
        let ids = command
            .get_array("cursors")
            .map(|ids| ids.iter().filter_map(as_i64).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut state = self.state.write().await;
        let (killed, not_found): (Vec<i64>, Vec<i64>) = ids
            .into_iter()
            .partition(|id| state.cursors.remove(id).is_some());

        Ok(doc! {
            "cursorsKilled": killed,
            "cursorsNotFound": not_found,
        })
    }

    async fn count(&self, database: &str, command: &Document) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "count")?;
        let query = parse_query(&document_arg(command, "query")?)?;

        let state = self.state.read().await;
        let n = state
            .documents(database, collection)
            .iter()
            .filter(|document| CollectionData::matches(document, &query))
            .count();

        Ok(doc! { "n": n as i64 })
    }

    async fn update(&self, database: &str, command: &Document) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "update")?;
        let statements = command.get_array("updates").map_err(|_| {
            CommandError::new(codes::FAILED_TO_PARSE, "update needs an 'updates' array")
        })?;

        let mut state = self.state.write().await;
        let mut matched = 0_u64;
        let mut modified = 0_u64;
        let mut upserted = Vec::new();
        let mut write_errors = Vec::new();
        for (index, statement) in statements.iter().enumerate() {
            let outcome = match statement {
                Bson::Document(statement) => {
                    state.apply_update_statement(database, collection, statement)
                }
                _ => Err(CommandError::new(
                    codes::FAILED_TO_PARSE,
                    "'updates' entries must be objects",
                )),
            };
            match outcome {
                Ok(outcome) => {
                    matched += outcome.matched;
                    modified += outcome.modified;
                    if let Some(id) = outcome.upserted_id {
                        upserted.push(doc! { "index": index as i64, "_id": id });
                    }
                }
                Err(err) => {
                    write_errors.push(err.into_write_error(index));
                    break;
                }
            }
        }

        let mut reply = doc! {
            "n": (matched + upserted.len() as u64) as i64,
            "nModified": modified as i64,
        };
        if !upserted.is_empty() {
            reply.insert("upserted", upserted);
        }
        if !write_errors.is_empty() {
            reply.insert("writeErrors", write_errors);
        }

        Ok(reply)
    }

    async fn delete(&self, database: &str, command: &Document) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "delete")?;
        let statements = command.get_array("deletes").map_err(|_| {
            CommandError::new(codes::FAILED_TO_PARSE, "delete needs a 'deletes' array")
        })?;

        let mut state = self.state.write().await;
        let mut deleted = 0_usize;
        for statement in statements {
            let Bson::Document(statement) = statement else {
                return Err(CommandError::new(
                    codes::FAILED_TO_PARSE,
                    "'deletes' entries must be objects",
                ));
            };
            let query = parse_query(&document_arg(statement, "q")?)?;
            let single = int_arg(statement, "limit") == Some(1);
            if let Some(data) = state.collection_mut(database, collection) {
                deleted += data.delete_matching(&query, single);
            }
        }

        Ok(doc! { "n": deleted as i64 })
    }

    async fn find_and_modify(
        &self,
        database: &str,
        command: &Document,
    ) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "findAndModify")?;
        let query = parse_query(&document_arg(command, "query")?)?;
        let update = match command.get("update") {
            Some(Bson::Document(update)) => Some(update.clone()),
            Some(_) => {
                return Err(CommandError::new(
                    codes::FAILED_TO_PARSE,
                    "'update' must be an object",
                ));
            }
            None => None,
        };
        if update.is_none() && !bool_arg(command, "remove", false) {
            return Err(CommandError::new(
                codes::FAILED_TO_PARSE,
                "either an update or remove=true must be specified",
            ));
        }
        let return_new = bool_arg(command, "new", false);
        let upsert = bool_arg(command, "upsert", false);

        let mut state = self.state.write().await;
        let position = state.collection(database, collection).and_then(|data| {
            data.documents
                .iter()
                .position(|document| CollectionData::matches(document, &query))
        });

        let (value, last_error) = match (position, update) {
            (Some(index), None) => {
                let removed = state
                    .collection_mut(database, collection)
                    .map(|data| data.documents.remove(index));
                (removed.map_or(Bson::Null, Bson::Document), doc! { "n": 1 })
            }
            (Some(index), Some(update)) => {
                let Some(data) = state.collection_mut(database, collection) else {
                    return Err(CommandError::new(codes::NAMESPACE_NOT_FOUND, "ns not found"));
                };
                let before = data.documents[index].clone();
                let mut after = before.clone();
                if apply_update(&mut after, &update)? {
                    data.check_validator(&after)?;
                    data.documents[index] = after.clone();
                }
                let value = if return_new { after } else { before };
                (Bson::Document(value), doc! { "n": 1, "updatedExisting": true })
            }
            (None, Some(update)) if upsert => {
                let seed = upsert_seed(&query, &update)?;
                let id = seed.get("_id").cloned().unwrap_or(Bson::Null);
                state
                    .collection_entry(database, collection)
                    .insert(seed.clone())?;
                let value = if return_new {
                    Bson::Document(seed)
                } else {
                    Bson::Null
                };
                (value, doc! { "n": 1, "updatedExisting": false, "upserted": id })
            }
            (None, Some(_)) => (Bson::Null, doc! { "n": 0, "updatedExisting": false }),
            (None, None) => (Bson::Null, doc! { "n": 0 }),
        };

        Ok(doc! {
            "lastErrorObject": last_error,
            "value": value,
        })
    }

    async fn list_databases(&self, command: &Document) -> Result<Document, CommandError> {
        let name_only = bool_arg(command, "nameOnly", false);

        let state = self.state.read().await;
        let mut total_size = 0_i64;
        let databases = state
            .databases
            .iter()
            .map(|(name, collections)| {
                if name_only {
                    return doc! { "name": name.as_str() };
                }

                let size = collections.values().map(CollectionData::size_on_disk).sum::<i64>();
                total_size += size;
                doc! {
                    "name": name.as_str(),
                    "sizeOnDisk": size,
                    "empty": collections.values().all(|data| data.documents.is_empty()),
                }
            })
            .collect::<Vec<_>>();

        let mut reply = doc! { "databases": databases };
        if !name_only {
            reply.insert("totalSize", total_size);
        }

        Ok(reply)
    }

    async fn list_collections(&self, database: &str) -> Result<Document, CommandError> {
        let state = self.state.read().await;
        let batch = state
            .databases
            .get(database)
            .map(|collections| {
                collections
                    .keys()
                    .map(|name| doc! { "name": name.as_str(), "type": "collection" })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(cursor_reply(database, "$cmd.listCollections", 0, "firstBatch", batch))
    }

    async fn create(&self, database: &str, command: &Document) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "create")?;
        let validator = match command.get("validator") {
            Some(Bson::Document(validator)) => Some(parse_query(validator)?),
            Some(_) => {
                return Err(CommandError::new(
                    codes::FAILED_TO_PARSE,
                    "'validator' must be an object",
                ));
            }
            None => None,
        };

        let mut state = self.state.write().await;
        if state.collection(database, collection).is_some() {
            return Err(CommandError::new(
                codes::NAMESPACE_EXISTS,
                format!("Collection {database}.{collection} already exists."),
            ));
        }
        state.collection_entry(database, collection).validator = validator;

        Ok(Document::new())
    }

    async fn drop_collection(
        &self,
        database: &str,
        command: &Document,
    ) -> Result<Document, CommandError> {
        let collection = collection_arg(command, "drop")?;

        let mut state = self.state.write().await;
        let storage = &mut *state;
        let Some(collections) = storage.databases.get_mut(database) else {
            return Err(CommandError::new(codes::NAMESPACE_NOT_FOUND, "ns not found"));
        };
        if collections.remove(collection).is_none() {
            return Err(CommandError::new(codes::NAMESPACE_NOT_FOUND, "ns not found"));
        }
        if collections.is_empty() {
            storage.databases.remove(database);
        }
        storage
            .cursors
            .retain(|_, cursor| cursor.database != database || cursor.collection != collection);

        Ok(doc! { "ns": format!("{database}.{collection}") })
    }
}

fn cursor_reply(
    database: &str,
    collection: &str,
    id: i64,
    batch_key: &str,
    batch: Vec<Document>,
) -> Document {
    let mut cursor = doc! {
        "id": id,
        "ns": format!("{database}.{collection}"),
    };
    cursor.insert(batch_key, batch);

    doc! { "cursor": cursor }
}

fn collection_arg<'a>(command: &'a Document, key: &str) -> Result<&'a str, CommandError> {
    match command.get_str(key) {
        Ok(name) if !name.is_empty() => Ok(name),
        _ => Err(CommandError::new(
            codes::INVALID_NAMESPACE,
            format!("'{key}' needs a collection name"),
        )),
    }
}

/// A document argument; missing means empty.
fn document_arg(command: &Document, key: &str) -> Result<Document, CommandError> {
    match command.get(key) {
        Some(Bson::Document(value)) => Ok(value.clone()),
        None => Ok(Document::new()),
        Some(_) => Err(CommandError::new(
            codes::FAILED_TO_PARSE,
            format!("'{key}' must be an object"),
        )),
    }
}

fn bool_arg(command: &Document, key: &str, default: bool) -> bool {
    match command.get(key) {
        Some(Bson::Boolean(value)) => *value,
        Some(value) => as_i64(value).map_or(default, |value| value != 0),
        None => default,
    }
}

fn int_arg(command: &Document, key: &str) -> Option<i64> {
    command.get(key).and_then(as_i64)
}

fn batch_size_arg(command: &Document) -> usize {
    int_arg(command, "batchSize")
        .filter(|size| *size > 0)
        .map_or(DEFAULT_BATCH_SIZE, |size| size as usize)
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}
