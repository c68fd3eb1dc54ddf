//! Command documents and reply parsing.
//!
//! Every operation is expressed as a command document whose first key names the command
//! and holds the target collection. Replies carry `ok`, plus `code`/`errmsg` on failure.

use bson::{Bson, Document, doc};

use crate::{
    config::WriteConcern,
    error::{ClientError, ClientResult},
};

/// Returns the reply if it reports success, otherwise the mapped server error.
pub fn check_reply(reply: Document) -> ClientResult<Document> {
    if reply_ok(&reply) {
        return Ok(reply);
    }

    let code = reply
        .get("code")
        .and_then(as_i64)
        .map(|code| code as i32)
        .unwrap_or_default();
    let message = reply
        .get_str("errmsg")
        .unwrap_or("command failed without an error message")
        .to_string();

    Err(ClientError::from_server(code, message))
}

fn reply_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Boolean(ok)) => *ok,
        Some(value) => as_f64(value) == Some(1.0),
        None => false,
    }
}

pub(crate) fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn count_field(reply: &Document, key: &str) -> u64 {
    reply
        .get(key)
        .and_then(as_i64)
        .map(|n| n.max(0) as u64)
        .unwrap_or_default()
}

pub fn ping() -> Document {
    doc! { "ping": 1 }
}

pub fn insert(
    collection: &str,
    documents: Vec<Document>,
    ordered: bool,
    write_concern: &WriteConcern,
) -> Document {
    doc! {
        "insert": collection,
        "documents": documents,
        "ordered": ordered,
        "writeConcern": write_concern.to_document(),
    }
}

pub fn find(
    collection: &str,
    filter: Document,
    projection: Document,
    limit: Option<u64>,
    batch_size: u32,
) -> Document {
    let mut command = doc! {
        "find": collection,
        "filter": filter,
    };
    if !projection.is_empty() {
        command.insert("projection", projection);
    }
    if let Some(limit) = limit {
        command.insert("limit", limit as i64);
    }
    command.insert("batchSize", i64::from(batch_size));
    command
}

pub fn get_more(collection: &str, cursor_id: i64, batch_size: u32) -> Document {
    doc! {
        "getMore": cursor_id,
        "collection": collection,
        "batchSize": i64::from(batch_size),
    }
}

pub fn kill_cursors(collection: &str, cursor_ids: &[i64]) -> Document {
    doc! {
        "killCursors": collection,
        "cursors": cursor_ids.to_vec(),
    }
}

pub fn count(collection: &str, filter: Document) -> Document {
    doc! {
        "count": collection,
        "query": filter,
    }
}

pub fn update(
    collection: &str,
    filter: Document,
    update: Document,
    multi: bool,
    upsert: bool,
    write_concern: &WriteConcern,
) -> Document {
    doc! {
        "update": collection,
        "updates": [{
            "q": filter,
            "u": update,
            "multi": multi,
            "upsert": upsert,
        }],
        "writeConcern": write_concern.to_document(),
    }
}

pub fn delete(
    collection: &str,
    filter: Document,
    single: bool,
    write_concern: &WriteConcern,
) -> Document {
    doc! {
        "delete": collection,
        "deletes": [{
            "q": filter,
            "limit": i32::from(single),
        }],
        "writeConcern": write_concern.to_document(),
    }
}

/// A `findAndModify` command. `update == None` removes the matched document.
pub fn find_and_modify(
    collection: &str,
    filter: Document,
    update: Option<Document>,
    return_new: bool,
    upsert: bool,
    write_concern: &WriteConcern,
) -> Document {
    let mut command = doc! {
        "findAndModify": collection,
        "query": filter,
    };
    match update {
        Some(update) => {
            command.insert("update", update);
            command.insert("new", return_new);
            command.insert("upsert", upsert);
        }
        None => {
            command.insert("remove", true);
        }
    }
    command.insert("writeConcern", write_concern.to_document());
    command
}

pub fn list_databases(name_only: bool) -> Document {
    doc! { "listDatabases": 1, "nameOnly": name_only }
}

pub fn list_collections(name_only: bool) -> Document {
    doc! { "listCollections": 1, "nameOnly": name_only }
}

pub fn create_collection(collection: &str) -> Document {
    doc! { "create": collection }
}

pub fn drop_collection(collection: &str) -> Document {
    doc! { "drop": collection }
}

/// The `cursor` sub-document of a `find`, `getMore` or `listCollections` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorReply {
    /// `0` once the server has no more results.
    pub id: i64,
    pub batch: Vec<Document>,
}

impl CursorReply {
    pub fn parse(reply: &Document) -> ClientResult<Self> {
        let cursor = reply
            .get_document("cursor")
            .map_err(|_| malformed("reply has no cursor document"))?;
        let id = cursor
            .get("id")
            .and_then(as_i64)
            .ok_or_else(|| malformed("cursor has no id"))?;
        let batch = cursor
            .get_array("firstBatch")
            .or_else(|_| cursor.get_array("nextBatch"))
            .map_err(|_| malformed("cursor has no batch"))?
            .iter()
            .map(|entry| match entry {
                Bson::Document(document) => Ok(document.clone()),
                other => Err(malformed(&format!("batch entry is not a document: {other}"))),
            })
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(Self { id, batch })
    }
}

/// One entry of a reply's `writeErrors` array.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteErrorEntry {
    pub index: usize,
    pub code: i32,
    pub message: String,
}

/// The counters of an `insert`, `update` or `delete` reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteReply {
    pub n: u64,
    pub n_modified: u64,
    pub upserted_id: Option<Bson>,
    pub write_errors: Vec<WriteErrorEntry>,
}

impl WriteReply {
    pub fn parse(reply: &Document) -> Self {
        let upserted_id = reply
            .get_array("upserted")
            .ok()
            .and_then(|upserted| upserted.first())
            .and_then(|entry| entry.as_document())
            .and_then(|entry| entry.get("_id"))
            .cloned();
        let write_errors = reply
            .get_array("writeErrors")
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(Bson::as_document)
                    .map(|entry| WriteErrorEntry {
                        index: count_field(entry, "index") as usize,
                        code: entry
                            .get("code")
                            .and_then(as_i64)
                            .map(|code| code as i32)
                            .unwrap_or_default(),
                        message: entry.get_str("errmsg").unwrap_or_default().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            n: count_field(reply, "n"),
            n_modified: count_field(reply, "nModified"),
            upserted_id,
            write_errors,
        }
    }

    /// The first write error as a client error, if any.
    pub fn first_error(&self) -> Option<ClientError> {
        self.write_errors
            .first()
            .map(|entry| ClientError::from_server(entry.code, entry.message.clone()))
    }
}

/// Returns the `value` of a `findAndModify` reply.
pub fn find_and_modify_value(reply: &Document) -> Option<Document> {
    match reply.get("value") {
        Some(Bson::Document(document)) => Some(document.clone()),
        _ => None,
    }
}

/// Reads `n` from a `count` reply.
pub fn count_value(reply: &Document) -> u64 {
    count_field(reply, "n")
}

fn malformed(message: &str) -> ClientError {
    ClientError::BackendError {
        code: 0,
        message: format!("malformed reply: {message}"),
    }
}
