//! Document codec and typed conversion helpers.
//!
//! Documents are [`bson::Document`] values: ordered maps of string keys to tagged values.
//! This module encodes them to and from raw BSON bytes and converts between documents and
//! serde models.

use bson::{
    Document,
    de::{deserialize_from_document, deserialize_from_slice},
    ser::{serialize_to_document, serialize_to_vec},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::ClientResult;

/// Encodes a document into its BSON byte representation.
///
/// # Errors
///
/// Returns [`ClientError::Serialization`](crate::error::ClientError::Serialization) if the
/// document cannot be encoded.
pub fn encode(document: &Document) -> ClientResult<Vec<u8>> {
    Ok(serialize_to_vec(document)?)
}

/// Decodes a document from BSON bytes.
///
/// `decode(&encode(d)?)? == d` holds for every document.
pub fn decode(bytes: &[u8]) -> ClientResult<Document> {
    Ok(deserialize_from_slice(bytes)?)
}

/// Converts a serde model into a document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> ClientResult<Document> {
    Ok(serialize_to_document(value)?)
}

/// Converts a document into a serde model.
pub fn from_document<T: DeserializeOwned>(document: Document) -> ClientResult<T> {
    Ok(deserialize_from_document(document)?)
}

/// Extension trait providing conversion utilities for serde models.
///
/// Implemented for every `Serialize + DeserializeOwned` type, so application models can be
/// handed to collection operations without manual conversion.
pub trait DocumentExt: Serialize + DeserializeOwned {
    /// Converts this model to a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the model does not serialize to a BSON document.
    fn to_document(&self) -> ClientResult<Document>;

    /// Creates a model from a document.
    fn from_document(document: Document) -> ClientResult<Self>;

    /// Converts this model to a JSON value.
    fn to_json(&self) -> ClientResult<Value>;

    /// Creates a model from a JSON value.
    fn from_json(value: Value) -> ClientResult<Self>;
}

impl<D: Serialize + DeserializeOwned> DocumentExt for D {
    fn to_document(&self) -> ClientResult<Document> {
        to_document(self)
    }

    fn from_document(document: Document) -> ClientResult<Self> {
        from_document(document)
    }

    fn to_json(&self) -> ClientResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> ClientResult<Self> {
        Ok(from_value(value)?)
    }
}
