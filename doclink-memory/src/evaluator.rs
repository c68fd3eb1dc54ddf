//! Query document parsing and evaluation for the in-memory server.
//!
//! Query documents arriving in commands are parsed back into [`Filter`] trees and evaluated
//! against stored documents through the [`FilterVisitor`] seam.

use std::cmp::Ordering;

use bson::{Bson, DateTime, Document, oid::ObjectId};

use doclink_core::{
    error::ClientError,
    filter::{FieldOp, Filter, FilterVisitor},
};

use crate::server::{CommandError, codes};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so `Int32`, `Int64` and `Double` compare with each
/// other. Documents compare structurally, key order included.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Document(&'a Document),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Document(doc),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Document(a), Comparable::Document(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted path. Numeric segments index into arrays.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Parses a query document into a filter tree.
///
/// Supports `$and`, `$or`, `$nor`, implicit equality and the field operators `$eq`, `$ne`,
/// `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$all` and `$exists`.
pub(crate) fn parse_query(query: &Document) -> Result<Filter, CommandError> {
    let mut clauses = Vec::new();
    for (key, value) in query {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let children = parse_clause_list(key, value)?;
                clauses.push(match key.as_str() {
                    "$and" => Filter::And(children),
                    "$or" => Filter::Or(children),
                    _ if children.len() == 1 => {
                        Filter::not(children.into_iter().next().unwrap_or_default())
                    }
                    _ => Filter::not(Filter::Or(children)),
                });
            }
            operator if operator.starts_with('$') => {
                return Err(CommandError::new(
                    codes::BAD_VALUE,
                    format!("unknown top level operator: {operator}"),
                ));
            }
            field => clauses.extend(parse_field(field, value)?),
        }
    }

    Ok(match clauses.len() {
        0 => Filter::MatchAll,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_clause_list(operator: &str, value: &Bson) -> Result<Vec<Filter>, CommandError> {
    let Bson::Array(items) = value else {
        return Err(CommandError::new(
            codes::BAD_VALUE,
            format!("{operator} must be an array"),
        ));
    };
    if items.is_empty() {
        return Err(CommandError::new(
            codes::BAD_VALUE,
            format!("{operator} argument must be a non-empty array"),
        ));
    }

    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => parse_query(clause),
            _ => Err(CommandError::new(
                codes::BAD_VALUE,
                format!("{operator} entries must be objects"),
            )),
        })
        .collect()
}

fn parse_field(field: &str, value: &Bson) -> Result<Vec<Filter>, CommandError> {
    let operators = match value {
        Bson::Document(inner) if inner.keys().next().is_some_and(|key| key.starts_with('$')) => {
            inner
        }
        other => return Ok(vec![Filter::eq(field, other.clone())]),
    };

    operators
        .iter()
        .map(|(operator, argument)| {
            if operator == "$exists" {
                return Ok(Filter::Exists(field.to_string(), truthy(argument)));
            }
            let op = FieldOp::from_operator(operator).ok_or_else(|| {
                CommandError::new(codes::BAD_VALUE, format!("unknown operator: {operator}"))
            })?;
            if matches!(op, FieldOp::In | FieldOp::Nin | FieldOp::All)
                && !matches!(argument, Bson::Array(_))
            {
                return Err(CommandError::new(
                    codes::BAD_VALUE,
                    format!("{operator} needs an array"),
                ));
            }

            Ok(Filter::field(field, op, argument.clone()))
        })
        .collect()
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(value) => *value,
        Bson::Int32(value) => *value != 0,
        Bson::Int64(value) => *value != 0,
        Bson::Double(value) => *value != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Evaluates a filter against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, filter: &Filter) -> bool {
        filter.accept(self).unwrap_or(false)
    }

    /// Equality with array fan-out: an array field matches when it equals the value or any
    /// element does. A missing field equals `null`.
    fn equals(field_value: Option<&Bson>, value: &Bson) -> bool {
        let expected = Comparable::from(value);
        match field_value {
            None => expected == Comparable::Null,
            Some(actual @ Bson::Array(items)) => {
                Comparable::from(actual) == expected
                    || items.iter().any(|item| Comparable::from(item) == expected)
            }
            Some(actual) => Comparable::from(actual) == expected,
        }
    }

    fn compare(field_value: Option<&Bson>, op: FieldOp, value: &Bson) -> bool {
        let matches = |candidate: &Bson| {
            match Comparable::from(candidate).partial_cmp(&Comparable::from(value)) {
                Some(ordering) => match op {
                    FieldOp::Gt => ordering == Ordering::Greater,
                    FieldOp::Gte => ordering != Ordering::Less,
                    FieldOp::Lt => ordering == Ordering::Less,
                    FieldOp::Lte => ordering != Ordering::Greater,
                    _ => false,
                },
                None => false,
            }
        };

        match field_value {
            None => false,
            Some(Bson::Array(items)) => items.iter().any(matches),
            Some(actual) => matches(actual),
        }
    }
}

impl<'a> FilterVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = ClientError;

    fn visit_match_all(&mut self) -> Result<bool, ClientError> {
        Ok(true)
    }

    fn visit_and(&mut self, exprs: &[Filter]) -> Result<bool, ClientError> {
        for expr in exprs {
            if !self.visit_filter(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Filter]) -> Result<bool, ClientError> {
        for expr in exprs {
            if self.visit_filter(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Filter) -> Result<bool, ClientError> {
        Ok(!self.visit_filter(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<bool, ClientError> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> Result<bool, ClientError> {
        let field_value = lookup(self.document, field);
        let values = match value {
            Bson::Array(values) => values.as_slice(),
            _ => std::slice::from_ref(value),
        };

        Ok(match op {
            FieldOp::Eq => Self::equals(field_value, value),
            FieldOp::Ne => !Self::equals(field_value, value),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                Self::compare(field_value, op, value)
            }
            FieldOp::In => values
                .iter()
                .any(|candidate| Self::equals(field_value, candidate)),
            FieldOp::Nin => !values
                .iter()
                .any(|candidate| Self::equals(field_value, candidate)),
            FieldOp::All => match field_value {
                Some(Bson::Array(_)) => values
                    .iter()
                    .all(|candidate| Self::equals(field_value, candidate)),
                _ => false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    fn matches(query: Document, document: &Document) -> bool {
        let filter = parse_query(&query).unwrap();
        DocumentEvaluator::new(document).evaluate(&filter)
    }

    #[test]
    fn round_trips_client_filters() {
        let filter = Filter::and([
            Filter::lte("number", 5),
            Filter::not(Filter::eq("kind", "skip")),
        ])
        .unwrap();
        let query = filter.to_document().unwrap();

        assert_eq!(parse_query(&query).unwrap(), Filter::And(vec![
            Filter::lte("number", 5),
            Filter::not(Filter::eq("kind", "skip")),
        ]));
    }

    #[test]
    fn numeric_comparisons_cross_types() {
        let document = doc! { "number": 5_i64 };

        assert!(matches(doc! { "number": { "$lte": 5 } }, &document));
        assert!(matches(doc! { "number": { "$gt": 4.5 } }, &document));
        assert!(!matches(doc! { "number": { "$lt": 5 } }, &document));
        assert!(!matches(doc! { "number": { "$gt": "4" } }, &document));
    }

    #[test]
    fn missing_fields_equal_null() {
        let document = doc! { "a": 1 };

        assert!(matches(doc! { "b": Bson::Null }, &document));
        assert!(matches(doc! { "b": { "$exists": false } }, &document));
        assert!(!matches(doc! { "b": { "$gt": 0 } }, &document));
        assert!(matches(doc! { "b": { "$ne": 1 } }, &document));
    }

    #[test]
    fn arrays_fan_out() {
        let document = doc! { "tags": ["red", "blue"], "nested": { "depth": [1, 2, 3] } };

        assert!(matches(doc! { "tags": "red" }, &document));
        assert!(matches(doc! { "tags": { "$in": ["green", "blue"] } }, &document));
        assert!(matches(doc! { "tags": { "$nin": ["green"] } }, &document));
        assert!(matches(doc! { "tags": { "$all": ["blue", "red"] } }, &document));
        assert!(!matches(doc! { "tags": { "$all": ["blue", "green"] } }, &document));
        assert!(matches(doc! { "nested.depth": { "$gte": 3 } }, &document));
        assert!(matches(doc! { "nested.depth.0": 1 }, &document));
    }

    #[test]
    fn logical_operators() {
        let document = doc! { "a": 1, "b": 2 };

        assert!(matches(doc! { "$or": [{ "a": 2 }, { "b": 2 }] }, &document));
        assert!(matches(doc! { "$nor": [{ "a": 2 }] }, &document));
        assert!(!matches(doc! { "$and": [{ "a": 1 }, { "b": 3 }] }, &document));
        assert!(matches(doc! { "a": { "$gte": 1, "$lt": 2 } }, &document));
    }

    #[test]
    fn malformed_queries_are_rejected() {
        assert!(parse_query(&doc! { "$where": "1" }).is_err());
        assert!(parse_query(&doc! { "$and": [] }).is_err());
        assert!(parse_query(&doc! { "a": { "$regex": "x" } }).is_err());
        assert!(parse_query(&doc! { "a": { "$in": 1 } }).is_err());
    }
}
