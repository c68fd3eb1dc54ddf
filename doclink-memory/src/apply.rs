//! Update and projection application for stored documents.

use bson::{Bson, Document, oid::ObjectId};

use doclink_core::filter::{FieldOp, Filter};

use crate::server::{CommandError, codes};

/// Applies an update document (`$set`, `$inc`, `$unset`, `$push`) to `document` in place.
///
/// Returns `true` when the document changed. The update is applied to a copy first so a
/// failing operator leaves `document` untouched.
pub(crate) fn apply_update(
    document: &mut Document,
    update: &Document,
) -> Result<bool, CommandError> {
    if update.is_empty() {
        return Err(CommandError::new(codes::FAILED_TO_PARSE, "update document is empty"));
    }

    let mut updated = document.clone();
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(CommandError::new(
                codes::FAILED_TO_PARSE,
                format!("modifier {operator} expects a document"),
            ));
        };

        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(CommandError::new(
                    codes::IMMUTABLE_FIELD,
                    "performing an update on the path '_id' would modify the immutable field '_id'",
                ));
            }

            match operator.as_str() {
                "$set" => {
                    set_path(&mut updated, path, value.clone())?;
                }
                "$unset" => {
                    unset_path(&mut updated, path);
                }
                "$inc" => {
                    let current = get_path(&updated, path).cloned();
                    let next = increment(path, current.as_ref(), value)?;
                    set_path(&mut updated, path, next)?;
                }
                "$push" => {
                    let next = match get_path(&updated, path) {
                        None => Bson::Array(vec![value.clone()]),
                        Some(Bson::Array(items)) => {
                            let mut items = items.clone();
                            items.push(value.clone());
                            Bson::Array(items)
                        }
                        Some(_) => {
                            return Err(CommandError::new(
                                codes::BAD_VALUE,
                                format!("the field '{path}' must be an array"),
                            ));
                        }
                    };
                    set_path(&mut updated, path, next)?;
                }
                other => {
                    return Err(CommandError::new(
                        codes::FAILED_TO_PARSE,
                        format!("unknown modifier: {other}"),
                    ));
                }
            }
        }
    }

    let changed = updated != *document;
    *document = updated;

    Ok(changed)
}

fn increment(path: &str, current: Option<&Bson>, amount: &Bson) -> Result<Bson, CommandError> {
    let type_mismatch = || {
        CommandError::new(
            codes::TYPE_MISMATCH,
            format!("cannot apply $inc to field '{path}' with a non-numeric value"),
        )
    };

    Ok(match (current.unwrap_or(&Bson::Int32(0)), amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).saturating_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.saturating_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => return Err(type_mismatch()),
    })
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    crate::evaluator::lookup(document, path)
}

/// Sets a dotted path, creating intermediate documents as needed.
fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<(), CommandError> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(CommandError::new(
                    codes::PATH_NOT_VIABLE,
                    format!("cannot create field '{rest}' in element '{head}'"),
                )),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

/// Builds the document an upsert inserts: the equality conditions of the query with the
/// update applied on top, plus a generated `_id` when none was given.
pub(crate) fn upsert_seed(query: &Filter, update: &Document) -> Result<Document, CommandError> {
    let mut seed = Document::new();
    collect_equalities(query, &mut seed)?;

    let mut id = None;
    if let Some(existing) = seed.remove("_id") {
        id = Some(existing);
    }
    apply_update(&mut seed, update)?;

    let mut document = Document::new();
    document.insert("_id", id.unwrap_or_else(|| Bson::ObjectId(ObjectId::new())));
    document.extend(seed);

    Ok(document)
}

fn collect_equalities(query: &Filter, seed: &mut Document) -> Result<(), CommandError> {
    match query {
        Filter::Field {
            field,
            op: FieldOp::Eq,
            value,
        } => set_path(seed, field, value.clone()),
        Filter::And(children) => children
            .iter()
            .try_for_each(|child| collect_equalities(child, seed)),
        _ => Ok(()),
    }
}

/// Applies a projection document (`{field: 1}` or `{field: 0}`).
///
/// `_id` is kept by inclusion projections unless excluded explicitly.
pub(crate) fn project(document: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return document.clone();
    }

    let include = projection
        .iter()
        .filter(|(field, _)| field.as_str() != "_id")
        .any(|(_, flag)| truthy(flag));
    let keep_id = projection.get("_id").is_none_or(truthy);

    if include {
        let mut projected = Document::new();
        if keep_id {
            if let Some(id) = document.get("_id") {
                projected.insert("_id", id.clone());
            }
        }
        for (field, flag) in projection {
            if field == "_id" || !truthy(flag) {
                continue;
            }
            if let Some(value) = get_path(document, field) {
                // Paths through arrays are not reconstructed.
                let _ = set_path(&mut projected, field, value.clone());
            }
        }
        projected
    } else {
        let mut projected = document.clone();
        for (field, flag) in projection {
            if !truthy(flag) {
                unset_path(&mut projected, field);
            }
        }
        projected
    }
}

fn truthy(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(flag) => *flag != 0,
        Bson::Int64(flag) => *flag != 0,
        Bson::Double(flag) => *flag != 0.0,
        _ => true,
    }
}
