//! Filter expression construction and serialization.
//!
//! This module provides an immutable predicate tree that is only ever serialized by the
//! client, never evaluated. Backends receive it as a query document.
//!
//! # Filter Expression API
//!
//! The [`Filter`] enum provides static builder functions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Existence: `exists`, `not_exists`
//! - Array membership: `in_values`, `not_in`, `all`
//! - Logical: `and`, `or`, `not`
//! - The distinguished empty filter: [`Filter::match_all`]
//!
//! ```ignore
//! use doclink_core::filter::Filter;
//!
//! let filter = Filter::and([
//!     Filter::eq("status", "active"),
//!     Filter::lte("number", 5),
//! ])?;
//! ```

use bson::{Bson, Document, doc};

use crate::error::{ClientError, ClientResult};

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field value (or any array element) is one of the values.
    In,
    /// Field value (and every array element) is none of the values.
    Nin,
    /// Array field contains all of the values.
    All,
}

impl FieldOp {
    /// The query operator this comparison serializes to.
    pub fn operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
            FieldOp::All => "$all",
        }
    }

    /// Parses a query operator back into a comparison.
    pub fn from_operator(operator: &str) -> Option<FieldOp> {
        Some(match operator {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::In,
            "$nin" => FieldOp::Nin,
            "$all" => FieldOp::All,
            _ => return None,
        })
    }
}

/// An immutable filter expression.
///
/// Expressions are combined with logical operators (`And`, `Or`, `Not`). The
/// [`Filter::MatchAll`] value matches every document and is the default filter for every
/// collection operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every document.
    #[default]
    MatchAll,
    /// Logical AND of the children (all must match).
    And(Vec<Filter>),
    /// Logical OR of the children (any must match).
    Or(Vec<Filter>),
    /// Logical NOT of the child.
    Not(Box<Filter>),
    /// Checks whether a field exists.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The dotted field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Filter {
    /// The distinguished empty filter.
    pub fn match_all() -> Self {
        Filter::MatchAll
    }

    /// Returns `true` for the empty filter.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::MatchAll)
    }

    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        Filter::Field {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::field(field, FieldOp::Eq, value)
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::field(field, FieldOp::Ne, value)
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::field(field, FieldOp::Gt, value)
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::field(field, FieldOp::Gte, value)
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::field(field, FieldOp::Lt, value)
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::field(field, FieldOp::Lte, value)
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists(field.into(), true)
    }

    /// Matches documents where the field is absent.
    pub fn not_exists(field: impl Into<String>) -> Self {
        Filter::Exists(field.into(), false)
    }

    /// Matches documents where the field is one of the values.
    pub fn in_values<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::field(field, FieldOp::In, array(values))
    }

    /// Matches documents where the field is none of the values.
    pub fn not_in<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::field(field, FieldOp::Nin, array(values))
    }

    /// Matches documents whose array field contains every one of the values.
    pub fn all<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::field(field, FieldOp::All, array(values))
    }

    /// Creates a logical AND of one or more expressions.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyCombinator`] when `exprs` is empty.
    pub fn and(exprs: impl IntoIterator<Item = Filter>) -> ClientResult<Self> {
        let exprs: Vec<Filter> = exprs.into_iter().collect();
        if exprs.is_empty() {
            return Err(ClientError::EmptyCombinator("and"));
        }

        Ok(Filter::And(exprs))
    }

    /// Creates a logical OR of one or more expressions.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyCombinator`] when `exprs` is empty.
    pub fn or(exprs: impl IntoIterator<Item = Filter>) -> ClientResult<Self> {
        let exprs: Vec<Filter> = exprs.into_iter().collect();
        if exprs.is_empty() {
            return Err(ClientError::EmptyCombinator("or"));
        }

        Ok(Filter::Or(exprs))
    }

    /// Creates a logical NOT of an expression.
    pub fn not(expr: Filter) -> Self {
        Filter::Not(Box::new(expr))
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended to the list.
    /// The empty filter is the identity.
    pub fn and_also(self, other: Filter) -> Self {
        match self {
            Filter::MatchAll => other,
            Filter::And(mut list) => {
                list.push(other);
                Filter::And(list)
            }
            _ => Filter::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended to the list.
    pub fn or_else(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut list) => {
                list.push(other);
                Filter::Or(list)
            }
            _ => Filter::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn negate(self) -> Self {
        Filter::not(self)
    }

    /// Checks the expression tree for empty combinators and malformed field paths.
    ///
    /// Run by every collection operation before any network interaction.
    pub fn validate(&self) -> ClientResult<()> {
        self.accept(&mut FilterValidator)
    }

    /// Serializes the expression into a query document.
    ///
    /// A top-level (or nested) `not` serializes as `$nor: [expr]`, the form servers accept at
    /// any depth.
    pub fn to_document(&self) -> ClientResult<Document> {
        self.validate()?;
        self.accept(&mut QueryTranslator)
    }

    /// Dispatches this expression to a visitor.
    pub fn accept<V: FilterVisitor>(&self, visitor: &mut V) -> Result<V::Output, V::Error> {
        visitor.visit_filter(self)
    }
}

fn array<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> Bson {
    Bson::Array(values.into_iter().map(Into::into).collect())
}

/// Validates a dotted field path.
///
/// Paths must be non-empty, contain no NUL byte, contain no empty segment and must not start
/// with `$`.
pub fn validate_field_path(path: &str) -> ClientResult<()> {
    if path.is_empty() {
        return Err(ClientError::invalid_argument("field path must not be empty"));
    }
    if path.contains('\0') {
        return Err(ClientError::invalid_argument(format!(
            "field path {path:?} contains a NUL byte"
        )));
    }
    if path.starts_with('$') {
        return Err(ClientError::invalid_argument(format!(
            "field path {path:?} must not start with '$'"
        )));
    }
    if path.split('.').any(str::is_empty) {
        return Err(ClientError::invalid_argument(format!(
            "field path {path:?} contains an empty segment"
        )));
    }

    Ok(())
}

/// A visitor over filter expressions.
///
/// Implementors translate or evaluate an expression tree; [`Filter::accept`] drives the
/// dispatch through [`FilterVisitor::visit_filter`].
pub trait FilterVisitor {
    type Output;
    type Error: Into<ClientError>;

    fn visit_match_all(&mut self) -> Result<Self::Output, Self::Error>;
    fn visit_and(&mut self, exprs: &[Filter]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Filter]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Filter) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_filter(&mut self, expr: &Filter) -> Result<Self::Output, Self::Error> {
        match expr {
            Filter::MatchAll => self.visit_match_all(),
            Filter::And(exprs) => self.visit_and(exprs),
            Filter::Or(exprs) => self.visit_or(exprs),
            Filter::Not(expr) => self.visit_not(expr),
            Filter::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Filter::Field { field, op, value } => self.visit_field(field, *op, value),
        }
    }
}

struct FilterValidator;

impl FilterVisitor for FilterValidator {
    type Output = ();
    type Error = ClientError;

    fn visit_match_all(&mut self) -> ClientResult<()> {
        Ok(())
    }

    fn visit_and(&mut self, exprs: &[Filter]) -> ClientResult<()> {
        if exprs.is_empty() {
            return Err(ClientError::EmptyCombinator("and"));
        }
        exprs.iter().try_for_each(|expr| self.visit_filter(expr))
    }

    fn visit_or(&mut self, exprs: &[Filter]) -> ClientResult<()> {
        if exprs.is_empty() {
            return Err(ClientError::EmptyCombinator("or"));
        }
        exprs.iter().try_for_each(|expr| self.visit_filter(expr))
    }

    fn visit_not(&mut self, expr: &Filter) -> ClientResult<()> {
        self.visit_filter(expr)
    }

    fn visit_exists(&mut self, field: &str, _should_exist: bool) -> ClientResult<()> {
        validate_field_path(field)
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> ClientResult<()> {
        validate_field_path(field)?;
        match (op, value) {
            (FieldOp::In | FieldOp::Nin | FieldOp::All, Bson::Array(_)) => Ok(()),
            (FieldOp::In | FieldOp::Nin | FieldOp::All, _) => Err(ClientError::invalid_argument(
                format!("{} on {field:?} requires an array of values", op.operator()),
            )),
            _ => Ok(()),
        }
    }
}

/// Translates filter expressions into query documents.
pub struct QueryTranslator;

impl FilterVisitor for QueryTranslator {
    type Output = Document;
    type Error = ClientError;

    fn visit_match_all(&mut self) -> ClientResult<Document> {
        Ok(Document::new())
    }

    fn visit_and(&mut self, exprs: &[Filter]) -> ClientResult<Document> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_filter(expr))
                .collect::<ClientResult<Vec<_>>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Filter]) -> ClientResult<Document> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_filter(expr))
                .collect::<ClientResult<Vec<_>>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Filter) -> ClientResult<Document> {
        Ok(doc! {
            "$nor": [self.visit_filter(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> ClientResult<Document> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> ClientResult<Document> {
        let mut condition = Document::new();
        condition.insert(op.operator(), value.clone());

        Ok(doc! {
            field: condition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn match_all_serializes_to_empty_document() {
        assert_eq!(Filter::match_all().to_document().unwrap(), Document::new());
        assert_eq!(Filter::default(), Filter::match_all());
    }

    #[test]
    fn comparisons_serialize_with_explicit_operators() {
        let filter = Filter::and([Filter::lte("number", 5), Filter::ne("kind", "draft")]).unwrap();

        assert_eq!(
            filter.to_document().unwrap(),
            doc! {
                "$and": [
                    { "number": { "$lte": 5 } },
                    { "kind": { "$ne": "draft" } },
                ]
            }
        );
    }

    #[test]
    fn not_serializes_as_nor() {
        let filter = Filter::not(Filter::gt("number", 3));

        assert_eq!(
            filter.to_document().unwrap(),
            doc! { "$nor": [{ "number": { "$gt": 3 } }] }
        );
    }

    #[test]
    fn membership_operators_take_arrays() {
        let filter = Filter::in_values("tag", ["a", "b"]).or_else(Filter::all("tags", [1, 2]));

        assert_eq!(
            filter.to_document().unwrap(),
            doc! {
                "$or": [
                    { "tag": { "$in": ["a", "b"] } },
                    { "tags": { "$all": [1, 2] } },
                ]
            }
        );

        let bad = Filter::field("tag", FieldOp::Nin, "a");
        assert_eq!(bad.validate().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_combinators_are_rejected() {
        let err = Filter::and(Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::EmptyCombinator("and")));

        let err = Filter::or(Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::EmptyCombinator("or")));

        let nested = Filter::not(Filter::Or(Vec::new()));
        assert!(matches!(nested.validate(), Err(ClientError::EmptyCombinator("or"))));
    }

    #[test]
    fn field_paths_are_checked_syntactically() {
        for path in ["", "$where", "a..b", ".a", "a.", "bad\0path"] {
            let err = Filter::eq(path, 1).validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "path {path:?}");
        }

        for path in ["a", "a.b.c", "_id", "tags.0"] {
            assert!(Filter::exists(path).validate().is_ok(), "path {path:?}");
        }
    }

    #[test]
    fn chaining_flattens_like_combinators() {
        let filter = Filter::match_all()
            .and_also(Filter::eq("a", 1))
            .and_also(Filter::eq("b", 2))
            .and_also(Filter::eq("c", 3));

        match filter {
            Filter::And(children) => assert_eq!(children.len(), 3),
            other => panic!("unexpected filter: {other:?}"),
        }
    }
}
