//! Projection expressions.
//!
//! A projection is an ordered set of included or excluded field names. Mixing the two is
//! rejected locally, with the single exception that `_id` may be excluded from an include
//! projection.

use bson::Document;

use crate::{
    error::{ClientError, ClientResult},
    filter::validate_field_path,
};

const ID_FIELD: &str = "_id";

/// An immutable projection expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    fields: Vec<(String, bool)>,
}

impl Projection {
    /// The sentinel returning every field.
    pub fn all_fields() -> Self {
        Projection { fields: Vec::new() }
    }

    /// Returns `true` for the all-fields sentinel.
    pub fn is_all_fields(&self) -> bool {
        self.fields.is_empty()
    }

    /// A projection returning only the given fields (and `_id`).
    pub fn include<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Projection::all_fields().and_include(fields)
    }

    /// A projection returning every field except the given ones.
    pub fn exclude<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Projection::all_fields().and_exclude(fields)
    }

    /// Adds included fields.
    pub fn and_include<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields
            .extend(fields.into_iter().map(|field| (field.into(), true)));
        self
    }

    /// Adds excluded fields.
    pub fn and_exclude<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields
            .extend(fields.into_iter().map(|field| (field.into(), false)));
        self
    }

    /// The projected fields in insertion order, paired with `true` when included.
    pub fn fields(&self) -> &[(String, bool)] {
        &self.fields
    }

    /// Checks the projection before it is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidProjection`] when included and excluded fields are mixed,
    /// and [`ClientError::InvalidArgument`] for malformed field paths.
    pub fn validate(&self) -> ClientResult<()> {
        for (field, _) in &self.fields {
            validate_field_path(field)?;
        }

        let included = self.fields.iter().any(|(_, include)| *include);
        let mixed = self
            .fields
            .iter()
            .find(|(field, include)| included && !*include && field != ID_FIELD);
        if let Some((field, _)) = mixed {
            return Err(ClientError::InvalidProjection(format!(
                "cannot exclude {field:?} from an include projection"
            )));
        }

        Ok(())
    }

    /// Serializes the projection into a projection document (`{field: 1 | 0}`).
    pub fn to_document(&self) -> ClientResult<Document> {
        self.validate()?;

        Ok(self
            .fields
            .iter()
            .map(|(field, include)| (field.clone(), bson::Bson::Int32(i32::from(*include))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn all_fields_serializes_to_empty_document() {
        assert!(Projection::all_fields().is_all_fields());
        assert_eq!(Projection::all_fields().to_document().unwrap(), Document::new());
    }

    #[test]
    fn include_projection_may_drop_id() {
        let projection = Projection::include(["name", "number"]).and_exclude(["_id"]);

        assert_eq!(
            projection.to_document().unwrap(),
            doc! { "name": 1, "number": 1, "_id": 0 }
        );
    }

    #[test]
    fn mixing_include_and_exclude_is_rejected() {
        let projection = Projection::include(["name"]).and_exclude(["secret"]);

        assert!(matches!(
            projection.validate(),
            Err(ClientError::InvalidProjection(_))
        ));
    }

    #[test]
    fn exclude_only_projection_is_valid() {
        let projection = Projection::exclude(["secret", "_id"]);

        assert_eq!(projection.to_document().unwrap(), doc! { "secret": 0, "_id": 0 });
    }
}
