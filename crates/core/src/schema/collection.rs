//! Collection definition for Strata schemas.

use super::field::Field;
use crate::error::{Error, Result};
use crate::record::{CREATED_AT_FIELD, ID_FIELD};
use crate::types::ScalarType;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;

/// A collection definition: a named set of records of one shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collection {
    /// Collection name.
    name: String,
    /// Field definitions by name.
    fields: BTreeMap<String, Field>,
}

impl Collection {
    /// Returns the collection name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all field definitions.
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Gets a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Gets a field by name, failing with `UnknownField`.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::unknown_field(&self.name, name))
    }
}

/// Builder for creating collection definitions.
///
/// `id` and `createdAt` are added automatically.
pub struct CollectionBuilder {
    name: String,
    fields: BTreeMap<String, Field>,
}

impl CollectionBuilder {
    /// Creates a new collection builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        let mut fields = BTreeMap::new();
        fields.insert(ID_FIELD.into(), Field::scalar(ID_FIELD, ScalarType::String));
        fields.insert(
            CREATED_AT_FIELD.into(),
            Field::scalar(CREATED_AT_FIELD, ScalarType::DateTime),
        );
        Ok(Self { name, fields })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(Error::invalid_schema("Name cannot be empty")),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
                return Err(Error::invalid_schema(format!(
                    "Name must start with letter or underscore: {}",
                    name
                )))
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a field.
    pub fn field(mut self, field: Field) -> Result<Self> {
        Self::check_naming_rules(field.name())?;
        if self.fields.contains_key(field.name()) {
            return Err(Error::invalid_schema(format!(
                "Field already exists: {}.{}",
                self.name,
                field.name()
            )));
        }
        self.fields.insert(field.name().into(), field);
        Ok(self)
    }

    /// Adds a scalar field.
    pub fn scalar(self, name: &str, ty: ScalarType) -> Result<Self> {
        self.field(Field::scalar(name, ty))
    }

    /// Adds a single-record relation.
    pub fn single(self, name: &str, target: &str) -> Result<Self> {
        self.field(Field::single(name, target))
    }

    /// Adds a list relation stored on the record.
    pub fn list(self, name: &str, target: &str) -> Result<Self> {
        self.field(Field::list(name, target))
    }

    /// Adds a one-to-many relation resolved through `inverse` on `target`.
    pub fn foreign(self, name: &str, target: &str, inverse: &str) -> Result<Self> {
        self.field(Field::foreign(name, target, inverse))
    }

    /// Builds the collection definition.
    pub fn build(self) -> Collection {
        Collection {
            name: self.name,
            fields: self.fields,
        }
    }
}
