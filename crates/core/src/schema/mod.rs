//! Schema module for Strata.
//!
//! A schema maps collection names to collection definitions, and each
//! collection maps field names to scalar or relation metadata.

mod collection;
mod field;

pub use collection::{Collection, CollectionBuilder};
pub use field::{Field, FieldKind, Relation};

use crate::error::{Error, Result};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

/// The schema of every collection known to a session.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    collections: HashMap<String, Collection>,
}

impl Schema {
    /// Builds a schema from collection definitions and validates relations.
    ///
    /// Every relation target must exist, and the inverse field of a foreign
    /// relation must be a stored single relation pointing back at the owner.
    pub fn new(collections: Vec<Collection>) -> Result<Self> {
        let mut map = HashMap::with_capacity(collections.len());
        for collection in collections {
            let name = String::from(collection.name());
            if map.insert(name.clone(), collection).is_some() {
                return Err(Error::invalid_schema(format!(
                    "Collection defined twice: {}",
                    name
                )));
            }
        }
        let schema = Self { collections: map };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<()> {
        for collection in self.collections.values() {
            for field in collection.fields() {
                let Some(rel) = field.relation() else {
                    continue;
                };
                let target = self.collections.get(&rel.target).ok_or_else(|| {
                    Error::invalid_schema(format!(
                        "{}.{} targets unknown collection {}",
                        collection.name(),
                        field.name(),
                        rel.target
                    ))
                })?;
                if let Some(inverse) = &rel.inverse {
                    let back = target
                        .get_field(inverse)
                        .and_then(|f| f.relation())
                        .filter(|r| !r.list && !r.is_foreign() && r.target == collection.name());
                    if back.is_none() {
                        return Err(Error::invalid_schema(format!(
                            "{}.{} needs {}.{} to be a single relation to {}",
                            collection.name(),
                            field.name(),
                            rel.target,
                            inverse,
                            collection.name()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Gets a collection by name, failing with `UnknownCollection`.
    pub fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::unknown_collection(name))
    }

    /// Returns true if the collection exists.
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Returns all collection names.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(|k| k.as_str())
    }
}
