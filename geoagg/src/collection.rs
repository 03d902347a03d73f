//! Collection references: which index backs a collection and where its id,
//! geometry, centroid and timestamp live.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Keyword,
    Text,
    Long,
    Integer,
    Double,
    Float,
    Date,
    Boolean,
    GeoPoint,
    GeoShape,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Long | FieldType::Integer | FieldType::Double | FieldType::Float
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReference {
    pub name: String,
    /// Engine index (or alias) holding the documents.
    pub index: String,
    #[serde(default = "default_id_path")]
    pub id_path: String,
    #[serde(default = "default_geometry_path")]
    pub geometry_path: String,
    #[serde(default = "default_centroid_path")]
    pub centroid_path: String,
    #[serde(default = "default_timestamp_path")]
    pub timestamp_path: String,
    /// Declared fields. When empty, field existence is not checked.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
}

fn default_id_path() -> String {
    "id".to_string()
}

fn default_geometry_path() -> String {
    "geometry".to_string()
}

fn default_centroid_path() -> String {
    "centroid".to_string()
}

fn default_timestamp_path() -> String {
    "timestamp".to_string()
}

impl CollectionReference {
    pub fn new(name: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            id_path: default_id_path(),
            geometry_path: default_geometry_path(),
            centroid_path: default_centroid_path(),
            timestamp_path: default_timestamp_path(),
            fields: BTreeMap::new(),
        }
    }

    /// Type of `path`, looking at the well-known paths first.
    pub fn field_type(&self, path: &str) -> Option<FieldType> {
        if let Some(t) = self.fields.get(path) {
            return Some(*t);
        }
        if path == self.centroid_path {
            Some(FieldType::GeoPoint)
        } else if path == self.geometry_path {
            Some(FieldType::GeoShape)
        } else if path == self.timestamp_path {
            Some(FieldType::Date)
        } else if path == self.id_path {
            Some(FieldType::Keyword)
        } else {
            None
        }
    }

    /// Whether the collection declares its fields.
    pub fn is_strict(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Resolve a field referenced by a request.
    ///
    /// Unknown fields are `NotFound` for strict collections and `Ok(None)`
    /// otherwise.
    pub fn require_field(&self, path: &str) -> Result<Option<FieldType>> {
        match self.field_type(path) {
            Some(t) => Ok(Some(t)),
            None if self.is_strict() => Err(Error::NotFound(format!(
                "field '{}' does not exist in collection '{}'",
                path, self.name
            ))),
            None => Ok(None),
        }
    }
}

/// Source of collection references.
pub trait CollectionCatalog: Send + Sync {
    fn get(&self, name: &str) -> Result<Arc<CollectionReference>>;
    fn list(&self) -> Vec<Arc<CollectionReference>>;
}

/// Catalog held in memory, seeded from configuration.
#[derive(Default)]
pub struct StaticCatalog {
    collections: RwLock<HashMap<String, Arc<CollectionReference>>>,
}

impl StaticCatalog {
    pub fn new(collections: impl IntoIterator<Item = CollectionReference>) -> Self {
        let map = collections
            .into_iter()
            .map(|c| (c.name.clone(), Arc::new(c)))
            .collect();
        Self {
            collections: RwLock::new(map),
        }
    }

    pub fn insert(&self, collection: CollectionReference) {
        tracing::info!(collection = %collection.name, index = %collection.index, "Registering collection");
        self.collections
            .write()
            .insert(collection.name.clone(), Arc::new(collection));
    }
}

impl CollectionCatalog for StaticCatalog {
    fn get(&self, name: &str) -> Result<Arc<CollectionReference>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("collection '{}' not found", name)))
    }

    fn list(&self) -> Vec<Arc<CollectionReference>> {
        let mut all: Vec<_> = self.collections.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geodata() -> CollectionReference {
        let mut c = CollectionReference::new("geodata", "dataset");
        c.centroid_path = "geo_params.centroid".to_string();
        c.timestamp_path = "params.startdate".to_string();
        c.fields.insert("params.job".to_string(), FieldType::Keyword);
        c
    }

    #[test]
    fn test_well_known_paths_have_types() {
        let c = geodata();
        assert_eq!(c.field_type("geo_params.centroid"), Some(FieldType::GeoPoint));
        assert_eq!(c.field_type("params.startdate"), Some(FieldType::Date));
        assert_eq!(c.field_type("params.job"), Some(FieldType::Keyword));
        assert_eq!(c.field_type("nope"), None);
    }

    #[test]
    fn test_require_field_strict_and_open() {
        let strict = geodata();
        assert!(matches!(strict.require_field("foo"), Err(Error::NotFound(_))));

        let open = CollectionReference::new("open", "idx");
        assert_eq!(open.require_field("foo").unwrap(), None);
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = StaticCatalog::new(vec![geodata()]);
        assert_eq!(catalog.get("geodata").unwrap().index, "dataset");
        assert!(matches!(catalog.get("missing"), Err(Error::NotFound(_))));

        catalog.insert(CollectionReference::new("another", "idx2"));
        let names: Vec<_> = catalog.list().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["another", "geodata"]);
    }
}
