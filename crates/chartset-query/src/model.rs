//! Entity metadata registry
//!
//! A narrow reflection collaborator: it resolves property paths to table
//! columns so the criteria builder can lower typed filters, and nothing more.
//! Models can be assembled in code or loaded from JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use chartset_core::{ColumnType, QueryError, QueryResult};

/// A scalar property mapped to a table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyModel {
    pub column: String,
    #[serde(default)]
    pub datatype: ColumnType,
}

/// An association to another entity, joinable via a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationModel {
    /// Name of the target entity in the registry
    pub target: String,
    /// Foreign-key column on the source table
    pub fk_column: String,
    /// Referenced column on the target table
    pub referenced_column: String,
}

/// Metadata for one queryable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityModel {
    pub name: String,
    pub table: String,
    #[serde(default)]
    properties: IndexMap<String, PropertyModel>,
    #[serde(default)]
    associations: IndexMap<String, AssociationModel>,
}

impl EntityModel {
    /// Create an entity mapped to the given table
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            properties: IndexMap::new(),
            associations: IndexMap::new(),
        }
    }

    /// Register a scalar property
    pub fn with_property(
        mut self,
        property: impl Into<String>,
        column: impl Into<String>,
        datatype: ColumnType,
    ) -> Self {
        self.properties.insert(
            property.into(),
            PropertyModel {
                column: column.into(),
                datatype,
            },
        );
        self
    }

    /// Register an association to another entity
    pub fn with_association(
        mut self,
        property: impl Into<String>,
        target: impl Into<String>,
        fk_column: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        self.associations.insert(
            property.into(),
            AssociationModel {
                target: target.into(),
                fk_column: fk_column.into(),
                referenced_column: referenced_column.into(),
            },
        );
        self
    }

    /// Look up a scalar property
    pub fn property(&self, name: &str) -> Option<&PropertyModel> {
        self.properties.get(name)
    }

    /// Look up an association
    pub fn association(&self, name: &str) -> Option<&AssociationModel> {
        self.associations.get(name)
    }

    /// Resolve a property to its column and declared type.
    ///
    /// An association used as a plain property resolves to its foreign-key
    /// column, so `where_equal("encounter_type", 5)` filters on the fk.
    pub fn resolve_property(&self, name: &str) -> QueryResult<(String, ColumnType)> {
        if let Some(property) = self.property(name) {
            return Ok((property.column.clone(), property.datatype));
        }
        if let Some(association) = self.association(name) {
            return Ok((association.fk_column.clone(), ColumnType::Int));
        }
        Err(QueryError::configuration(format!(
            "entity {} has no property {name}",
            self.name
        )))
    }
}

/// Registry of entity models, keyed by entity name
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entities: IndexMap<String, EntityModel>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity model
    pub fn register(&mut self, entity: EntityModel) {
        self.entities.insert(entity.name.clone(), entity);
    }

    /// Register an entity model, builder style
    pub fn with_entity(mut self, entity: EntityModel) -> Self {
        self.register(entity);
        self
    }

    /// Look up an entity by name
    pub fn entity(&self, name: &str) -> QueryResult<&EntityModel> {
        self.entities
            .get(name)
            .ok_or_else(|| QueryError::configuration(format!("unknown entity {name}")))
    }

    /// Load a registry from a JSON array of entity models
    pub fn from_json(json: &str) -> QueryResult<Self> {
        let entities: Vec<EntityModel> = serde_json::from_str(json)
            .map_err(|e| QueryError::configuration(format!("invalid model JSON: {e}")))?;
        let mut registry = Self::new();
        for entity in entities {
            registry.register(entity);
        }
        Ok(registry)
    }

    /// Load a registry from a JSON file
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> QueryResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| QueryError::configuration(format!("cannot read model file: {e}")))?;
        Self::from_json(&json)
    }
}
