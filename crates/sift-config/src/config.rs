//! Configuration sections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    /// Pagination defaults
    pub query: QueryConfig,
    /// Field path conventions
    pub paths: PathConfig,
    /// Update-cascade settings
    pub update: UpdateConfig,
    /// Relational backend mapping
    pub relational: RelationalConfig,
}

/// Pagination defaults applied when a query leaves them unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size used when a query has none
    pub default_page_size: u32,
    /// Page number used when a query has none
    pub default_page_number: u32,
    /// Upper bound for requested page sizes; larger requests are clamped
    pub max_page_size: Option<u32>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            default_page_number: 0,
            max_page_size: None,
        }
    }
}

/// Field path conventions shared by every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// First path segments that name embedded objects rather than relations.
    ///
    /// `address.city` with `address` listed here is matched directly instead
    /// of through a nested relation wrapper.
    pub embedded: Vec<String>,
    /// Marker that replaces `.` to traverse a possibly-absent relation
    pub left_join_marker: char,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            embedded: Vec::new(),
            left_join_marker: '<',
        }
    }
}

/// Update-cascade settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Leaf name carrying the identifier at every entity level
    pub id_field: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
        }
    }
}

/// Relational backend mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Alias given to the root table
    pub root_alias: String,
    /// Relations keyed by their dotted path from the root table
    pub relations: HashMap<String, RelationConfig>,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            root_alias: "t0".to_string(),
            relations: HashMap::new(),
        }
    }
}

/// How one relation path joins to its parent table.
///
/// The join condition is `child.foreign_column = parent.local_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Table holding the related rows
    pub table: String,
    /// Column on the parent side
    pub local_column: String,
    /// Column on the related side
    pub foreign_column: String,
}

impl RelationConfig {
    /// Many-to-one convention: `parent.<segment>_id = child.id`
    pub fn by_convention(segment: &str) -> Self {
        Self {
            table: segment.to_string(),
            local_column: format!("{}_id", segment),
            foreign_column: "id".to_string(),
        }
    }

    /// One-to-many: `parent.id = child.<foreign_column>`
    pub fn one_to_many(table: impl Into<String>, foreign_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            local_column: "id".to_string(),
            foreign_column: foreign_column.into(),
        }
    }
}

impl RelationalConfig {
    /// Resolve the mapping for a relation path, falling back to convention
    pub fn relation(&self, path: &str) -> RelationConfig {
        if let Some(relation) = self.relations.get(path) {
            return relation.clone();
        }
        let segment = path.rsplit('.').next().unwrap_or(path);
        RelationConfig::by_convention(segment)
    }
}
