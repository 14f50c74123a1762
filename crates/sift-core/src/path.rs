//! Nested Path Resolver
//!
//! Decides whether a dotted field path crosses relation or sub-document
//! boundaries. Every proper prefix of a nested path is a boundary, recorded
//! outermost first:
//!
//! ```text
//! roles.roleAuthorizations.authorization.menuIcon
//!   -> roles
//!   -> roles.roleAuthorizations
//!   -> roles.roleAuthorizations.authorization
//! ```
//!
//! Paths whose first segment is an embedded object (see [`EmbeddedPaths`])
//! are matched directly and never nested.
//!
//! Resolution is a pure function of the path and the embedded mapping, so
//! results are cached per path in a concurrent map. The cache is cleared once
//! it reaches its capacity, keeping memory bounded when keys come from
//! requests.

use dashmap::DashMap;
use sift_config::PathConfig;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Path separator used in field keys
pub const PATH_SEPARATOR: char = '.';

/// Default number of resolved paths kept before the cache is cleared
pub const DEFAULT_PATH_CACHE_CAPACITY: usize = 4096;

/// Nesting boundaries of one field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedPathInfo {
    /// The complete, normalized path
    pub full_path: String,
    /// Ancestor prefixes that are nesting boundaries, outermost first
    pub nested_segments: Vec<String>,
}

impl NestedPathInfo {
    /// Innermost boundary, the immediate parent of the leaf
    pub fn innermost(&self) -> Option<&str> {
        self.nested_segments.last().map(String::as_str)
    }

    /// Last segment of the path
    pub fn leaf(&self) -> &str {
        leaf_of(&self.full_path)
    }

    /// Number of boundaries crossed
    pub fn depth(&self) -> usize {
        self.nested_segments.len()
    }
}

/// A criterion key split into its normalized path and left-join flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    /// Path with every left-join marker replaced by `.`
    pub path: String,
    /// Whether the key used the left-join marker
    pub left_join: bool,
}

impl FieldKey {
    /// Parse a raw criterion key
    pub fn parse(key: &str, marker: char) -> Self {
        let key = key.trim();
        let left_join = key.contains(marker);
        let path = if left_join {
            key.replace(marker, ".")
        } else {
            key.to_string()
        };
        Self { path, left_join }
    }

    /// Path of the immediate parent, if the key has more than one segment
    pub fn parent(&self) -> Option<&str> {
        parent_of(&self.path)
    }
}

/// Last segment of a dotted path
pub fn leaf_of(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or(path)
}

/// Everything before the last segment of a dotted path
pub fn parent_of(path: &str) -> Option<&str> {
    path.rfind(PATH_SEPARATOR)
        .filter(|idx| *idx > 0)
        .map(|idx| &path[..idx])
}

/// Make `path` relative to the boundary `scope`
///
/// Returns the path unchanged when it does not lie under `scope`.
pub fn relative_to<'a>(path: &'a str, scope: &str) -> &'a str {
    path.strip_prefix(scope)
        .and_then(|rest| rest.strip_prefix(PATH_SEPARATOR))
        .unwrap_or(path)
}

/// Schema mapping that names object-valued (embedded) first segments
pub trait EmbeddedPaths: Send + Sync {
    /// Check if a first path segment is embedded rather than a relation
    fn is_embedded(&self, first_segment: &str) -> bool;
}

impl EmbeddedPaths for HashSet<String> {
    fn is_embedded(&self, first_segment: &str) -> bool {
        self.contains(first_segment)
    }
}

impl EmbeddedPaths for PathConfig {
    fn is_embedded(&self, first_segment: &str) -> bool {
        self.embedded.iter().any(|segment| segment == first_segment)
    }
}

/// Resolves and caches [`NestedPathInfo`] per field path
pub struct NestedPathResolver {
    embedded: Arc<dyn EmbeddedPaths>,
    left_join_marker: char,
    cache: DashMap<String, Option<Arc<NestedPathInfo>>>,
    cache_capacity: usize,
}

impl NestedPathResolver {
    /// Create a resolver from path configuration
    pub fn new(config: &PathConfig) -> Self {
        Self::with_mapping(Arc::new(config.clone()), config.left_join_marker)
    }

    /// Create a resolver over an arbitrary embedded mapping
    pub fn with_mapping(embedded: Arc<dyn EmbeddedPaths>, left_join_marker: char) -> Self {
        Self {
            embedded,
            left_join_marker,
            cache: DashMap::new(),
            cache_capacity: DEFAULT_PATH_CACHE_CAPACITY,
        }
    }

    /// Limit the number of cached paths; at least one is kept
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    /// Marker that replaces `.` to traverse a possibly-absent relation
    pub fn left_join_marker(&self) -> char {
        self.left_join_marker
    }

    /// Parse a raw criterion key with this resolver's marker
    pub fn parse_key(&self, key: &str) -> FieldKey {
        FieldKey::parse(key, self.left_join_marker)
    }

    /// Check if the first segment of `path` is embedded
    pub fn is_embedded(&self, path: &str) -> bool {
        let first = path.split(PATH_SEPARATOR).next().unwrap_or(path);
        self.embedded.is_embedded(first)
    }

    /// Resolve the nesting boundaries of a normalized path.
    ///
    /// Returns `None` for single-segment paths and embedded paths.
    pub fn resolve(&self, path: &str) -> Option<Arc<NestedPathInfo>> {
        if let Some(cached) = self.cache.get(path) {
            return cached.clone();
        }

        let resolved = self.compute(path).map(Arc::new);
        trace!(
            path,
            nested = resolved.as_ref().map(|info| info.depth()).unwrap_or(0),
            "Resolved field path"
        );
        if self.cache.len() >= self.cache_capacity {
            debug!(capacity = self.cache_capacity, "Clearing nested path cache");
            self.cache.clear();
        }
        self.cache.insert(path.to_string(), resolved.clone());
        resolved
    }

    /// Number of cached paths
    pub fn cached_paths(&self) -> usize {
        self.cache.len()
    }

    fn compute(&self, path: &str) -> Option<NestedPathInfo> {
        if !path.contains(PATH_SEPARATOR) || self.is_embedded(path) {
            return None;
        }

        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let mut nested_segments = Vec::with_capacity(segments.len() - 1);
        let mut current = String::new();
        for segment in &segments[..segments.len() - 1] {
            if !current.is_empty() {
                current.push(PATH_SEPARATOR);
            }
            current.push_str(segment);
            nested_segments.push(current.clone());
        }

        Some(NestedPathInfo {
            full_path: path.to_string(),
            nested_segments,
        })
    }
}

impl Default for NestedPathResolver {
    fn default() -> Self {
        Self::new(&PathConfig::default())
    }
}

impl fmt::Debug for NestedPathResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedPathResolver")
            .field("left_join_marker", &self.left_join_marker)
            .field("cached_paths", &self.cache.len())
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(embedded: &[&str]) -> NestedPathResolver {
        let config = PathConfig {
            embedded: embedded.iter().map(|s| s.to_string()).collect(),
            ..PathConfig::default()
        };
        NestedPathResolver::new(&config)
    }

    #[test]
    fn test_single_segment_is_not_nested() {
        assert_eq!(resolver(&[]).resolve("age"), None);
    }

    #[test]
    fn test_every_proper_prefix_is_a_boundary() {
        let info = resolver(&[])
            .resolve("roles.roleAuthorizations.authorization.menuIcon")
            .unwrap();

        assert_eq!(
            info.nested_segments,
            vec![
                "roles",
                "roles.roleAuthorizations",
                "roles.roleAuthorizations.authorization"
            ]
        );
        assert_eq!(info.innermost(), Some("roles.roleAuthorizations.authorization"));
        assert_eq!(info.leaf(), "menuIcon");
    }

    #[test]
    fn test_embedded_first_segment_short_circuits() {
        let resolver = resolver(&["address"]);
        assert_eq!(resolver.resolve("address.city"), None);
        assert!(resolver.resolve("department.name").is_some());
    }

    #[test]
    fn test_results_are_cached() {
        let resolver = resolver(&[]);
        let first = resolver.resolve("department.name").unwrap();
        let second = resolver.resolve("department.name").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        resolver.resolve("age");
        assert_eq!(resolver.cached_paths(), 2);
    }

    #[test]
    fn test_cache_stays_bounded() {
        let resolver = resolver(&[]).with_cache_capacity(8);
        for i in 0..100 {
            resolver.resolve(&format!("relation{}.field", i));
            assert!(resolver.cached_paths() <= 8);
        }

        let info = resolver.resolve("relation3.field").unwrap();
        assert_eq!(info.nested_segments, vec!["relation3"]);
    }

    #[test]
    fn test_parse_left_join_key() {
        let key = FieldKey::parse("department<id", '<');
        assert!(key.left_join);
        assert_eq!(key.path, "department.id");
        assert_eq!(key.parent(), Some("department"));

        let plain = FieldKey::parse(" age ", '<');
        assert!(!plain.left_join);
        assert_eq!(plain.parent(), None);
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to("roles.name", "roles"), "name");
        assert_eq!(relative_to("roles.auth.name", "roles.auth"), "name");
        assert_eq!(relative_to("rolesx.name", "roles"), "rolesx.name");
    }

    #[test]
    fn test_custom_mapping() {
        let embedded: HashSet<String> = ["meta".to_string()].into_iter().collect();
        let resolver = NestedPathResolver::with_mapping(Arc::new(embedded), '~');

        assert_eq!(resolver.resolve("meta.created"), None);
        assert_eq!(resolver.parse_key("dept~name").path, "dept.name");
    }
}
