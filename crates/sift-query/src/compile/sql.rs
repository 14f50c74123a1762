//! Relational SQL compiler.
//!
//! Renders a plan to parameterized SQL:
//! - Nested predicates become correlated `EXISTS` sub-queries, one per
//!   relation boundary, joined through [`RelationalConfig`]
//! - Embedded paths map to flattened columns (`address.city` -> `address_city`)
//! - Text matches use `LOWER(col) LIKE :p ESCAPE '\'`
//! - Selected and sorted relation paths are reached through `LEFT JOIN`s
//! - Values are always bound as named `:pN` parameters
//!
//! ```sql
//! SELECT t0.*
//! FROM employee t0
//! WHERE (t0.age > :p0 AND EXISTS (SELECT 1 FROM department a1
//!   WHERE a1.id = t0.department_id AND a1.name = :p1))
//! LIMIT 20 OFFSET 0
//! ```

use super::{CompilerContext, QueryCompiler};
use crate::error::{CompileError, CompileResult};
use crate::ir::{CompareOp, Predicate, QueryPlan, TextMode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sift_config::{RelationalConfig, SiftConfig};
use sift_core::path::{parent_of, relative_to, PATH_SEPARATOR};
use sift_core::Order;
use std::collections::HashMap;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Rendered SQL with its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuery {
    /// Row query, pagination included
    pub sql: String,
    /// Total-count query over the same filter
    pub count_sql: String,
    /// Parameters to bind to either query
    pub params: HashMap<String, Value>,
}

/// Compiler for relational stores
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    context: CompilerContext,
    relational: RelationalConfig,
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new(&SiftConfig::default())
    }
}

impl SqlCompiler {
    pub fn new(config: &SiftConfig) -> Self {
        Self {
            context: CompilerContext::new(config),
            relational: config.relational.clone(),
        }
    }

    pub fn with_context(context: CompilerContext, relational: RelationalConfig) -> Self {
        Self {
            context,
            relational,
        }
    }
}

impl QueryCompiler for SqlCompiler {
    type Native = SqlQuery;

    fn name(&self) -> &str {
        "sql"
    }

    fn context(&self) -> &CompilerContext {
        &self.context
    }

    fn render(&self, plan: &QueryPlan, target: &str) -> CompileResult<SqlQuery> {
        identifier(target)?;
        let mut writer = SqlWriter::new(self);
        let root = self.relational.root_alias.as_str();

        let condition = match &plan.filter {
            Predicate::MatchAll => None,
            filter => Some(writer.predicate(filter, root, "")?),
        };

        let mut columns = Vec::with_capacity(plan.select.len());
        for pair in &plan.select {
            let column = writer.joined_column(&pair.source)?;
            columns.push(format!("{} AS \"{}\"", column, pair.source));
        }
        let mut order = Vec::with_capacity(plan.sort.len());
        for key in &plan.sort {
            let column = writer.joined_column(&key.field)?;
            let direction = match key.direction {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            order.push(format!("{} {}", column, direction));
        }

        let projection = if columns.is_empty() {
            format!("{}.*", root)
        } else {
            columns.join(", ")
        };
        let distinct = if plan.distinct { "DISTINCT " } else { "" };

        let mut from = format!("{} {}", target, root);
        for join in &writer.joins {
            from.push('\n');
            from.push_str(&join.clause);
        }
        let where_clause = condition
            .map(|c| format!("\nWHERE {}", c))
            .unwrap_or_default();

        let mut sql = format!(
            "SELECT {}{}\nFROM {}{}",
            distinct, projection, from, where_clause
        );
        if !order.is_empty() {
            sql.push_str(&format!("\nORDER BY {}", order.join(", ")));
        }
        sql.push_str(&format!(
            "\nLIMIT {} OFFSET {}",
            plan.page.size,
            plan.page.offset()
        ));

        let count_sql = if plan.distinct || !writer.joins.is_empty() {
            format!(
                "SELECT COUNT(*) FROM (SELECT {}{}\nFROM {}{}) AS counted",
                distinct, projection, from, where_clause
            )
        } else {
            format!("SELECT COUNT(*)\nFROM {}{}", from, where_clause)
        };

        Ok(SqlQuery {
            sql,
            count_sql,
            params: writer.params,
        })
    }
}

// ============================================================================
// Writer
// ============================================================================

struct Join {
    path: String,
    alias: String,
    clause: String,
}

struct SqlWriter<'a> {
    compiler: &'a SqlCompiler,
    params: HashMap<String, Value>,
    joins: Vec<Join>,
    next_alias: usize,
}

impl<'a> SqlWriter<'a> {
    fn new(compiler: &'a SqlCompiler) -> Self {
        Self {
            compiler,
            params: HashMap::new(),
            joins: Vec::new(),
            next_alias: 1,
        }
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("p{}", self.params.len());
        self.params.insert(name.clone(), value);
        format!(":{}", name)
    }

    fn alias(&mut self, prefix: &str) -> String {
        let alias = format!("{}{}", prefix, self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// Column of `field` relative to the scope rooted at `scope_path`
    fn column(&self, field: &str, alias: &str, scope_path: &str) -> CompileResult<String> {
        let relative = if scope_path.is_empty() {
            field
        } else {
            relative_to(field, scope_path)
        };
        let column = relative.replace(PATH_SEPARATOR, "_");
        identifier(&column)?;
        Ok(format!("{}.{}", alias, column))
    }

    fn predicate(&mut self, predicate: &Predicate, alias: &str, scope: &str) -> CompileResult<String> {
        Ok(match predicate {
            Predicate::MatchAll => "1 = 1".to_string(),
            Predicate::And(children) => self.junction(children, " AND ", alias, scope)?,
            Predicate::AnyOf(children) => self.junction(children, " OR ", alias, scope)?,
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(inner, alias, scope)?),
            Predicate::Compare { field, op, value } => {
                let column = self.column(field, alias, scope)?;
                let param = self.bind(value.clone());
                format!("{} {} {}", column, sql_op(*op), param)
            }
            Predicate::Text {
                field,
                mode,
                needle,
            } => {
                let column = self.column(field, alias, scope)?;
                let escaped = escape_like(&needle.to_lowercase());
                let pattern = match mode {
                    TextMode::Contains => format!("%{}%", escaped),
                    TextMode::StartsWith => format!("{}%", escaped),
                    TextMode::EndsWith => format!("%{}", escaped),
                };
                let param = self.bind(Value::String(pattern));
                format!("LOWER({}) LIKE {} ESCAPE '\\'", column, param)
            }
            Predicate::Present(field) => {
                format!("{} IS NOT NULL", self.column(field, alias, scope)?)
            }
            Predicate::Within { path, predicate } => {
                let (inner_alias, head) = self.exists_head(path, alias)?;
                let inner = self.predicate(predicate, &inner_alias, path)?;
                format!("EXISTS ({} AND {})", head, inner)
            }
            Predicate::RelationPresent(path) => {
                let (_, head) = self.exists_head(path, alias)?;
                format!("EXISTS ({})", head)
            }
        })
    }

    fn junction(
        &mut self,
        children: &[Predicate],
        separator: &str,
        alias: &str,
        scope: &str,
    ) -> CompileResult<String> {
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            parts.push(self.predicate(child, alias, scope)?);
        }
        Ok(format!("({})", parts.join(separator)))
    }

    /// `SELECT 1 FROM table aN WHERE aN.fk = outer.local` for a relation
    fn exists_head(&mut self, path: &str, outer: &str) -> CompileResult<(String, String)> {
        let relation = self.compiler.relational.relation(path);
        identifier(&relation.table)?;
        identifier(&relation.local_column)?;
        identifier(&relation.foreign_column)?;

        let alias = self.alias("a");
        let head = format!(
            "SELECT 1 FROM {} {} WHERE {}.{} = {}.{}",
            relation.table, alias, alias, relation.foreign_column, outer, relation.local_column
        );
        Ok((alias, head))
    }

    /// Column for a select or sort path, adding `LEFT JOIN`s for relations
    fn joined_column(&mut self, field: &str) -> CompileResult<String> {
        let root = self.compiler.relational.root_alias.clone();
        let Some(info) = self.compiler.context.resolver.resolve(field) else {
            return self.column(field, &root, "");
        };

        let mut alias = root;
        for path in &info.nested_segments {
            alias = self.left_join(path, &alias)?;
        }
        let scope = parent_of(field).unwrap_or_default();
        self.column(field, &alias, scope)
    }

    fn left_join(&mut self, path: &str, outer: &str) -> CompileResult<String> {
        if let Some(existing) = self.joins.iter().find(|j| j.path == path) {
            return Ok(existing.alias.clone());
        }

        let relation = self.compiler.relational.relation(path);
        identifier(&relation.table)?;
        identifier(&relation.local_column)?;
        identifier(&relation.foreign_column)?;

        let alias = self.alias("j");
        let clause = format!(
            "LEFT JOIN {} {} ON {}.{} = {}.{}",
            relation.table, alias, alias, relation.foreign_column, outer, relation.local_column
        );
        self.joins.push(Join {
            path: path.to_string(),
            alias: alias.clone(),
            clause,
        });
        Ok(alias)
    }
}

fn identifier(name: &str) -> CompileResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(CompileError::InvalidField(name.to_string()))
    }
}

fn sql_op(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Gt => ">",
        CompareOp::Gte => ">=",
        CompareOp::Lt => "<",
        CompareOp::Lte => "<=",
    }
}

/// Escape LIKE metacharacters with `\`
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sift_config::{PathConfig, RelationConfig};
    use sift_core::DynamicQuery;

    fn compiler() -> SqlCompiler {
        let mut config = SiftConfig::default();
        config.paths = PathConfig {
            embedded: vec!["address".to_string()],
            ..PathConfig::default()
        };
        config
            .relational
            .relations
            .insert("roles".to_string(), RelationConfig::one_to_many("role", "admin_user_id"));
        SqlCompiler::new(&config)
    }

    fn render(query: &DynamicQuery, target: &str) -> SqlQuery {
        compiler().compile(query, target).unwrap().native
    }

    #[test]
    fn test_empty_query() {
        let sql = render(&DynamicQuery::new(), "employee");
        assert_eq!(sql.sql, "SELECT t0.*\nFROM employee t0\nLIMIT 20 OFFSET 0");
        assert_eq!(sql.count_sql, "SELECT COUNT(*)\nFROM employee t0");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn test_example_scenario() {
        let query = DynamicQuery::builder()
            .greater_than("age", 30)
            .equal("department.name", "Math")
            .build();
        let sql = render(&query, "employee");

        assert!(sql.sql.contains(
            "WHERE (t0.age > :p0 AND EXISTS (SELECT 1 FROM department a1 \
             WHERE a1.id = t0.department_id AND a1.name = :p1))"
        ));
        assert_eq!(sql.params["p0"], json!(30));
        assert_eq!(sql.params["p1"], json!("Math"));
    }

    #[test]
    fn test_one_to_many_mapping_and_nesting() {
        let query = DynamicQuery::builder()
            .equal("roles.roleAuthorizations.authorization.menuIcon", "home")
            .build();
        let sql = render(&query, "admin_user");

        assert!(sql.sql.contains("EXISTS (SELECT 1 FROM role a1 WHERE a1.admin_user_id = t0.id AND"));
        assert!(sql.sql.contains(
            "EXISTS (SELECT 1 FROM roleAuthorizations a2 WHERE a2.id = a1.roleAuthorizations_id AND"
        ));
        assert!(sql.sql.contains("a3.menuIcon = :p0"));
    }

    #[test]
    fn test_text_match_escapes_like_metacharacters() {
        let query = DynamicQuery::builder().contain("name", "50%_Off").build();
        let sql = render(&query, "product");

        assert!(sql.sql.contains("LOWER(t0.name) LIKE :p0 ESCAPE '\\'"));
        assert_eq!(sql.params["p0"], json!("%50\\%\\_off%"));
    }

    #[test]
    fn test_embedded_path_uses_flattened_column() {
        let query = DynamicQuery::builder().start_with("address.city", "Os").build();
        let sql = render(&query, "employee");

        assert!(sql.sql.contains("LOWER(t0.address_city) LIKE :p0"));
        assert_eq!(sql.params["p0"], json!("os%"));
    }

    #[test]
    fn test_or_groups_and_negation() {
        let query = DynamicQuery::builder()
            .not_equal("status", "X")
            .or()
            .specified("deleted_at", false)
            .build();
        let sql = render(&query, "item");

        assert!(sql.sql.contains(
            "WHERE ((t0.status IS NOT NULL AND NOT (t0.status = :p0)) OR NOT (t0.deleted_at IS NOT NULL))"
        ));
    }

    #[test]
    fn test_left_join_specified() {
        let query = DynamicQuery::builder().specified("department<id", false).build();
        let sql = render(&query, "employee");

        assert!(sql.sql.contains(
            "WHERE NOT (EXISTS (SELECT 1 FROM department a1 WHERE a1.id = t0.department_id))"
        ));
    }

    #[test]
    fn test_select_sort_distinct_and_page() {
        let query = DynamicQuery::builder()
            .select("name", "name")
            .select("department.name", "departmentName")
            .sort("department.name", Order::Desc)
            .page(2, 10)
            .distinct()
            .build();
        let sql = render(&query, "employee");

        assert_eq!(
            sql.sql,
            "SELECT DISTINCT t0.name AS \"name\", j1.name AS \"department.name\"\n\
             FROM employee t0\n\
             LEFT JOIN department j1 ON j1.id = t0.department_id\n\
             ORDER BY j1.name DESC\n\
             LIMIT 10 OFFSET 20"
        );
        assert!(sql.count_sql.starts_with("SELECT COUNT(*) FROM (SELECT DISTINCT"));
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let query = DynamicQuery::builder().equal("name; DROP TABLE x", 1).build();
        let result = compiler().compile(&query, "employee");
        assert!(matches!(result, Err(CompileError::InvalidField(_))));
    }
}
