//! Criteria-style query builder
//!
//! Filters and projections are expressed against entity property paths and
//! resolved to table columns through the [`ModelRegistry`]. Nested properties
//! must be joined (with an alias) before they are referenced. Composition is
//! conjunctive only; there is deliberately no OR.

use std::collections::HashMap;

use chartset_core::{
    ColumnType, IdSet, QueryColumn, QueryError, QueryResult, RowSet, STAGING_TABLE, Value,
    staging_key,
};

use crate::exec::{run_query, with_staged_id_sets};
use crate::lower::{Direction, JoinKind, Lowered, Operand, lower_equal, upper_bound};
use crate::model::{EntityModel, ModelRegistry};
use crate::session::{QueryBuilder, Session};

/// Default alias for the root entity
const ROOT_ALIAS: &str = "this";

struct Criterion {
    sql: String,
    params: Vec<Value>,
}

/// Fluent query over one root entity and its joined associations.
///
/// Builder methods stay chainable; the first configuration error (unknown
/// property, undeclared alias) is recorded and surfaced by `execute`.
pub struct CriteriaQuery {
    registry: ModelRegistry,
    root: EntityModel,
    root_alias: String,
    aliases: HashMap<String, EntityModel>,
    columns: Vec<QueryColumn>,
    projections: Vec<String>,
    joins: Vec<String>,
    criteria: Vec<Criterion>,
    order: Vec<String>,
    id_sets: Vec<IdSet>,
    error: Option<QueryError>,
}

impl CriteriaQuery {
    /// Start a query over the given entity with the default root alias
    pub fn new(registry: &ModelRegistry, entity: &str) -> QueryResult<Self> {
        Self::with_alias(registry, entity, ROOT_ALIAS)
    }

    /// Start a query over the given entity with an explicit root alias
    pub fn with_alias(registry: &ModelRegistry, entity: &str, alias: &str) -> QueryResult<Self> {
        let root = registry.entity(entity)?.clone();
        let mut aliases = HashMap::new();
        aliases.insert(alias.to_string(), root.clone());
        Ok(Self {
            registry: registry.clone(),
            root,
            root_alias: alias.to_string(),
            aliases,
            columns: Vec::new(),
            projections: Vec::new(),
            joins: Vec::new(),
            criteria: Vec::new(),
            order: Vec::new(),
            id_sets: Vec::new(),
            error: None,
        })
    }

    /// Register output columns by property path, in output order.
    ///
    /// A label may be appended after a colon, e.g. `"encounter_type.name:type"`;
    /// the label becomes the column name in the result.
    pub fn select_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for spec in columns {
            let spec = spec.as_ref();
            let (path, label) = match spec.split_once(':') {
                Some((path, label)) => (path, Some(label)),
                None => (spec, None),
            };
            match self.resolve(path) {
                Ok((expr, datatype)) => {
                    self.projections.push(expr);
                    self.columns
                        .push(QueryColumn::new(label.unwrap_or(path), datatype));
                }
                Err(e) => self.fail(e),
            }
        }
        self
    }

    /// Join an association under the given alias; must precede any reference
    /// to the alias in columns, filters, or orderings
    pub fn join(mut self, path: &str, alias: &str, kind: JoinKind) -> Self {
        let resolved = self.resolve_association(path);
        match resolved {
            Ok((source_alias, association)) => match self.registry.entity(&association.target) {
                Ok(target) => {
                    self.joins.push(format!(
                        "{} {} {alias} ON {source_alias}.{} = {alias}.{}",
                        kind.as_sql(),
                        target.table,
                        association.fk_column,
                        association.referenced_column,
                    ));
                    self.aliases.insert(alias.to_string(), target.clone());
                }
                Err(e) => self.fail(e),
            },
            Err(e) => self.fail(e),
        }
        self
    }

    /// Shorthand for an inner join
    pub fn inner_join(self, path: &str, alias: &str) -> Self {
        self.join(path, alias, JoinKind::Inner)
    }

    /// Shorthand for a left outer join
    pub fn left_outer_join(self, path: &str, alias: &str) -> Self {
        self.join(path, alias, JoinKind::LeftOuter)
    }

    /// Equality filter; see the lowering rules in [`crate::lower`]
    pub fn where_equal(mut self, path: &str, value: impl Into<Operand>) -> Self {
        match self.resolve(path) {
            Err(e) => self.fail(e),
            Ok((expr, _)) => match lower_equal(value.into()) {
                Lowered::IsNull => self.push(format!("{expr} IS NULL"), vec![]),
                Lowered::Eq(v) => self.push(format!("{expr} = ?"), vec![v]),
                Lowered::DayRange { start, end } => self.push(
                    format!("({expr} >= ? AND {expr} < ?)"),
                    vec![start.into(), end.into()],
                ),
                Lowered::InList(values) => self.push_in_list(&expr, values),
                Lowered::InIdSet(ids) => return self.where_id_in(path, &ids),
            },
        }
        self
    }

    /// Filter where the property is null
    pub fn where_null(mut self, path: &str) -> Self {
        match self.resolve(path) {
            Err(e) => self.fail(e),
            Ok((expr, _)) => self.push(format!("{expr} IS NULL"), vec![]),
        }
        self
    }

    /// Membership filter against a staged id set.
    ///
    /// The set is staged at execution time; the filter joins the staging
    /// table by content key rather than inlining thousands of literals.
    pub fn where_id_in(mut self, path: &str, ids: &IdSet) -> Self {
        match self.resolve(path) {
            Err(e) => self.fail(e),
            Ok((expr, _)) => {
                let key = staging_key(ids);
                self.push(
                    format!(
                        "{expr} IN (SELECT member_id FROM {STAGING_TABLE} WHERE staging_key = ?)"
                    ),
                    vec![Value::Int(key)],
                );
                self.id_sets.push(ids.clone());
            }
        }
        self
    }

    /// LIKE filter
    pub fn where_like(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.comparison(path, "LIKE", value.into());
        self
    }

    /// Strictly-greater filter
    pub fn where_greater(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.comparison(path, ">", value.into());
        self
    }

    /// Greater-or-equal filter
    pub fn where_greater_or_equal(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.comparison(path, ">=", value.into());
        self
    }

    /// Strictly-less filter; a whole-day datetime bound excludes that entire day
    pub fn where_less(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.comparison(path, "<", upper_bound(value.into(), false));
        self
    }

    /// Less-or-equal filter; a whole-day datetime bound includes that entire day
    pub fn where_less_or_equal(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.comparison(path, "<=", upper_bound(value.into(), true));
        self
    }

    /// Inclusive range filter; a null bound is skipped
    pub fn where_between_inclusive(
        self,
        path: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        let min = min.into();
        let max = max.into();
        let mut query = self;
        if !min.is_null() {
            query = query.where_greater_or_equal(path, min);
        }
        if !max.is_null() {
            query = query.where_less_or_equal(path, max);
        }
        query
    }

    /// Order results by the given property
    pub fn order_by(mut self, path: &str, direction: Direction) -> Self {
        match self.resolve(path) {
            Err(e) => self.fail(e),
            Ok((expr, _)) => self.order.push(format!("{expr} {}", direction.as_sql())),
        }
        self
    }

    /// Render the SQL for this query
    pub fn to_sql(&self) -> QueryResult<String> {
        if self.projections.is_empty() {
            return Err(QueryError::configuration(
                "no columns registered on criteria query",
            ));
        }
        let mut sql = format!(
            "SELECT {} FROM {} {}",
            self.projections.join(", "),
            self.root.table,
            self.root_alias
        );
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        for (i, criterion) in self.criteria.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&criterion.sql);
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        Ok(sql)
    }

    fn params(&self) -> Vec<Value> {
        self.criteria
            .iter()
            .flat_map(|c| c.params.iter().cloned())
            .collect()
    }

    fn comparison(&mut self, path: &str, operator: &str, value: Value) {
        match self.resolve(path) {
            Err(e) => self.fail(e),
            Ok((expr, _)) => self.push(format!("{expr} {operator} ?"), vec![value]),
        }
    }

    fn push_in_list(&mut self, expr: &str, values: Vec<Value>) {
        if values.is_empty() {
            // an empty membership list matches nothing
            self.push("1 = 0".to_string(), vec![]);
        } else {
            let placeholders = vec!["?"; values.len()].join(", ");
            self.push(format!("{expr} IN ({placeholders})"), values);
        }
    }

    fn push(&mut self, sql: String, params: Vec<Value>) {
        self.criteria.push(Criterion { sql, params });
    }

    fn fail(&mut self, e: QueryError) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    /// Resolve a property path to a qualified column expression
    fn resolve(&self, path: &str) -> QueryResult<(String, ColumnType)> {
        match path.split_once('.') {
            Some((alias, property)) => {
                let entity = self.aliases.get(alias).ok_or_else(|| {
                    QueryError::configuration(format!(
                        "join alias {alias} must be declared before {path} is referenced"
                    ))
                })?;
                let (column, datatype) = entity.resolve_property(property)?;
                Ok((format!("{alias}.{column}"), datatype))
            }
            None => {
                let (column, datatype) = self.root.resolve_property(path)?;
                Ok((format!("{}.{column}", self.root_alias), datatype))
            }
        }
    }

    /// Resolve a join path to its source alias and association metadata
    fn resolve_association(
        &self,
        path: &str,
    ) -> QueryResult<(String, crate::model::AssociationModel)> {
        let (source_alias, entity, property) = match path.split_once('.') {
            Some((alias, property)) => {
                let entity = self.aliases.get(alias).ok_or_else(|| {
                    QueryError::configuration(format!(
                        "join alias {alias} must be declared before {path} is referenced"
                    ))
                })?;
                (alias.to_string(), entity, property)
            }
            None => (self.root_alias.clone(), &self.root, path),
        };
        let association = entity.association(property).ok_or_else(|| {
            QueryError::configuration(format!(
                "entity {} has no association {property}",
                entity.name
            ))
        })?;
        Ok((source_alias, association.clone()))
    }
}

impl QueryBuilder for CriteriaQuery {
    fn columns(&self) -> &[QueryColumn] {
        &self.columns
    }

    fn execute(&self, session: &Session) -> QueryResult<RowSet> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let sql = self.to_sql()?;
        let params = self.params();
        with_staged_id_sets(session, &self.id_sets, |session| {
            run_query(session, &sql, &params, &self.columns)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> ModelRegistry {
        ModelRegistry::new()
            .with_entity(
                EntityModel::new("Encounter", "encounter")
                    .with_property("encounter_id", "encounter_id", ColumnType::Int)
                    .with_property("patient_id", "patient_id", ColumnType::Int)
                    .with_property("visit_date", "visit_date", ColumnType::DateTime)
                    .with_association(
                        "encounter_type",
                        "EncounterType",
                        "encounter_type_id",
                        "encounter_type_id",
                    ),
            )
            .with_entity(
                EntityModel::new("EncounterType", "encounter_type")
                    .with_property("encounter_type_id", "encounter_type_id", ColumnType::Int)
                    .with_property("name", "name", ColumnType::Text),
            )
    }

    #[test]
    fn renders_projections_filters_and_order() {
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .select_columns(["encounter_id", "patient_id"])
            .where_equal("patient_id", 7)
            .order_by("encounter_id", Direction::Desc);
        assert_eq!(
            query.to_sql().unwrap(),
            "SELECT this.encounter_id, this.patient_id FROM encounter this \
             WHERE this.patient_id = ? ORDER BY this.encounter_id DESC"
        );
        assert_eq!(query.params(), vec![Value::Int(7)]);
    }

    #[test]
    fn renders_joined_columns_with_labels() {
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .inner_join("encounter_type", "et")
            .select_columns(["encounter_id", "et.name:type"]);
        assert_eq!(
            query.to_sql().unwrap(),
            "SELECT this.encounter_id, et.name FROM encounter this \
             JOIN encounter_type et ON this.encounter_type_id = et.encounter_type_id"
        );
        assert_eq!(query.columns()[1].name, "type");
    }

    #[test]
    fn whole_day_equality_renders_a_range() {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .select_columns(["encounter_id"])
            .where_equal("visit_date", day);
        assert_eq!(
            query.to_sql().unwrap(),
            "SELECT this.encounter_id FROM encounter this \
             WHERE (this.visit_date >= ? AND this.visit_date < ?)"
        );
    }

    #[test]
    fn id_set_filter_joins_the_staging_table() {
        let ids: IdSet = [1, 2, 3].into();
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .select_columns(["encounter_id"])
            .where_id_in("encounter_id", &ids);
        assert_eq!(
            query.to_sql().unwrap(),
            format!(
                "SELECT this.encounter_id FROM encounter this WHERE this.encounter_id IN \
                 (SELECT member_id FROM {STAGING_TABLE} WHERE staging_key = ?)"
            )
        );
        assert_eq!(query.params(), vec![Value::Int(staging_key(&ids))]);
        assert_eq!(query.id_sets, vec![ids]);
    }

    #[test]
    fn id_set_under_where_equal_is_redirected() {
        let ids: IdSet = [5, 6].into();
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .select_columns(["encounter_id"])
            .where_equal("encounter_id", &ids);
        assert_eq!(query.id_sets, vec![ids]);
    }

    #[test]
    fn small_collections_render_literal_in() {
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .select_columns(["encounter_id"])
            .where_equal("patient_id", vec![1i64, 2, 3]);
        assert!(query.to_sql().unwrap().contains("IN (?, ?, ?)"));
    }

    #[test]
    fn null_bounds_are_skipped_in_between() {
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .select_columns(["encounter_id"])
            .where_between_inclusive("patient_id", 5, Value::Null);
        assert_eq!(
            query.to_sql().unwrap(),
            "SELECT this.encounter_id FROM encounter this WHERE this.patient_id >= ?"
        );
    }

    #[test]
    fn undeclared_alias_is_a_deferred_configuration_error() {
        let query = CriteriaQuery::new(&registry(), "Encounter")
            .unwrap()
            .select_columns(["et.name"]);
        assert!(matches!(
            query.error,
            Some(QueryError::Configuration { .. })
        ));
    }

    #[test]
    fn unknown_entity_fails_at_construction() {
        assert!(CriteriaQuery::new(&registry(), "Visit").is_err());
    }

    #[test]
    fn no_columns_is_a_configuration_error() {
        let query = CriteriaQuery::new(&registry(), "Encounter").unwrap();
        assert!(matches!(
            query.to_sql(),
            Err(QueryError::Configuration { .. })
        ));
    }
}
