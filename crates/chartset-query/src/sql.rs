//! Textual query builder
//!
//! The escape hatch for queries the criteria builder cannot express: column
//! expressions and WHERE fragments are passed through verbatim, with
//! positional `?` placeholders bound in order of appearance. The typed
//! `where_*` helpers share the lowering rules in [`crate::lower`], so date
//! and membership semantics match the criteria backend exactly.

use chartset_core::{
    ColumnType, IdSet, QueryColumn, QueryError, QueryResult, RowSet, STAGING_TABLE, Value,
    staging_key,
};

use crate::exec::{run_query, with_staged_id_sets};
use crate::lower::{Lowered, Operand, lower_equal, upper_bound};
use crate::session::{QueryBuilder, Session};

/// Fluent builder over hand-written SQL fragments
#[derive(Default)]
pub struct SqlQuery {
    columns: Vec<QueryColumn>,
    select_exprs: Vec<String>,
    from: Option<(String, String)>,
    clauses: Vec<String>,
    params: Vec<Value>,
    order: Vec<String>,
    id_sets: Vec<IdSet>,
}

impl SqlQuery {
    /// Start an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Register select expressions; a label may follow a colon
    /// (`"e.visit_date:visit_date"`) and becomes the result column name
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for spec in columns {
            self = self.select_typed(spec.as_ref(), ColumnType::Any);
        }
        self
    }

    /// Register one select expression with a declared type for row decoding
    pub fn select_typed(mut self, spec: &str, datatype: ColumnType) -> Self {
        let (expr, label) = match spec.split_once(':') {
            Some((expr, label)) => (expr, Some(label)),
            None => (spec, None),
        };
        self.select_exprs.push(expr.to_string());
        self.columns
            .push(QueryColumn::new(label.unwrap_or(expr), datatype));
        self
    }

    /// Set the table and alias to query from
    pub fn from(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.from = Some((table.into(), alias.into()));
        self
    }

    /// Append a raw WHERE fragment; placeholders are bound with [`bind`](Self::bind)
    pub fn where_clause(mut self, fragment: impl Into<String>) -> Self {
        self.clauses.push(fragment.into());
        self
    }

    /// Bind the next positional parameter
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Filter where the column expression is null
    pub fn where_null(self, expr: &str) -> Self {
        self.where_clause(format!("{expr} IS NULL"))
    }

    /// Equality filter; see the lowering rules in [`crate::lower`]
    pub fn where_equal(mut self, expr: &str, value: impl Into<Operand>) -> Self {
        match lower_equal(value.into()) {
            Lowered::IsNull => self.where_null(expr),
            Lowered::Eq(v) => self.where_clause(format!("{expr} = ?")).bind(v),
            Lowered::DayRange { start, end } => self
                .where_clause(format!("({expr} >= ? AND {expr} < ?)"))
                .bind(start)
                .bind(end),
            Lowered::InList(values) => {
                if values.is_empty() {
                    return self.where_clause("1 = 0");
                }
                let placeholders = vec!["?"; values.len()].join(", ");
                self = self.where_clause(format!("{expr} IN ({placeholders})"));
                for value in values {
                    self = self.bind(value);
                }
                self
            }
            Lowered::InIdSet(ids) => self.where_id_in(expr, &ids),
        }
    }

    /// Membership filter against a staged id set
    pub fn where_id_in(mut self, expr: &str, ids: &IdSet) -> Self {
        let key = staging_key(ids);
        self.id_sets.push(ids.clone());
        self.where_clause(format!(
            "{expr} IN (SELECT member_id FROM {STAGING_TABLE} WHERE staging_key = ?)"
        ))
        .bind(key)
    }

    /// LIKE filter
    pub fn where_like(self, expr: &str, value: impl Into<Value>) -> Self {
        self.where_clause(format!("{expr} LIKE ?")).bind(value)
    }

    /// Strictly-greater filter
    pub fn where_greater(self, expr: &str, value: impl Into<Value>) -> Self {
        self.where_clause(format!("{expr} > ?")).bind(value)
    }

    /// Greater-or-equal filter
    pub fn where_greater_or_equal(self, expr: &str, value: impl Into<Value>) -> Self {
        self.where_clause(format!("{expr} >= ?")).bind(value)
    }

    /// Strictly-less filter; a whole-day datetime bound excludes that entire day
    pub fn where_less(self, expr: &str, value: impl Into<Value>) -> Self {
        let bound = upper_bound(value.into(), false);
        self.where_clause(format!("{expr} < ?")).bind(bound)
    }

    /// Less-or-equal filter; a whole-day datetime bound includes that entire day
    pub fn where_less_or_equal(self, expr: &str, value: impl Into<Value>) -> Self {
        let bound = upper_bound(value.into(), true);
        self.where_clause(format!("{expr} <= ?")).bind(bound)
    }

    /// Inclusive range filter; a null bound is skipped
    pub fn where_between_inclusive(
        self,
        expr: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        let min = min.into();
        let max = max.into();
        let mut query = self;
        if !min.is_null() {
            query = query.where_greater_or_equal(expr, min);
        }
        if !max.is_null() {
            query = query.where_less_or_equal(expr, max);
        }
        query
    }

    /// Ascending ORDER BY term
    pub fn order_asc(mut self, expr: &str) -> Self {
        self.order.push(format!("{expr} ASC"));
        self
    }

    /// Descending ORDER BY term
    pub fn order_desc(mut self, expr: &str) -> Self {
        self.order.push(format!("{expr} DESC"));
        self
    }

    /// Render the SQL for this query
    pub fn query_string(&self) -> QueryResult<String> {
        if self.select_exprs.is_empty() {
            return Err(QueryError::configuration("no columns registered on query"));
        }
        let Some((table, alias)) = &self.from else {
            return Err(QueryError::configuration("no FROM table registered"));
        };
        let mut sql = format!(
            "SELECT {} FROM {table} {alias}",
            self.select_exprs.join(", ")
        );
        for (i, clause) in self.clauses.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(clause);
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        Ok(sql)
    }
}

impl QueryBuilder for SqlQuery {
    fn columns(&self) -> &[QueryColumn] {
        &self.columns
    }

    fn execute(&self, session: &Session) -> QueryResult<RowSet> {
        let sql = self.query_string()?;
        with_staged_id_sets(session, &self.id_sets, |session| {
            run_query(session, &sql, &self.params, &self.columns)
        })
    }
}
