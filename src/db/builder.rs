//! Parameterized statement building.
//!
//! [`StatementBuilder`] accumulates SQL text and its bound parameters side by
//! side. Every value-bearing clause allocates its `$n` placeholder by pushing
//! onto the builder's own parameter list, so the placeholder count and the
//! parameter count cannot drift apart. Values never appear in the SQL text;
//! identifiers are always double-quoted.
//!
//! Parameters of types the driver cannot encode travel as text and are cast
//! back server-side (`CAST($n AS "schema"."type")`). Columns of those types are
//! projected as `"col"::text` so they can be decoded on the way out.

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use std::fmt;

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a table reference, splitting `schema.table` on the first dot.
pub fn quote_table(name: &str) -> String {
    match name.split_once('.') {
        Some((schema, table)) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(name),
    }
}

/// One output column of a `SELECT` or `RETURNING` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection<'a> {
    Column(&'a str),
    /// Read back in its text form, under its own name
    Text(&'a str),
}

impl Projection<'_> {
    fn to_sql(self) -> String {
        match self {
            Self::Column(name) => quote_ident(name),
            Self::Text(name) => {
                let quoted = quote_ident(name);
                format!("{quoted}::text AS {quoted}")
            }
        }
    }
}

fn projection_list(columns: &[Projection<'_>]) -> String {
    if columns.is_empty() {
        return "*".to_string();
    }
    columns
        .iter()
        .map(|c| c.to_sql())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    IsNull,
    IsNotNull,
}

impl Op {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A single typed predicate: `column op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: String,
    op: Op,
    value: Option<QueryParam>,
}

impl Condition {
    fn binary(column: impl Into<String>, op: Op, value: impl Into<QueryParam>) -> Self {
        Self {
            column: column.into(),
            op,
            value: Some(value.into()),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::binary(column, Op::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::binary(column, Op::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::binary(column, Op::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::binary(column, Op::Lte, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::binary(column, Op::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        Self::binary(column, Op::Gte, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: Op::IsNull,
            value: None,
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: Op::IsNotNull,
            value: None,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> Op {
        self.op
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

/// Finished SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Statement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// Owned accumulator for one statement.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    sql: String,
    params: Vec<QueryParam>,
    has_predicate: bool,
    has_returning: bool,
}

impl StatementBuilder {
    fn seed(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
            has_predicate: false,
            has_returning: false,
        }
    }

    // ===== Seeds =====

    /// `SELECT * FROM table`
    pub fn select(table: &str) -> Self {
        Self::seed(format!("SELECT * FROM {}", quote_table(table)))
    }

    /// `SELECT col, ... FROM table`; an empty list selects `*`.
    pub fn select_projected(table: &str, columns: &[Projection<'_>]) -> Self {
        Self::seed(format!(
            "SELECT {} FROM {}",
            projection_list(columns),
            quote_table(table)
        ))
    }

    /// `SELECT COUNT(*) FROM table`
    pub fn count(table: &str) -> Self {
        Self::seed(format!("SELECT COUNT(*) FROM {}", quote_table(table)))
    }

    /// `INSERT INTO table (cols) VALUES ($1, ...)`
    pub fn insert(table: &str, values: Vec<(String, QueryParam)>) -> DbResult<Self> {
        if values.is_empty() {
            return Err(DbError::invalid_input(format!(
                "INSERT into {} requires at least one value",
                table
            )));
        }
        let mut builder = Self::seed(format!("INSERT INTO {}", quote_table(table)));
        let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
        let placeholders: Vec<String> = values
            .into_iter()
            .map(|(_, v)| builder.push_param(v))
            .collect();
        builder.sql.push_str(&format!(
            " ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ));
        Ok(builder)
    }

    /// `UPDATE table SET col = $1, ...`
    pub fn update(table: &str, values: Vec<(String, QueryParam)>) -> DbResult<Self> {
        if values.is_empty() {
            return Err(DbError::invalid_input(format!(
                "UPDATE of {} requires at least one value",
                table
            )));
        }
        let mut builder = Self::seed(format!("UPDATE {}", quote_table(table)));
        let assignments: Vec<String> = values
            .into_iter()
            .map(|(c, v)| format!("{} = {}", quote_ident(&c), builder.push_param(v)))
            .collect();
        builder.sql.push_str(" SET ");
        builder.sql.push_str(&assignments.join(", "));
        Ok(builder)
    }

    /// `DELETE FROM table`
    pub fn delete(table: &str) -> Self {
        Self::seed(format!("DELETE FROM {}", quote_table(table)))
    }

    // ===== Clauses =====

    /// Add a predicate. The first one opens `WHERE`, later ones join with `AND`.
    pub fn where_(self, cond: Condition) -> Self {
        self.predicate("AND", cond)
    }

    /// Join with `AND`; opens `WHERE` when no predicate exists yet.
    pub fn and(self, cond: Condition) -> Self {
        self.predicate("AND", cond)
    }

    /// Join with `OR`; opens `WHERE` when no predicate exists yet.
    pub fn or(self, cond: Condition) -> Self {
        self.predicate("OR", cond)
    }

    fn predicate(mut self, joiner: &str, cond: Condition) -> Self {
        let keyword = if self.has_predicate { joiner } else { "WHERE" };
        self.has_predicate = true;

        let column = quote_ident(&cond.column);
        let clause = match cond.value {
            Some(value) => {
                let placeholder = self.push_param(value);
                format!(" {} {} {} {}", keyword, column, cond.op.as_sql(), placeholder)
            }
            None => format!(" {} {} {}", keyword, column, cond.op.as_sql()),
        };
        self.sql.push_str(&clause);
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.sql
            .push_str(&format!(" ORDER BY {} {}", quote_ident(column), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        let placeholder = self.push_param(QueryParam::from(limit));
        self.sql.push_str(&format!(" LIMIT {}", placeholder));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        let placeholder = self.push_param(QueryParam::from(offset));
        self.sql.push_str(&format!(" OFFSET {}", placeholder));
        self
    }

    /// `RETURNING col, ...`; ignored once a returning clause exists.
    pub fn returning(mut self, columns: &[&str]) -> Self {
        if self.has_returning || columns.is_empty() {
            return self;
        }
        let columns: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        self.sql.push_str(" RETURNING ");
        self.sql.push_str(&columns.join(", "));
        self.has_returning = true;
        self
    }

    /// `RETURNING col, ...` with text projections; an empty list returns `*`.
    pub fn returning_projected(mut self, columns: &[Projection<'_>]) -> Self {
        if !self.has_returning {
            self.sql.push_str(" RETURNING ");
            self.sql.push_str(&projection_list(columns));
            self.has_returning = true;
        }
        self
    }

    /// `RETURNING *`; ignored once a returning clause exists.
    pub fn returning_all(mut self) -> Self {
        if !self.has_returning {
            self.sql.push_str(" RETURNING *");
            self.has_returning = true;
        }
        self
    }

    /// Snapshot the statement. Can be called any number of times.
    pub fn build(&self) -> Statement {
        Statement {
            sql: self.sql.clone(),
            params: self.params.clone(),
        }
    }

    fn push_param(&mut self, value: QueryParam) -> String {
        let cast = value.cast_type().map(quote_table);
        self.params.push(value);
        let placeholder = format!("${}", self.params.len());
        match cast {
            Some(sql_type) => format!("CAST({} AS {})", placeholder, sql_type),
            None => placeholder,
        }
    }
}
