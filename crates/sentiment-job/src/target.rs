//! What the job reads and writes: the target table, its columns, its key.

use sentiment_sql::{ColumnName, Ident, SchemaName, TableName, TableRef, TypeRef};
use std::fmt;
use std::str::FromStr;

/// A table name with an optional schema.
///
/// Without a schema, the name resolves through the connection's
/// `search_path`, the same table an unqualified name finds in plain SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    pub schema: Option<SchemaName>,
    pub name: TableName,
}

impl QualifiedTable {
    pub fn new(name: impl Into<TableName>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn in_schema(schema: impl Into<SchemaName>, name: impl Into<TableName>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    pub fn schema_str(&self) -> Option<&str> {
        self.schema.as_ref().map(|s| s.as_str())
    }

    /// The name quoted for `to_regclass`, e.g. `"feedback"."Reviews"`.
    pub fn regclass_text(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", Ident(schema.as_str()), Ident(self.name.as_str())),
            None => Ident(self.name.as_str()).to_string(),
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }
}

/// Parses `table` or `schema.table`, splitting on the first dot.
impl FromStr for QualifiedTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (schema, name) = match s.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, s),
        };
        if name.is_empty() || schema.is_some_and(str::is_empty) {
            return Err(format!("invalid table name {s:?}"));
        }
        Ok(match schema {
            Some(schema) => QualifiedTable::in_schema(schema, name),
            None => QualifiedTable::new(name),
        })
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema.as_str(), self.name.as_str()),
            None => write!(f, "{}", self.name.as_str()),
        }
    }
}

/// The table/column triple one run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub table: QualifiedTable,
    /// Column holding the text to classify.
    pub input: ColumnName,
    /// Column receiving the sentiment label.
    pub output: ColumnName,
}

/// One primary-key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: ColumnName,
    /// Set when the column's type has no [`Value`](crate::value::Value)
    /// mapping (enums, domains, arrays). Such keys are selected as text and
    /// the bound text is cast back to this type in the UPDATE.
    pub text_cast: Option<TypeRef>,
}

impl KeyColumn {
    pub fn native(name: impl Into<ColumnName>) -> Self {
        Self {
            name: name.into(),
            text_cast: None,
        }
    }

    pub fn via_text(name: impl Into<ColumnName>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            text_cast: Some(ty),
        }
    }
}

/// Primary-key columns in ordinal order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey(Vec<KeyColumn>);

impl PrimaryKey {
    /// Returns `None` for an empty column list.
    pub fn new(columns: Vec<KeyColumn>) -> Option<Self> {
        if columns.is_empty() {
            None
        } else {
            Some(Self(columns))
        }
    }

    pub fn columns(&self) -> &[KeyColumn] {
        &self.0
    }

    pub fn names(&self) -> impl Iterator<Item = &ColumnName> {
        self.0.iter().map(|c| &c.name)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c.name.as_str() == column)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, col) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", col.name.as_str())?;
        }
        Ok(())
    }
}
