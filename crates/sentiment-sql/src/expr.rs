//! SQL expressions.

use crate::{ColumnName, ParamName, SchemaName, TypeName};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A parameter placeholder (e.g., $label -> $1)
    Param(ParamName),
    /// A column reference
    Column(ColumnName),
    /// A string literal
    String(String),
    /// Binary operation (e.g., a = b, a AND b)
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// `CAST(expr AS type)`
    Cast { expr: Box<Expr>, ty: TypeRef },
    /// Function call
    FnCall { name: String, args: Vec<Expr> },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    And,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::And => "AND",
        }
    }
}

/// A schema-qualified type name, rendered quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub schema: SchemaName,
    pub name: TypeName,
}

impl TypeRef {
    pub fn new(schema: SchemaName, name: TypeName) -> Self {
        Self { schema, name }
    }

    /// `pg_catalog.text`
    pub fn text() -> Self {
        Self::new("pg_catalog".into(), "text".into())
    }
}

// Convenience constructors
impl Expr {
    pub fn param(name: ParamName) -> Self {
        Expr::Param(name)
    }

    pub fn column(name: ColumnName) -> Self {
        Expr::Column(name)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::String(s.into())
    }

    /// `COALESCE(self, fallback)`
    pub fn coalesce(self, fallback: Expr) -> Self {
        Expr::FnCall {
            name: "COALESCE".into(),
            args: vec![self, fallback],
        }
    }

    /// `CAST(self AS ty)`
    pub fn cast(self, ty: TypeRef) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            ty,
        }
    }

    /// Create an equality expression: self = other
    pub fn eq(self, other: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(self),
            op: BinOp::Eq,
            right: Box::new(other),
        }
    }

    /// Create an AND expression: self AND other
    pub fn and(self, other: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(self),
            op: BinOp::And,
            right: Box::new(other),
        }
    }

    /// Fold expressions into a left-nested AND chain.
    ///
    /// Returns `None` for an empty iterator.
    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        exprs.into_iter().reduce(Expr::and)
    }
}
