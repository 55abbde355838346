//! Abstract syntax tree for the SQL dialect.
//!
//! Statements and expressions are closed sum types — the executor and
//! planner match exhaustively, so adding a node is a compile-visible
//! change everywhere it matters.

use crate::types::{DataType, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        name: String,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Expr>,
    },
    Select(SelectStatement),
    Update {
        table: String,
        sets: Vec<(String, Expr)>,
        where_clause: Option<Expr>,
    },
    Delete {
        table: String,
        where_clause: Option<Expr>,
    },
    Explain(Box<Statement>),
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub columns: Vec<SelectItem>,
    pub from: String,
    pub join: Option<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub size_hint: u16,
    pub primary_key: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Min => "MIN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, optionally table-qualified (`users.id`).
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Aggregate call; `column` is `None` for `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        column: Option<String>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Collects every column name the expression references.
    pub fn referenced_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column { name, .. } => out.push(name.clone()),
            Expr::Binary { left, right, .. } => {
                left.referenced_columns(out);
                right.referenced_columns(out);
            }
            Expr::Not(inner) => inner.referenced_columns(out),
            Expr::Aggregate { column, .. } => {
                if let Some(column) = column {
                    out.push(column.clone());
                }
            }
            Expr::Literal(_) => {}
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Aggregate { .. })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { table: Some(t), name } => write!(f, "{}.{}", t, name),
            Expr::Column { table: None, name } => f.write_str(name),
            Expr::Literal(Value::Text(s)) => write!(f, "'{}'", s),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::Aggregate { func, column } => match column {
                Some(column) => write!(f, "{}({})", func, column),
                None => write!(f, "{}(*)", func),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_readable_predicates() {
        let expr = Expr::binary(
            Expr::binary(
                Expr::column("age"),
                BinaryOp::Ge,
                Expr::literal(Value::Int32(21)),
            ),
            BinaryOp::And,
            Expr::binary(
                Expr::column("name"),
                BinaryOp::Eq,
                Expr::literal(Value::Text("alice".into())),
            ),
        );
        assert_eq!(expr.to_string(), "((age >= 21) AND (name = 'alice'))");
    }

    #[test]
    fn referenced_columns_walks_the_tree() {
        let expr = Expr::binary(
            Expr::column("a"),
            BinaryOp::Or,
            Expr::Not(Box::new(Expr::binary(
                Expr::column("b"),
                BinaryOp::Lt,
                Expr::column("c"),
            ))),
        );
        let mut columns = Vec::new();
        expr.referenced_columns(&mut columns);
        assert_eq!(columns, ["a", "b", "c"]);
    }
}
