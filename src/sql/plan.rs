//! Physical plan nodes.
//!
//! A closed enum rather than a node trait: the executor matches
//! exhaustively, and EXPLAIN renders the tree with [`PlanNode::describe`].

use crate::schema::Schema;
use crate::sql::ast::{AggregateFunc, Expr, OrderBy};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    /// `None` for `COUNT(*)`.
    pub column: Option<String>,
    /// Output column label, e.g. `SUM(amount)`.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Scan {
        table: String,
        schema: Schema,
    },
    Filter {
        predicate: Expr,
        child: Box<PlanNode>,
    },
    Project {
        columns: Vec<String>,
        schema: Schema,
        child: Box<PlanNode>,
    },
    Join {
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        on: Expr,
        schema: Schema,
    },
    Aggregate {
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
        schema: Schema,
        child: Box<PlanNode>,
    },
    Sort {
        order_by: Vec<OrderBy>,
        child: Box<PlanNode>,
    },
    Limit {
        limit: Option<u64>,
        offset: u64,
        child: Box<PlanNode>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Expr>,
    },
    Update {
        table: String,
        sets: Vec<(String, Expr)>,
        child: Box<PlanNode>,
    },
    Delete {
        table: String,
        child: Box<PlanNode>,
    },
    CreateTable {
        schema: Schema,
        primary_key: Option<usize>,
    },
    DropTable {
        name: String,
    },
    /// Produces no rows; left behind when a filter folds to FALSE.
    Empty {
        schema: Schema,
    },
}

impl PlanNode {
    /// Schema of the rows this node produces, `None` for DML/DDL nodes.
    pub fn output_schema(&self) -> Option<&Schema> {
        match self {
            PlanNode::Scan { schema, .. }
            | PlanNode::Project { schema, .. }
            | PlanNode::Join { schema, .. }
            | PlanNode::Aggregate { schema, .. }
            | PlanNode::Empty { schema } => Some(schema),
            PlanNode::Filter { child, .. }
            | PlanNode::Sort { child, .. }
            | PlanNode::Limit { child, .. } => child.output_schema(),
            PlanNode::Insert { .. }
            | PlanNode::Update { .. }
            | PlanNode::Delete { .. }
            | PlanNode::CreateTable { .. }
            | PlanNode::DropTable { .. } => None,
        }
    }

    /// Indented tree rendering for EXPLAIN.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match self {
            PlanNode::Scan { table, .. } => {
                let _ = writeln!(out, "Scan({})", table);
            }
            PlanNode::Filter { predicate, child } => {
                let _ = writeln!(out, "Filter({})", predicate);
                child.describe_into(out, depth + 1);
            }
            PlanNode::Project { columns, child, .. } => {
                let _ = writeln!(out, "Project({})", columns.join(", "));
                child.describe_into(out, depth + 1);
            }
            PlanNode::Join { left, right, on, .. } => {
                let _ = writeln!(out, "Join(on {})", on);
                left.describe_into(out, depth + 1);
                right.describe_into(out, depth + 1);
            }
            PlanNode::Aggregate {
                group_by,
                aggregates,
                child,
                ..
            } => {
                let labels: Vec<&str> = aggregates.iter().map(|a| a.label.as_str()).collect();
                if group_by.is_empty() {
                    let _ = writeln!(out, "Aggregate({})", labels.join(", "));
                } else {
                    let _ = writeln!(
                        out,
                        "Aggregate(group by {}; {})",
                        group_by.join(", "),
                        labels.join(", ")
                    );
                }
                child.describe_into(out, depth + 1);
            }
            PlanNode::Sort { order_by, child } => {
                let keys: Vec<String> = order_by
                    .iter()
                    .map(|o| {
                        format!("{} {}", o.column, if o.ascending { "ASC" } else { "DESC" })
                    })
                    .collect();
                let _ = writeln!(out, "Sort({})", keys.join(", "));
                child.describe_into(out, depth + 1);
            }
            PlanNode::Limit {
                limit,
                offset,
                child,
            } => {
                match limit {
                    Some(limit) => {
                        let _ = writeln!(out, "Limit({} offset {})", limit, offset);
                    }
                    None => {
                        let _ = writeln!(out, "Limit(all offset {})", offset);
                    }
                }
                child.describe_into(out, depth + 1);
            }
            PlanNode::Insert { table, columns, .. } => {
                let _ = writeln!(out, "Insert({}, [{}])", table, columns.join(", "));
            }
            PlanNode::Update { table, sets, child } => {
                let columns: Vec<&str> = sets.iter().map(|(c, _)| c.as_str()).collect();
                let _ = writeln!(out, "Update({}, set {})", table, columns.join(", "));
                child.describe_into(out, depth + 1);
            }
            PlanNode::Delete { table, child } => {
                let _ = writeln!(out, "Delete({})", table);
                child.describe_into(out, depth + 1);
            }
            PlanNode::CreateTable { schema, .. } => {
                let _ = writeln!(out, "CreateTable({})", schema.table_name());
            }
            PlanNode::DropTable { name } => {
                let _ = writeln!(out, "DropTable({})", name);
            }
            PlanNode::Empty { .. } => {
                let _ = writeln!(out, "Empty");
            }
        }
    }
}
