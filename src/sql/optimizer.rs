//! # Rule-Based Optimizer
//!
//! Two rewrite rules applied bottom-up, plus a row-count estimator used
//! by EXPLAIN:
//!
//! - **Constant folding**: predicates over literals collapse; a filter
//!   that folds to TRUE disappears, one that folds to FALSE (or NULL)
//!   becomes an [`PlanNode::Empty`] node.
//! - **Filter push-down**: a filter sitting on a join moves below the
//!   join when its predicate references columns of only one side.

use crate::schema::Catalog;
use crate::sql::ast::{BinaryOp, Expr};
use crate::sql::plan::PlanNode;
use crate::types::Value;
use std::cmp::Ordering;
use std::sync::Arc;

pub struct Optimizer;

impl Optimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn optimize(&self, plan: PlanNode) -> PlanNode {
        let plan = self.optimize_children(plan);
        let plan = self.apply_constant_folding(plan);
        self.apply_filter_pushdown(plan)
    }

    fn optimize_children(&self, plan: PlanNode) -> PlanNode {
        match plan {
            PlanNode::Filter { predicate, child } => PlanNode::Filter {
                predicate,
                child: Box::new(self.optimize(*child)),
            },
            PlanNode::Project {
                columns,
                schema,
                child,
            } => PlanNode::Project {
                columns,
                schema,
                child: Box::new(self.optimize(*child)),
            },
            PlanNode::Join {
                left,
                right,
                on,
                schema,
            } => PlanNode::Join {
                left: Box::new(self.optimize(*left)),
                right: Box::new(self.optimize(*right)),
                on,
                schema,
            },
            PlanNode::Aggregate {
                group_by,
                aggregates,
                schema,
                child,
            } => PlanNode::Aggregate {
                group_by,
                aggregates,
                schema,
                child: Box::new(self.optimize(*child)),
            },
            PlanNode::Sort { order_by, child } => PlanNode::Sort {
                order_by,
                child: Box::new(self.optimize(*child)),
            },
            PlanNode::Limit {
                limit,
                offset,
                child,
            } => PlanNode::Limit {
                limit,
                offset,
                child: Box::new(self.optimize(*child)),
            },
            PlanNode::Update { table, sets, child } => PlanNode::Update {
                table,
                sets,
                child: Box::new(self.optimize(*child)),
            },
            PlanNode::Delete { table, child } => PlanNode::Delete {
                table,
                child: Box::new(self.optimize(*child)),
            },
            other => other,
        }
    }

    fn apply_constant_folding(&self, plan: PlanNode) -> PlanNode {
        let (predicate, child) = match plan {
            PlanNode::Filter { predicate, child } => (predicate, child),
            other => return other,
        };
        let folded = fold_expr(&predicate);
        match &folded {
            Expr::Literal(Value::Bool(true)) => *child,
            Expr::Literal(Value::Bool(false)) | Expr::Literal(Value::Null) => {
                match child.output_schema() {
                    Some(schema) => PlanNode::Empty {
                        schema: schema.clone(),
                    },
                    None => PlanNode::Filter {
                        predicate: folded,
                        child,
                    },
                }
            }
            _ => PlanNode::Filter {
                predicate: folded,
                child,
            },
        }
    }

    fn apply_filter_pushdown(&self, plan: PlanNode) -> PlanNode {
        let (predicate, child) = match plan {
            PlanNode::Filter { predicate, child } => (predicate, child),
            other => return other,
        };
        let (left, right, on, schema) = match *child {
            PlanNode::Join {
                left,
                right,
                on,
                schema,
            } => (left, right, on, schema),
            other => {
                return PlanNode::Filter {
                    predicate,
                    child: Box::new(other),
                }
            }
        };

        let mut referenced = Vec::new();
        predicate.referenced_columns(&mut referenced);
        let all_in = |node: &PlanNode| {
            node.output_schema().is_some_and(|s| {
                referenced
                    .iter()
                    .all(|column| s.column_index(column).is_some())
            })
        };

        if all_in(&left) {
            PlanNode::Join {
                left: Box::new(PlanNode::Filter {
                    predicate,
                    child: left,
                }),
                right,
                on,
                schema,
            }
        } else if all_in(&right) {
            PlanNode::Join {
                left,
                right: Box::new(PlanNode::Filter {
                    predicate,
                    child: right,
                }),
                on,
                schema,
            }
        } else {
            PlanNode::Filter {
                predicate,
                child: Box::new(PlanNode::Join {
                    left,
                    right,
                    on,
                    schema,
                }),
            }
        }
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively folds constant subexpressions.
pub fn fold_expr(expr: &Expr) -> Expr {
    match expr {
        Expr::Binary { left, op, right } => {
            let left = fold_expr(left);
            let right = fold_expr(right);
            if let (Expr::Literal(l), Expr::Literal(r)) = (&left, &right) {
                if let Some(folded) = fold_binary(l, *op, r) {
                    return Expr::Literal(folded);
                }
            }
            Expr::Binary {
                left: Box::new(left),
                op: *op,
                right: Box::new(right),
            }
        }
        Expr::Not(inner) => {
            let inner = fold_expr(inner);
            match inner {
                Expr::Literal(Value::Bool(b)) => Expr::Literal(Value::Bool(!b)),
                Expr::Literal(Value::Null) => Expr::Literal(Value::Null),
                other => Expr::Not(Box::new(other)),
            }
        }
        other => other.clone(),
    }
}

fn fold_binary(left: &Value, op: BinaryOp, right: &Value) -> Option<Value> {
    match op {
        BinaryOp::And => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(*a && *b)),
            (Value::Null, _) | (_, Value::Null) => Some(Value::Null),
            _ => None,
        },
        BinaryOp::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(*a || *b)),
            (Value::Null, _) | (_, Value::Null) => Some(Value::Null),
            _ => None,
        },
        comparison => match left.compare(right) {
            None => {
                if left.is_null() || right.is_null() {
                    Some(Value::Null)
                } else {
                    None
                }
            }
            Some(ordering) => Some(Value::Bool(match comparison {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Neq => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            })),
        },
    }
}

/// Row-count estimate for EXPLAIN. Scans count live rows via the heap's
/// row index; derived nodes apply the usual coarse factors.
pub fn estimate_rows(plan: &PlanNode, catalog: &Arc<Catalog>) -> f64 {
    match plan {
        PlanNode::Scan { table, .. } => catalog
            .table(table)
            .map(|t| t.lock().row_count() as f64)
            .unwrap_or(0.0),
        PlanNode::Filter { child, .. } => estimate_rows(child, catalog) * 0.1,
        PlanNode::Project { child, .. } | PlanNode::Sort { child, .. } => {
            estimate_rows(child, catalog)
        }
        PlanNode::Join { left, right, .. } => {
            estimate_rows(left, catalog) * estimate_rows(right, catalog)
        }
        PlanNode::Aggregate {
            group_by, child, ..
        } => {
            if group_by.is_empty() {
                1.0
            } else {
                estimate_rows(child, catalog)
            }
        }
        PlanNode::Limit { limit, child, .. } => {
            let child_rows = estimate_rows(child, catalog);
            match limit {
                Some(limit) => child_rows.min(*limit as f64),
                None => child_rows,
            }
        }
        PlanNode::Insert { .. } => 1.0,
        PlanNode::Update { child, .. } | PlanNode::Delete { child, .. } => {
            estimate_rows(child, catalog)
        }
        PlanNode::CreateTable { .. } | PlanNode::DropTable { .. } | PlanNode::Empty { .. } => 0.0,
    }
}
