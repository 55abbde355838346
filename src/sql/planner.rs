//! # Planner
//!
//! Lowers an AST [`Statement`] into a [`PlanNode`] tree, resolving table
//! and column names against the catalog. Name resolution failures are
//! plan-time errors; the executor can assume every reference resolves.
//!
//! SELECT lowering, bottom to top:
//!
//! ```text
//! Scan → [Join] → [Filter] → [Aggregate] → [Sort] → [Project] → [Limit]
//! ```

use crate::schema::{Catalog, Column, Schema};
use crate::sql::ast::{AggregateFunc, ColumnDef, Expr, SelectItem, SelectStatement, Statement};
use crate::sql::plan::{AggregateExpr, PlanNode};
use crate::types::DataType;
use eyre::{bail, ensure, Result};
use std::sync::Arc;

pub struct Planner {
    catalog: Arc<Catalog>,
}

impl Planner {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn plan(&self, statement: &Statement) -> Result<PlanNode> {
        match statement {
            Statement::Select(select) => self.plan_select(select),
            Statement::Insert {
                table,
                columns,
                values,
            } => self.plan_insert(table, columns, values),
            Statement::Update {
                table,
                sets,
                where_clause,
            } => self.plan_update(table, sets, where_clause.as_ref()),
            Statement::Delete {
                table,
                where_clause,
            } => self.plan_delete(table, where_clause.as_ref()),
            Statement::CreateTable { name, columns } => self.plan_create_table(name, columns),
            Statement::DropTable { name } => {
                ensure!(self.catalog.table_exists(name), "table '{}' not found", name);
                Ok(PlanNode::DropTable { name: name.clone() })
            }
            Statement::Explain(inner) => self.plan(inner),
            Statement::Begin | Statement::Commit | Statement::Rollback => {
                bail!("transaction control is handled by the session, not the planner")
            }
        }
    }

    fn plan_select(&self, select: &SelectStatement) -> Result<PlanNode> {
        let schema = self.catalog.schema(&select.from)?;
        let mut plan = PlanNode::Scan {
            table: select.from.clone(),
            schema: schema.clone(),
        };
        let mut current_schema = schema;

        if let Some(join) = &select.join {
            let right_schema = self.catalog.schema(&join.table)?;
            let joined = current_schema.joined(&right_schema);
            self.check_columns(&join.on, &joined)?;
            plan = PlanNode::Join {
                left: Box::new(plan),
                right: Box::new(PlanNode::Scan {
                    table: join.table.clone(),
                    schema: right_schema,
                }),
                on: join.on.clone(),
                schema: joined.clone(),
            };
            current_schema = joined;
        }

        if let Some(predicate) = &select.where_clause {
            self.check_columns(predicate, &current_schema)?;
            plan = PlanNode::Filter {
                predicate: predicate.clone(),
                child: Box::new(plan),
            };
        }

        let aggregates = collect_aggregates(&select.columns);
        let has_aggregation = !aggregates.is_empty() || !select.group_by.is_empty();
        if has_aggregation {
            ensure!(
                !aggregates.is_empty(),
                "GROUP BY without aggregate functions is not supported"
            );
            for item in &select.columns {
                match item {
                    SelectItem::Wildcard => {
                        bail!("'*' cannot be combined with aggregate functions")
                    }
                    SelectItem::Expr(Expr::Aggregate { .. }) => {}
                    SelectItem::Expr(Expr::Column { name, .. })
                        if select.group_by.contains(name) => {}
                    SelectItem::Expr(other) => {
                        bail!("{} must appear in GROUP BY or an aggregate", other)
                    }
                }
            }
            for column in &select.group_by {
                ensure!(
                    current_schema.column_index(column).is_some(),
                    "unknown column '{}' in GROUP BY",
                    column
                );
            }
            for aggregate in &aggregates {
                match &aggregate.column {
                    Some(column) => ensure!(
                        current_schema.column_index(column).is_some(),
                        "unknown column '{}' in {}",
                        column,
                        aggregate.label
                    ),
                    None => ensure!(
                        aggregate.func == AggregateFunc::Count,
                        "{} requires a column argument",
                        aggregate.label
                    ),
                }
            }

            let mut columns = Vec::new();
            for name in &select.group_by {
                let index = current_schema.column_index(name).unwrap();
                columns.push(current_schema.columns()[index].clone());
            }
            for aggregate in &aggregates {
                columns.push(Column::new(
                    aggregate.label.clone(),
                    aggregate_output_type(aggregate, &current_schema),
                    0,
                    true,
                ));
            }
            let agg_schema = Schema::new(select.from.clone(), columns);
            plan = PlanNode::Aggregate {
                group_by: select.group_by.clone(),
                aggregates,
                schema: agg_schema.clone(),
                child: Box::new(plan),
            };
            current_schema = agg_schema;
        }

        if !select.order_by.is_empty() {
            for order in &select.order_by {
                ensure!(
                    current_schema.column_index(&order.column).is_some(),
                    "unknown column '{}' in ORDER BY",
                    order.column
                );
            }
            plan = PlanNode::Sort {
                order_by: select.order_by.clone(),
                child: Box::new(plan),
            };
        }

        if !has_aggregation && !is_select_all(&select.columns) {
            let names = projection_names(&select.columns)?;
            let mut columns = Vec::new();
            for name in &names {
                let index = current_schema
                    .column_index(name)
                    .ok_or_else(|| eyre::eyre!("unknown column '{}' in SELECT list", name))?;
                columns.push(current_schema.columns()[index].clone());
            }
            let project_schema = Schema::new(select.from.clone(), columns);
            plan = PlanNode::Project {
                columns: names,
                schema: project_schema,
                child: Box::new(plan),
            };
        }

        if select.limit.is_some() || select.offset.is_some() {
            plan = PlanNode::Limit {
                limit: select.limit,
                offset: select.offset.unwrap_or(0),
                child: Box::new(plan),
            };
        }

        Ok(plan)
    }

    fn plan_insert(&self, table: &str, columns: &[String], values: &[Expr]) -> Result<PlanNode> {
        let schema = self.catalog.schema(table)?;
        if columns.is_empty() {
            ensure!(
                values.len() == schema.column_count(),
                "table '{}' has {} columns but {} values were supplied",
                table,
                schema.column_count(),
                values.len()
            );
        } else {
            ensure!(
                columns.len() == values.len(),
                "INSERT names {} columns but supplies {} values",
                columns.len(),
                values.len()
            );
            for column in columns {
                ensure!(
                    schema.column_index(column).is_some(),
                    "unknown column '{}' in INSERT",
                    column
                );
            }
        }
        for value in values {
            ensure!(
                matches!(value, Expr::Literal(_)),
                "INSERT values must be literals, found {}",
                value
            );
        }
        Ok(PlanNode::Insert {
            table: table.to_string(),
            columns: columns.to_vec(),
            values: values.to_vec(),
        })
    }

    fn plan_update(
        &self,
        table: &str,
        sets: &[(String, Expr)],
        where_clause: Option<&Expr>,
    ) -> Result<PlanNode> {
        let schema = self.catalog.schema(table)?;
        for (column, value) in sets {
            ensure!(
                schema.column_index(column).is_some(),
                "unknown column '{}' in UPDATE SET",
                column
            );
            self.check_columns(value, &schema)?;
        }
        let child = self.filtered_scan(table, &schema, where_clause)?;
        Ok(PlanNode::Update {
            table: table.to_string(),
            sets: sets.to_vec(),
            child: Box::new(child),
        })
    }

    fn plan_delete(&self, table: &str, where_clause: Option<&Expr>) -> Result<PlanNode> {
        let schema = self.catalog.schema(table)?;
        let child = self.filtered_scan(table, &schema, where_clause)?;
        Ok(PlanNode::Delete {
            table: table.to_string(),
            child: Box::new(child),
        })
    }

    fn filtered_scan(
        &self,
        table: &str,
        schema: &Schema,
        where_clause: Option<&Expr>,
    ) -> Result<PlanNode> {
        let scan = PlanNode::Scan {
            table: table.to_string(),
            schema: schema.clone(),
        };
        match where_clause {
            Some(predicate) => {
                self.check_columns(predicate, schema)?;
                Ok(PlanNode::Filter {
                    predicate: predicate.clone(),
                    child: Box::new(scan),
                })
            }
            None => Ok(scan),
        }
    }

    fn plan_create_table(&self, name: &str, columns: &[ColumnDef]) -> Result<PlanNode> {
        ensure!(
            !self.catalog.table_exists(name),
            "table '{}' already exists",
            name
        );
        ensure!(!columns.is_empty(), "table '{}' has no columns", name);

        let schema_columns: Vec<Column> = columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.data_type, c.size_hint, c.nullable))
            .collect();
        let primary_key = columns.iter().position(|c| c.primary_key);
        Ok(PlanNode::CreateTable {
            schema: Schema::new(name, schema_columns),
            primary_key,
        })
    }

    fn check_columns(&self, expr: &Expr, schema: &Schema) -> Result<()> {
        let mut columns = Vec::new();
        expr.referenced_columns(&mut columns);
        for column in columns {
            ensure!(
                schema.column_index(&column).is_some(),
                "unknown column '{}'",
                column
            );
        }
        Ok(())
    }
}

fn is_select_all(items: &[SelectItem]) -> bool {
    items.len() == 1 && matches!(items[0], SelectItem::Wildcard)
}

fn projection_names(items: &[SelectItem]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard => bail!("'*' cannot be mixed with named columns"),
            SelectItem::Expr(Expr::Column { name, .. }) => names.push(name.clone()),
            SelectItem::Expr(other) => bail!("unsupported SELECT expression {}", other),
        }
    }
    Ok(names)
}

fn collect_aggregates(items: &[SelectItem]) -> Vec<AggregateExpr> {
    let mut aggregates = Vec::new();
    for item in items {
        if let SelectItem::Expr(Expr::Aggregate { func, column }) = item {
            let label = match column {
                Some(column) => format!("{}({})", func, column),
                None => format!("{}(*)", func),
            };
            aggregates.push(AggregateExpr {
                func: *func,
                column: column.clone(),
                label,
            });
        }
    }
    aggregates
}

fn aggregate_output_type(aggregate: &AggregateExpr, schema: &Schema) -> DataType {
    match aggregate.func {
        AggregateFunc::Count => DataType::Int64,
        AggregateFunc::Avg => DataType::Float64,
        AggregateFunc::Sum | AggregateFunc::Max | AggregateFunc::Min => aggregate
            .column
            .as_ref()
            .and_then(|c| schema.column_index(c))
            .map(|i| schema.columns()[i].data_type())
            .unwrap_or(DataType::Int64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::Parser;
    use tempfile::tempdir;

    fn catalog_with_users(dir: &std::path::Path) -> Arc<Catalog> {
        let catalog = Arc::new(Catalog::open(dir).unwrap());
        catalog
            .create_table(Schema::new(
                "users",
                vec![
                    Column::new("id", DataType::Int32, 0, false),
                    Column::new("name", DataType::Text, 0, true),
                    Column::new("age", DataType::Int32, 0, true),
                ],
            ))
            .unwrap();
        catalog
    }

    fn plan(catalog: &Arc<Catalog>, sql: &str) -> Result<PlanNode> {
        let statement = Parser::new(sql)?.parse()?;
        Planner::new(Arc::clone(catalog)).plan(&statement)
    }

    #[test]
    fn select_star_plans_a_bare_scan() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        let node = plan(&catalog, "SELECT * FROM users").unwrap();
        assert!(matches!(node, PlanNode::Scan { .. }));
    }

    #[test]
    fn where_and_projection_stack_in_order() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        let node = plan(&catalog, "SELECT name FROM users WHERE id = 1").unwrap();
        assert_eq!(
            node.describe(),
            "Project(name)\n  Filter((id = 1))\n    Scan(users)\n"
        );
        assert_eq!(node.output_schema().unwrap().column_count(), 1);
    }

    #[test]
    fn unknown_table_fails_at_plan_time() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        assert!(plan(&catalog, "SELECT * FROM ghosts").is_err());
    }

    #[test]
    fn unknown_column_fails_at_plan_time() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        assert!(plan(&catalog, "SELECT * FROM users WHERE salary = 1").is_err());
        assert!(plan(&catalog, "SELECT salary FROM users").is_err());
        assert!(plan(&catalog, "SELECT COUNT(salary) FROM users").is_err());
    }

    #[test]
    fn aggregate_select_builds_an_aggregate_schema() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        let node = plan(&catalog, "SELECT COUNT(*), SUM(age) FROM users").unwrap();
        let schema = node.output_schema().unwrap();
        assert_eq!(schema.columns()[0].name(), "COUNT(*)");
        assert_eq!(schema.columns()[1].name(), "SUM(age)");
        assert_eq!(schema.columns()[0].data_type(), DataType::Int64);
    }

    #[test]
    fn group_by_keeps_group_columns_first() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        let node = plan(&catalog, "SELECT COUNT(*) FROM users GROUP BY name").unwrap();
        let schema = node.output_schema().unwrap();
        assert_eq!(schema.columns()[0].name(), "name");
        assert_eq!(schema.columns()[1].name(), "COUNT(*)");
    }

    #[test]
    fn insert_arity_is_checked() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        assert!(plan(&catalog, "INSERT INTO users VALUES (1, 'a')").is_err());
        assert!(plan(&catalog, "INSERT INTO users VALUES (1, 'a', 30)").is_ok());
        assert!(plan(&catalog, "INSERT INTO users (id, ghost) VALUES (1, 2)").is_err());
    }

    #[test]
    fn update_and_delete_plan_with_filters() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        let update = plan(&catalog, "UPDATE users SET age = 31 WHERE name = 'bob'").unwrap();
        assert!(matches!(update, PlanNode::Update { .. }));
        let delete = plan(&catalog, "DELETE FROM users").unwrap();
        match delete {
            PlanNode::Delete { child, .. } => assert!(matches!(*child, PlanNode::Scan { .. })),
            other => panic!("expected Delete, got {:?}", other),
        }
    }

    #[test]
    fn create_table_records_the_primary_key_column() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        let node = plan(
            &catalog,
            "CREATE TABLE orders (id INT PRIMARY KEY, total DOUBLE)",
        )
        .unwrap();
        match node {
            PlanNode::CreateTable {
                schema,
                primary_key,
            } => {
                assert_eq!(schema.table_name(), "orders");
                assert_eq!(primary_key, Some(0));
            }
            other => panic!("expected CreateTable, got {:?}", other),
        }
    }

    #[test]
    fn join_produces_a_merged_schema() {
        let dir = tempdir().unwrap();
        let catalog = catalog_with_users(dir.path());
        catalog
            .create_table(Schema::new(
                "orders",
                vec![
                    Column::new("user_id", DataType::Int32, 0, false),
                    Column::new("total", DataType::Int64, 0, true),
                ],
            ))
            .unwrap();
        let node = plan(
            &catalog,
            "SELECT * FROM users JOIN orders ON id = user_id",
        )
        .unwrap();
        assert_eq!(node.output_schema().unwrap().column_count(), 5);
    }
}
