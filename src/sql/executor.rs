//! # Executor
//!
//! Materializing evaluator over the plan tree. Relational nodes produce
//! `(Schema, Vec<Row>)`; DML nodes mutate the heap through the catalog
//! and write their before/after images to the WAL under the caller's
//! transaction id. The log record for a change is appended before the
//! heap is touched.
//!
//! NULL semantics follow SQL: a predicate that evaluates to NULL filters
//! the row out, aggregates skip NULL inputs, and NULLs sort first.

use crate::records::Row;
use crate::schema::{Catalog, Schema};
use crate::sql::ast::{AggregateFunc, BinaryOp, Expr, OrderBy};
use crate::sql::plan::{AggregateExpr, PlanNode};
use crate::types::{DataType, Value};
use crate::wal::Wal;
use eyre::{bail, ensure, Result};
use hashbrown::HashMap;
use std::cmp::Ordering;
use std::sync::Arc;

/// What a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    Rows { schema: Schema, rows: Vec<Row> },
    Message(String),
    Plan(String),
}

impl ExecuteResult {
    pub fn row_count(&self) -> usize {
        match self {
            ExecuteResult::Rows { rows, .. } => rows.len(),
            _ => 0,
        }
    }
}

pub struct Executor {
    catalog: Arc<Catalog>,
    wal: Arc<Wal>,
}

impl Executor {
    pub fn new(catalog: Arc<Catalog>, wal: Arc<Wal>) -> Self {
        Self { catalog, wal }
    }

    /// Executes a plan. DML nodes log under `txn_id`, which must be a
    /// live transaction (the session layer guarantees one, starting an
    /// implicit transaction for bare statements).
    pub fn execute(&self, plan: &PlanNode, txn_id: u64) -> Result<ExecuteResult> {
        match plan {
            PlanNode::Insert {
                table,
                columns,
                values,
            } => self.execute_insert(table, columns, values, txn_id),
            PlanNode::Update { table, sets, child } => {
                self.execute_update(table, sets, child, txn_id)
            }
            PlanNode::Delete { table, child } => self.execute_delete(table, child, txn_id),
            PlanNode::CreateTable { schema, .. } => {
                self.catalog.create_table(schema.clone())?;
                Ok(ExecuteResult::Message(format!(
                    "table created: {}",
                    schema.table_name()
                )))
            }
            PlanNode::DropTable { name } => {
                self.catalog.drop_table(name)?;
                Ok(ExecuteResult::Message(format!("table dropped: {}", name)))
            }
            relational => {
                let (schema, rows) = self.execute_rows(relational)?;
                Ok(ExecuteResult::Rows { schema, rows })
            }
        }
    }

    fn execute_rows(&self, plan: &PlanNode) -> Result<(Schema, Vec<Row>)> {
        match plan {
            PlanNode::Scan { table, schema } => {
                let table = self.catalog.table(table)?;
                let rows = table.lock().scan()?;
                Ok((schema.clone(), rows))
            }
            PlanNode::Filter { predicate, child } => {
                let (schema, rows) = self.execute_rows(child)?;
                let mut kept = Vec::new();
                for row in rows {
                    if is_truthy(&evaluate(predicate, &row, &schema)?) {
                        kept.push(row);
                    }
                }
                Ok((schema, kept))
            }
            PlanNode::Project {
                columns,
                schema,
                child,
            } => {
                let (child_schema, rows) = self.execute_rows(child)?;
                let mut indices = Vec::with_capacity(columns.len());
                for column in columns {
                    let index = child_schema
                        .column_index(column)
                        .ok_or_else(|| eyre::eyre!("unknown column '{}'", column))?;
                    indices.push(index);
                }
                let projected = rows
                    .into_iter()
                    .map(|row| {
                        let values = indices.iter().map(|&i| row.values()[i].clone()).collect();
                        Row::with_id(row.row_id(), values)
                    })
                    .collect();
                Ok((schema.clone(), projected))
            }
            PlanNode::Join {
                left,
                right,
                on,
                schema,
            } => {
                let (_, left_rows) = self.execute_rows(left)?;
                let (_, right_rows) = self.execute_rows(right)?;
                let mut joined = Vec::new();
                for left_row in &left_rows {
                    for right_row in &right_rows {
                        let mut values =
                            Vec::with_capacity(left_row.values().len() + right_row.values().len());
                        values.extend(left_row.values().iter().cloned());
                        values.extend(right_row.values().iter().cloned());
                        let merged = Row::with_id(left_row.row_id(), values);
                        if is_truthy(&evaluate(on, &merged, schema)?) {
                            joined.push(merged);
                        }
                    }
                }
                Ok((schema.clone(), joined))
            }
            PlanNode::Aggregate {
                group_by,
                aggregates,
                schema,
                child,
            } => {
                let (child_schema, rows) = self.execute_rows(child)?;
                let output =
                    aggregate_rows(group_by, aggregates, schema, &child_schema, &rows)?;
                Ok((schema.clone(), output))
            }
            PlanNode::Sort { order_by, child } => {
                let (schema, mut rows) = self.execute_rows(child)?;
                sort_rows(&mut rows, order_by, &schema)?;
                Ok((schema, rows))
            }
            PlanNode::Limit {
                limit,
                offset,
                child,
            } => {
                let (schema, rows) = self.execute_rows(child)?;
                let rows = rows
                    .into_iter()
                    .skip(*offset as usize)
                    .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
                    .collect();
                Ok((schema, rows))
            }
            PlanNode::Empty { schema } => Ok((schema.clone(), Vec::new())),
            PlanNode::Insert { .. }
            | PlanNode::Update { .. }
            | PlanNode::Delete { .. }
            | PlanNode::CreateTable { .. }
            | PlanNode::DropTable { .. } => {
                bail!("plan node {:?} does not produce rows", plan)
            }
        }
    }

    fn execute_insert(
        &self,
        table_name: &str,
        columns: &[String],
        values: &[Expr],
        txn_id: u64,
    ) -> Result<ExecuteResult> {
        ensure!(txn_id != 0, "INSERT requires a transaction");
        let schema = self.catalog.schema(table_name)?;

        let mut row_values = vec![Value::Null; schema.column_count()];
        if columns.is_empty() {
            for (i, expr) in values.iter().enumerate() {
                row_values[i] = evaluate_standalone(expr)?;
            }
        } else {
            for (column, expr) in columns.iter().zip(values) {
                let index = schema
                    .column_index(column)
                    .ok_or_else(|| eyre::eyre!("unknown column '{}'", column))?;
                row_values[index] = evaluate_standalone(expr)?;
            }
        }

        for (value, column) in row_values.iter_mut().zip(schema.columns()) {
            *value = coerce_value(std::mem::replace(value, Value::Null), column.data_type())?;
            ensure!(
                !value.is_null() || column.nullable(),
                "column '{}' is not nullable",
                column.name()
            );
        }

        let table = self.catalog.table(table_name)?;
        let mut guard = table.lock();
        let mut row = Row::new(row_values);
        row.set_row_id(guard.next_row_id());
        self.wal
            .log_insert(txn_id, table_name, row.row_id() as u64, row.encode());
        guard.insert(&mut row)?;

        Ok(ExecuteResult::Message(format!(
            "1 row inserted into {}",
            table_name
        )))
    }

    fn execute_update(
        &self,
        table_name: &str,
        sets: &[(String, Expr)],
        child: &PlanNode,
        txn_id: u64,
    ) -> Result<ExecuteResult> {
        ensure!(txn_id != 0, "UPDATE requires a transaction");
        let schema = self.catalog.schema(table_name)?;
        let (_, matched) = self.execute_rows(child)?;

        let table = self.catalog.table(table_name)?;
        let mut updated = 0usize;
        for old_row in matched {
            let mut new_values = old_row.values().to_vec();
            for (column, expr) in sets {
                let index = schema
                    .column_index(column)
                    .ok_or_else(|| eyre::eyre!("unknown column '{}'", column))?;
                let value = evaluate(expr, &old_row, &schema)?;
                let column_def = &schema.columns()[index];
                let value = coerce_value(value, column_def.data_type())?;
                ensure!(
                    !value.is_null() || column_def.nullable(),
                    "column '{}' is not nullable",
                    column_def.name()
                );
                new_values[index] = value;
            }
            let new_row = Row::with_id(old_row.row_id(), new_values);

            self.wal.log_update(
                txn_id,
                table_name,
                old_row.row_id() as u64,
                old_row.encode(),
                new_row.encode(),
            );
            table.lock().update(old_row.row_id(), &new_row)?;
            updated += 1;
        }

        Ok(ExecuteResult::Message(format!(
            "{} row(s) updated in {}",
            updated, table_name
        )))
    }

    fn execute_delete(
        &self,
        table_name: &str,
        child: &PlanNode,
        txn_id: u64,
    ) -> Result<ExecuteResult> {
        ensure!(txn_id != 0, "DELETE requires a transaction");
        let (_, matched) = self.execute_rows(child)?;

        let table = self.catalog.table(table_name)?;
        let mut deleted = 0usize;
        for row in matched {
            self.wal
                .log_delete(txn_id, table_name, row.row_id() as u64, row.encode());
            table.lock().delete(row.row_id())?;
            deleted += 1;
        }

        Ok(ExecuteResult::Message(format!(
            "{} row(s) deleted from {}",
            deleted, table_name
        )))
    }
}

/// Evaluates an expression against one row.
pub fn evaluate(expr: &Expr, row: &Row, schema: &Schema) -> Result<Value> {
    match expr {
        Expr::Column { name, .. } => {
            let index = schema
                .column_index(name)
                .ok_or_else(|| eyre::eyre!("unknown column '{}'", name))?;
            Ok(row.values()[index].clone())
        }
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Binary { left, op, right } => {
            let left = evaluate(left, row, schema)?;
            let right = evaluate(right, row, schema)?;
            evaluate_binary(&left, *op, &right)
        }
        Expr::Not(inner) => match evaluate(inner, row, schema)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Null),
            other => bail!("NOT requires a boolean, got {}", other),
        },
        Expr::Aggregate { .. } => bail!("aggregate used outside an aggregation"),
    }
}

/// Evaluates an expression with no row context (INSERT values).
fn evaluate_standalone(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        other => bail!("expected a literal value, found {}", other),
    }
}

fn evaluate_binary(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
                BinaryOp::And => *a && *b,
                _ => *a || *b,
            })),
            _ => bail!("{} requires boolean operands", op),
        },
        comparison => match left.compare(right) {
            Some(ordering) => Ok(Value::Bool(match comparison {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Neq => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
            })),
            None if left.is_null() || right.is_null() => Ok(Value::Null),
            None => bail!("cannot compare {} with {}", left, right),
        },
    }
}

fn is_truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

/// Widens a literal to the column's declared type; exact matches and
/// NULL pass through.
pub fn coerce_value(value: Value, target: DataType) -> Result<Value> {
    let coerced = match (&value, target) {
        (Value::Null, _) => Value::Null,
        (Value::Int32(v), DataType::Int32) => Value::Int32(*v),
        (Value::Int32(v), DataType::Int64) => Value::Int64(i64::from(*v)),
        (Value::Int32(v), DataType::Float32) => Value::Float32(*v as f32),
        (Value::Int32(v), DataType::Float64) => Value::Float64(f64::from(*v)),
        (Value::Int64(v), DataType::Int32) => {
            let narrowed = i32::try_from(*v)
                .map_err(|_| eyre::eyre!("value {} out of range for INT", v))?;
            Value::Int32(narrowed)
        }
        (Value::Int64(v), DataType::Int64) => Value::Int64(*v),
        (Value::Int64(v), DataType::Float32) => Value::Float32(*v as f32),
        (Value::Int64(v), DataType::Float64) => Value::Float64(*v as f64),
        (Value::Float32(v), DataType::Float32) => Value::Float32(*v),
        (Value::Float32(v), DataType::Float64) => Value::Float64(f64::from(*v)),
        (Value::Float64(v), DataType::Float32) => Value::Float32(*v as f32),
        (Value::Float64(v), DataType::Float64) => Value::Float64(*v),
        (Value::Text(s), DataType::Text) => Value::Text(s.clone()),
        (Value::Bool(b), DataType::Bool) => Value::Bool(*b),
        (other, target) => bail!("cannot store {} in a {} column", other, target),
    };
    Ok(coerced)
}

/// Total order used by ORDER BY and grouping: NULLs first, then the
/// value order.
fn order_values(a: &Value, b: &Value) -> Ordering {
    match a.compare(b) {
        Some(ordering) => ordering,
        None => match (a.is_null(), b.is_null()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        },
    }
}

fn sort_rows(rows: &mut [Row], order_by: &[OrderBy], schema: &Schema) -> Result<()> {
    let mut keys = Vec::with_capacity(order_by.len());
    for order in order_by {
        let index = schema
            .column_index(&order.column)
            .ok_or_else(|| eyre::eyre!("unknown column '{}' in ORDER BY", order.column))?;
        keys.push((index, order.ascending));
    }

    rows.sort_by(|a, b| {
        for &(index, ascending) in &keys {
            let ordering = order_values(&a.values()[index], &b.values()[index]);
            let ordering = if ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn aggregate_rows(
    group_by: &[String],
    aggregates: &[AggregateExpr],
    output_schema: &Schema,
    child_schema: &Schema,
    rows: &[Row],
) -> Result<Vec<Row>> {
    let mut group_indices = Vec::with_capacity(group_by.len());
    for column in group_by {
        let index = child_schema
            .column_index(column)
            .ok_or_else(|| eyre::eyre!("unknown column '{}' in GROUP BY", column))?;
        group_indices.push(index);
    }

    // Group rows by the encoded group key, keeping first-seen order.
    let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
    let mut group_lookup: HashMap<Vec<u8>, usize> = HashMap::new();
    for row in rows {
        let key_values: Vec<Value> = group_indices
            .iter()
            .map(|&i| row.values()[i].clone())
            .collect();
        let mut key_bytes = Vec::new();
        for value in &key_values {
            if value.is_null() {
                key_bytes.push(0);
            } else {
                key_bytes.push(1);
                value.encode_into(&mut key_bytes);
            }
        }
        match group_lookup.get(&key_bytes) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                group_lookup.insert(key_bytes, groups.len());
                groups.push((key_values, vec![row]));
            }
        }
    }

    // No GROUP BY: one group over all rows, even when there are none.
    if group_by.is_empty() && groups.is_empty() {
        groups.push((Vec::new(), Vec::new()));
    }

    let mut output = Vec::with_capacity(groups.len());
    for (key_values, group_rows) in groups {
        let mut values = key_values;
        for aggregate in aggregates {
            values.push(compute_aggregate(aggregate, &group_rows, child_schema)?);
        }
        ensure!(
            values.len() == output_schema.column_count(),
            "aggregate output arity mismatch"
        );
        output.push(Row::new(values));
    }
    Ok(output)
}

fn compute_aggregate(
    aggregate: &AggregateExpr,
    rows: &[&Row],
    schema: &Schema,
) -> Result<Value> {
    let column_index = match &aggregate.column {
        Some(column) => Some(
            schema
                .column_index(column)
                .ok_or_else(|| eyre::eyre!("unknown column '{}' in {}", column, aggregate.label))?,
        ),
        None => None,
    };

    // Non-null inputs, in row order.
    let inputs: Vec<&Value> = match column_index {
        Some(index) => rows
            .iter()
            .map(|row| &row.values()[index])
            .filter(|v| !v.is_null())
            .collect(),
        None => Vec::new(),
    };

    match aggregate.func {
        AggregateFunc::Count => match column_index {
            Some(_) => Ok(Value::Int64(inputs.len() as i64)),
            None => Ok(Value::Int64(rows.len() as i64)),
        },
        AggregateFunc::Sum => {
            if inputs.is_empty() {
                return Ok(Value::Null);
            }
            numeric_sum(&inputs, &aggregate.label)
        }
        AggregateFunc::Avg => {
            if inputs.is_empty() {
                return Ok(Value::Null);
            }
            let sum = match numeric_sum(&inputs, &aggregate.label)? {
                Value::Int64(v) => v as f64,
                Value::Float64(v) => v,
                other => bail!("{} produced a non-numeric sum {}", aggregate.label, other),
            };
            Ok(Value::Float64(sum / inputs.len() as f64))
        }
        AggregateFunc::Max => Ok(inputs
            .iter()
            .max_by(|a, b| order_values(a, b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null)),
        AggregateFunc::Min => Ok(inputs
            .iter()
            .min_by(|a, b| order_values(a, b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null)),
    }
}

/// Integer sum while every input is an integer, switching to float when
/// any input is.
fn numeric_sum(inputs: &[&Value], label: &str) -> Result<Value> {
    let mut int_sum = 0i64;
    let mut float_sum = 0f64;
    let mut any_float = false;
    for value in inputs {
        match value {
            Value::Int32(v) => {
                int_sum += i64::from(*v);
                float_sum += f64::from(*v);
            }
            Value::Int64(v) => {
                int_sum += v;
                float_sum += *v as f64;
            }
            Value::Float32(v) => {
                any_float = true;
                float_sum += f64::from(*v);
            }
            Value::Float64(v) => {
                any_float = true;
                float_sum += v;
            }
            other => bail!("{} cannot aggregate non-numeric value {}", label, other),
        }
    }
    if any_float {
        Ok(Value::Float64(float_sum))
    } else {
        Ok(Value::Int64(int_sum))
    }
}
