//! # Type System
//!
//! Runtime values and their column types. A [`Value`] is the unit the row
//! codec, the expression evaluator and the result formatter all agree on;
//! a [`DataType`] is what the catalog records per column and what the row
//! codec consults when decoding.

mod data_type;
mod value;

pub use data_type::DataType;
pub use value::Value;
