//! # SQL Frontend
//!
//! Lexer → parser → planner → optimizer → executor. The frontend owns no
//! state of its own: the planner and executor resolve everything through
//! the catalog, and DML durability flows through the WAL handle the
//! executor is built with.

pub mod ast;
pub mod executor;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod plan;
pub mod planner;

pub use ast::Statement;
pub use executor::{ExecuteResult, Executor};
pub use lexer::{Keyword, Lexer, Token};
pub use optimizer::Optimizer;
pub use parser::Parser;
pub use plan::PlanNode;
pub use planner::Planner;
