//! # CLI
//!
//! Interactive front door: a rustyline REPL dispatching dot commands and
//! SQL, plus the table formatter the REPL prints result sets with.

mod repl;
mod table;

pub use repl::Repl;
pub use table::format_rows;
