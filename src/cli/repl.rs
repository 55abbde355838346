//! # REPL
//!
//! Read-eval-print loop over a [`Database`]. Dot commands run
//! immediately; SQL accumulates until a terminating `;` (multi-line
//! statements switch the prompt to a continuation marker). Errors are
//! printed and the loop continues; `.exit`, `.quit` or Ctrl-D leave.

use crate::cli::table::format_rows;
use crate::database::Database;
use crate::sql::ExecuteResult;
use eyre::{Result, WrapErr};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const PRIMARY_PROMPT: &str = "tarndb> ";
const CONTINUATION_PROMPT: &str = "    -> ";
const HISTORY_FILE: &str = ".tarndb_history";

pub struct Repl {
    db: Database,
    editor: DefaultEditor,
    sql_buffer: String,
}

impl Repl {
    pub fn new(db: Database) -> Result<Self> {
        let mut editor = DefaultEditor::new().wrap_err("failed to initialize line editor")?;
        let _ = editor.load_history(&history_path());
        Ok(Self {
            db,
            editor,
            sql_buffer: String::new(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        println!("tarndb {}", env!("CARGO_PKG_VERSION"));
        println!("Type \".help\" for usage hints, \".exit\" to quit.");

        loop {
            let prompt = if self.sql_buffer.is_empty() {
                PRIMARY_PROMPT
            } else {
                CONTINUATION_PROMPT
            };

            match self.editor.readline(prompt) {
                Ok(line) => {
                    if !self.handle_line(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    self.sql_buffer.clear();
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("Bye");
                    break;
                }
                Err(err) => {
                    eprintln!("Error reading input: {}", err);
                    break;
                }
            }
        }

        let _ = self.editor.save_history(&history_path());
        self.db.close()
    }

    /// Returns false when the REPL should exit.
    fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return true;
        }

        if self.sql_buffer.is_empty() && trimmed.starts_with('.') {
            let _ = self.editor.add_history_entry(trimmed);
            return self.run_command(trimmed);
        }

        if !self.sql_buffer.is_empty() {
            self.sql_buffer.push(' ');
        }
        self.sql_buffer.push_str(trimmed);

        if self.sql_buffer.ends_with(';') {
            let sql = std::mem::take(&mut self.sql_buffer);
            let _ = self.editor.add_history_entry(&sql);
            self.run_sql(&sql);
        }
        true
    }

    fn run_command(&mut self, command: &str) -> bool {
        match command {
            ".exit" | ".quit" => {
                println!("Bye");
                false
            }
            ".help" => {
                println!("Commands:");
                println!("  .help            Show this help");
                println!("  .tables          List tables");
                println!("  .schema <table>  Show a table's columns");
                println!("  .exit, .quit     Exit");
                println!("SQL statements end with ';'. Supported:");
                println!("  CREATE TABLE / DROP TABLE / INSERT / SELECT / UPDATE / DELETE");
                println!("  BEGIN / COMMIT / ROLLBACK / EXPLAIN <stmt>");
                true
            }
            ".tables" => {
                for name in self.db.catalog().table_names() {
                    println!("{}", name);
                }
                true
            }
            command if command.starts_with(".schema") => {
                let name = command.trim_start_matches(".schema").trim();
                if name.is_empty() {
                    eprintln!("usage: .schema <table>");
                    return true;
                }
                match self.db.catalog().schema(name) {
                    Ok(schema) => {
                        for column in schema.columns() {
                            println!(
                                "{} {}{}",
                                column.name(),
                                column.data_type(),
                                if column.nullable() { "" } else { " NOT NULL" }
                            );
                        }
                    }
                    Err(e) => eprintln!("Error: {}", e),
                }
                true
            }
            other => {
                eprintln!("unknown command: {} (try .help)", other);
                true
            }
        }
    }

    fn run_sql(&mut self, sql: &str) {
        match self.db.execute(sql) {
            Ok(ExecuteResult::Rows { schema, rows }) => {
                print!("{}", format_rows(&schema, &rows));
            }
            Ok(ExecuteResult::Message(message)) => println!("{}", message),
            Ok(ExecuteResult::Plan(plan)) => print!("{}", plan),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
}

fn history_path() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(HISTORY_FILE)
}
