//! # tarndb CLI Entry Point
//!
//! ```bash
//! # Open (or create) a database in ./data
//! tarndb
//!
//! # Open a specific data directory
//! tarndb /var/lib/tarndb
//! ```
//!
//! Exit code 0 on a clean exit, 1 on a fatal startup failure (for
//! example an unwritable data directory or a recovery error).

use eyre::{bail, Result};
use std::env;
use std::path::PathBuf;
use tarndb::cli::Repl;
use tarndb::Database;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut data_dir = PathBuf::from("data");

    let args: Vec<String> = env::args().skip(1).collect();
    let mut positional = Vec::new();
    for arg in &args {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("tarndb {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other if other.starts_with('-') => bail!("unknown option: {}", other),
            path => positional.push(path),
        }
    }
    match positional.as_slice() {
        [] => {}
        [path] => data_dir = PathBuf::from(*path),
        _ => bail!("expected at most one data directory argument"),
    }

    let db = Database::open(&data_dir)?;
    Repl::new(db)?.run()
}

fn print_usage() {
    println!("Usage: tarndb [DATA_DIR]");
    println!();
    println!("Options:");
    println!("  -h, --help     Show this help");
    println!("  -v, --version  Show the version");
    println!();
    println!("DATA_DIR defaults to ./data and is created when absent.");
}
