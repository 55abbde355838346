//! # tarndb - Pedagogical Relational Database Engine
//!
//! tarndb is a small relational engine built to be read: every layer of
//! a real database, at a size one person can hold in their head.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │          CLI (rustyline REPL)        │
//! ├─────────────────────────────────────┤
//! │      Database facade / session       │
//! ├─────────────────────────────────────┤
//! │ SQL: lexer → parser → planner →      │
//! │      optimizer → executor            │
//! ├───────────────────┬─────────────────┤
//! │ Catalog & schemas │ Txn + Recovery  │
//! ├───────────────────┼─────────────────┤
//! │ Heap tables over  │  Record WAL     │
//! │ slotted pages     │  (LSN, images)  │
//! ├───────────────────┴─────────────────┤
//! │  B+Tree │ MVCC+HLC │ 2PC │ Sharding │
//! │         │          │     │ + Raft   │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Data layout
//!
//! ```text
//! data_dir/
//! ├── users.db    # one heap file per table, 4096-byte slotted pages
//! ├── orders.db
//! └── wal.log     # length-framed log records with CRC-64 trailers
//! ```
//!
//! ## Module overview
//!
//! - [`storage`]: slotted pages, the pager, heap tables
//! - [`types`] / [`records`]: values, schemas-as-contract row codec
//! - [`schema`]: schemas and the in-memory catalog
//! - [`btree`]: arena-allocated order-4 B+Tree index
//! - [`wal`]: record WAL with framing, checksums and replay
//! - [`txn`]: transaction manager and ARIES-style recovery
//! - [`distributed`]: hybrid logical clock, MVCC store, two-phase commit
//! - [`sharding`]: range manager, router, rebalancer
//! - [`raft`]: in-process consensus core
//! - [`sql`]: the SQL frontend
//! - [`cli`]: interactive shell

pub mod btree;
pub mod cli;
pub mod config;
pub mod database;
pub mod distributed;
pub mod raft;
pub mod records;
pub mod schema;
pub mod sharding;
pub mod sql;
pub mod storage;
pub mod txn;
pub mod types;
pub mod wal;

pub use database::Database;
pub use sql::ExecuteResult;
pub use types::Value;
