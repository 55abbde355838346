//! # Catalog
//!
//! Name → table registry for one data directory. Each table persists as
//! `<data_dir>/<name>.db`; the registry itself is in-memory and rebuilt by
//! whoever creates tables (the SQL layer, or recovery replaying a WAL).
//!
//! A reader/writer lock guards the registry: create/drop take the writer
//! lock, lookups the reader lock. Each table sits behind its own mutex so
//! page access is serialized per table, not across tables.

use crate::config::TABLE_FILE_EXT;
use crate::schema::Schema;
use crate::storage::{HeapTable, Pager};
use eyre::{ensure, Result, WrapErr};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct CatalogEntry {
    schema: Schema,
    table: Arc<Mutex<HeapTable>>,
}

pub struct Catalog {
    data_dir: PathBuf,
    entries: RwLock<HashMap<String, CatalogEntry>>,
}

impl Catalog {
    /// Opens a catalog rooted at `data_dir`, creating the directory when
    /// absent.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .wrap_err_with(|| format!("failed to create data directory {:?}", data_dir))?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", name, TABLE_FILE_EXT))
    }

    /// Creates the table file and registers the schema under its name.
    pub fn create_table(&self, schema: Schema) -> Result<()> {
        let name = schema.table_name().to_string();
        let mut entries = self.entries.write();
        ensure!(
            !entries.contains_key(&name),
            "table '{}' already exists",
            name
        );

        let pager = Pager::open(&self.table_path(&name))?;
        let table = HeapTable::open(name.clone(), schema.clone(), pager)?;
        entries.insert(
            name,
            CatalogEntry {
                schema,
                table: Arc::new(Mutex::new(table)),
            },
        );
        Ok(())
    }

    /// Closes the table and removes its file.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .remove(name)
            .ok_or_else(|| eyre::eyre!("table '{}' not found", name))?;
        drop(entry);

        fs::remove_file(self.table_path(name))
            .wrap_err_with(|| format!("failed to remove table file for '{}'", name))
    }

    pub fn table(&self, name: &str) -> Result<Arc<Mutex<HeapTable>>> {
        let entries = self.entries.read();
        entries
            .get(name)
            .map(|e| Arc::clone(&e.table))
            .ok_or_else(|| eyre::eyre!("table '{}' not found", name))
    }

    pub fn schema(&self, name: &str) -> Result<Schema> {
        let entries = self.entries.read();
        entries
            .get(name)
            .map(|e| e.schema.clone())
            .ok_or_else(|| eyre::eyre!("table '{}' not found", name))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered table names, sorted for stable listings.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Syncs every table file to disk.
    pub fn sync_all(&self) -> Result<()> {
        let entries = self.entries.read();
        for entry in entries.values() {
            entry.table.lock().sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Row;
    use crate::schema::Column;
    use crate::types::{DataType, Value};
    use tempfile::tempdir;

    fn users_schema() -> Schema {
        Schema::new(
            "users",
            vec![
                Column::new("id", DataType::Int32, 0, false),
                Column::new("name", DataType::Text, 255, true),
            ],
        )
    }

    #[test]
    fn create_registers_and_backs_with_a_file() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        catalog.create_table(users_schema()).unwrap();

        assert!(catalog.table_exists("users"));
        assert_eq!(catalog.table_names(), ["users"]);
        assert_eq!(catalog.schema("users").unwrap(), users_schema());

        let table = catalog.table("users").unwrap();
        let mut row = Row::new(vec![Value::Int32(1), Value::Text("alice".into())]);
        table.lock().insert(&mut row).unwrap();
        assert!(dir.path().join("users.db").exists());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        catalog.create_table(users_schema()).unwrap();
        assert!(catalog.create_table(users_schema()).is_err());
    }

    #[test]
    fn drop_removes_registration_and_file() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        catalog.create_table(users_schema()).unwrap();
        catalog.drop_table("users").unwrap();

        assert!(!catalog.table_exists("users"));
        assert!(!dir.path().join("users.db").exists());
        assert!(catalog.table("users").is_err());
    }

    #[test]
    fn unknown_table_lookup_fails() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path()).unwrap();
        assert!(catalog.table("ghost").is_err());
        assert!(catalog.schema("ghost").is_err());
        assert!(catalog.drop_table("ghost").is_err());
    }
}
