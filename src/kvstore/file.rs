//! File-backed KV store.
//!
//! The file is a TOML document whose top-level tables are kinds and whose
//! nested tables are names, so `[servers.server1]` is the key `servers/server1`.
//! A missing or empty file is an empty store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use toml::{Table, Value};

use crate::kvstore::{KvError, KvStore};

#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Table, KvError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Table::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Table::new());
        }
        Ok(toml::from_str::<Table>(&content)?)
    }

    fn write_document(&self, document: &Table) -> Result<(), KvError> {
        let encoded = toml::to_string_pretty(document)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Split `kind/name` into its parts.
fn split_key(key: &str) -> Result<(&str, &str), KvError> {
    match key.split_once('/') {
        Some((kind, name)) if !kind.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((kind, name))
        }
        _ => Err(KvError::InvalidKey(key.to_string())),
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        let (kind, name) = split_key(key)?;
        let document = self.read_document()?;
        Ok(document
            .get(kind)
            .and_then(Value::as_table)
            .and_then(|t| t.get(name))
            .cloned())
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, KvError> {
        let document = self.read_document()?;
        let mut entries = Vec::new();
        for (kind, names) in &document {
            let Some(names) = names.as_table() else {
                continue;
            };
            for (name, value) in names {
                let key = format!("{}/{}", kind, name);
                if key.starts_with(prefix) {
                    entries.push((key, value.clone()));
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn put(&self, key: &str, value: Value) -> Result<(), KvError> {
        let (kind, name) = split_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut document = self.read_document()?;
        let kind_table = document
            .entry(kind.to_string())
            .or_insert(Value::Table(Table::new()));
        match kind_table {
            Value::Table(names) => {
                names.insert(name.to_string(), value);
            }
            other => {
                let mut names = Table::new();
                names.insert(name.to_string(), value);
                *other = Value::Table(names);
            }
        }
        self.write_document(&document)
    }

    fn delete(&self, key: &str) -> Result<bool, KvError> {
        let (kind, name) = split_key(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut document = self.read_document()?;
        let removed = document
            .get_mut(kind)
            .and_then(Value::as_table_mut)
            .and_then(|names| names.remove(name))
            .is_some();
        if removed {
            self.write_document(&document)?;
        }
        Ok(removed)
    }

    fn backing_file(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_value(port: i64) -> Value {
        let mut table = Table::new();
        table.insert("address".into(), Value::String("127.0.0.1".into()));
        table.insert("port".into(), Value::Integer(port));
        Value::Table(table)
    }

    #[test]
    fn test_empty_file_is_empty_store() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = FileKvStore::new(file.path());

        assert!(store.list("").unwrap().is_empty());
        assert!(store.get("servers/s1").unwrap().is_none());
    }

    #[test]
    fn test_put_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("gateway.toml"));

        store.put("servers/s2", server_value(9002)).unwrap();
        store.put("servers/s1", server_value(9001)).unwrap();
        store.put("backends/b1", Value::Table(Table::new())).unwrap();

        let s1 = store.get("servers/s1").unwrap().unwrap();
        assert_eq!(s1.get("port").and_then(Value::as_integer), Some(9001));

        let keys: Vec<String> = store
            .list("servers/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["servers/s1", "servers/s2"]);

        assert!(store.delete("servers/s1").unwrap());
        assert!(!store.delete("servers/s1").unwrap());
        assert_eq!(store.list("servers/").unwrap().len(), 1);
    }

    #[test]
    fn test_file_layout_uses_nested_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        let store = FileKvStore::new(&path);

        store.put("servers/s1", server_value(9001)).unwrap();

        let document: Table = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let port = document
            .get("servers")
            .and_then(|v| v.get("s1"))
            .and_then(|v| v.get("port"))
            .and_then(Value::as_integer);
        assert_eq!(port, Some(9001));
    }

    #[test]
    fn test_invalid_keys() {
        let store = FileKvStore::new("/nonexistent/gateway.toml");
        assert!(matches!(store.get("servers"), Err(KvError::InvalidKey(_))));
        assert!(matches!(store.get("/s1"), Err(KvError::InvalidKey(_))));
        assert!(matches!(store.get("a/b/c"), Err(KvError::InvalidKey(_))));
    }
}
