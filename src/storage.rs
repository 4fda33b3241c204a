// Key/value storage backends for persisted state

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const CURRENT_VERSION: u32 = 1;

/// Synchronous string key/value storage
///
/// Modelled on a browser's `localStorage`: reads and writes are synchronous and
/// writes may fail (quota, I/O). Callers decide what a failure means.
pub trait Storage {
    /// Read the value stored under `key`, `None` if absent
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing an absent key succeeds
    fn remove_item(&self, key: &str) -> Result<()>;
}

// ============================================================================
// In-memory
// ============================================================================

/// In-process storage, optionally limited to a byte quota
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose total size (keys + values, in bytes) may not exceed `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    /// Raw stored value, bypassing the trait's error type
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    fn used_without(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            let needed = self.used_without(key) + key.len() + value.len();
            if needed > quota {
                return Err(eyre!("Storage quota exceeded: {} bytes needed, {} allowed", needed, quota));
            }
        }

        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

// ============================================================================
// JSON files
// ============================================================================

/// One file per key inside a `.todostore` directory
#[derive(Debug)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open or create file storage at the given path
    ///
    /// Files live in a `.todostore` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(".todostore");

        fs::create_dir_all(&base_path).context("Failed to create storage directory")?;

        let storage = Self { base_path };
        storage.write_version()?;

        Ok(storage)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Data file for `key`; keys are 1-64 ASCII letters, digits, `_` or `-`
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let allowed = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'-';
        if key.is_empty() || key.len() > 64 || !key.bytes().all(allowed) {
            return Err(eyre!(
                "Invalid storage key {:?}: expected 1-64 ASCII letters, digits, '_' or '-'",
                key
            ));
        }
        Ok(self.base_path.join(format!("{}.json", key)))
    }

    /// Hold the writer lock for `key` until the returned file is dropped
    fn lock_key(&self, key: &str) -> Result<File> {
        let lock_path = self.base_path.join(format!("{}.lock", key));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .context("Failed to open lock file")?;
        file.lock_exclusive().context("Failed to acquire file lock")?;
        Ok(file)
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;

        // Writers replace the file by rename, so a read sees either the old or the new value
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read storage file"),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");
        let _lock = self.lock_key(key)?;

        let mut tmp = File::create(&tmp_path).context("Failed to create temporary storage file")?;
        tmp.write_all(value.as_bytes())
            .context("Failed to write temporary storage file")?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &path).context("Failed to replace storage file")?;

        debug!(key, bytes = value.len(), "set_item: wrote storage file");
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let _lock = self.lock_key(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove storage file"),
        }
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// Key/value table in a SQLite database
pub struct SqliteStorage {
    db: Connection,
}

impl SqliteStorage {
    /// Open or create a SQLite database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating storage schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { db })
    }
}

impl Storage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row("SELECT value FROM storage WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO storage (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.db.execute("DELETE FROM storage WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(storage: &dyn Storage) {
        assert_eq!(storage.get_item("todo-app-v1").unwrap(), None);

        storage.set_item("todo-app-v1", r#"{"items":[]}"#).unwrap();
        assert_eq!(
            storage.get_item("todo-app-v1").unwrap().as_deref(),
            Some(r#"{"items":[]}"#)
        );

        // Shorter value must fully replace the longer one
        storage.set_item("todo-app-v1", "{}").unwrap();
        assert_eq!(storage.get_item("todo-app-v1").unwrap().as_deref(), Some("{}"));

        storage.remove_item("todo-app-v1").unwrap();
        assert_eq!(storage.get_item("todo-app-v1").unwrap(), None);

        // Removing again is fine
        storage.remove_item("todo-app-v1").unwrap();
    }

    #[test]
    fn test_memory_storage() {
        exercise(&MemoryStorage::new());
    }

    #[test]
    fn test_memory_storage_quota() {
        let storage = MemoryStorage::with_quota(16);
        storage.set_item("k", "small").unwrap();
        assert!(storage.set_item("k", "this value is far too large").is_err());
        // Failed write leaves the old value in place
        assert_eq!(storage.raw("k").as_deref(), Some("small"));
    }

    #[test]
    fn test_file_storage() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        exercise(&storage);
    }

    #[test]
    fn test_file_storage_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();

        let base = temp.path().join(".todostore");
        assert!(base.exists());
        assert!(base.join(".version").exists());
        assert_eq!(storage.base_path(), base.as_path());
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        FileStorage::open(temp.path())
            .unwrap()
            .set_item("todo-app-v1", "hello")
            .unwrap();

        let reopened = FileStorage::open(temp.path()).unwrap();
        assert_eq!(reopened.get_item("todo-app-v1").unwrap().as_deref(), Some("hello"));
        assert!(temp.path().join(".todostore/todo-app-v1.json").exists());
    }

    #[test]
    fn test_file_storage_rejects_invalid_keys() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();

        assert!(storage.set_item("../escape", "x").is_err());
        assert!(storage.set_item("", "x").is_err());
        assert!(storage.get_item(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_file_storage_key_rules() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();

        assert!(storage.path_for("todo-app-v1").is_ok());
        assert!(storage.path_for("todo_app").is_ok());
        assert!(storage.path_for(&"a".repeat(64)).is_ok());

        assert!(storage.path_for("todo/app").is_err());
        assert!(storage.path_for("todo.app").is_err());
        assert!(storage.path_for("todo app").is_err());
        assert!(storage.path_for("").is_err());
        // Non-ASCII letters are alphanumeric but not portable file names
        assert!(storage.path_for("tâche").is_err());
        assert!(storage.path_for("やること").is_err());
    }

    #[test]
    fn test_file_storage_failed_write_keeps_previous_value() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        storage.set_item("todo-app-v1", "saved").unwrap();

        // A directory where the temporary file should go makes the write fail
        let tmp_path = temp.path().join(".todostore/todo-app-v1.json.tmp");
        fs::create_dir(&tmp_path).unwrap();

        assert!(storage.set_item("todo-app-v1", "replacement").is_err());
        assert_eq!(storage.get_item("todo-app-v1").unwrap().as_deref(), Some("saved"));
    }

    #[test]
    fn test_file_storage_leaves_no_temporary_file() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        storage.set_item("todo-app-v1", "one").unwrap();
        storage.set_item("todo-app-v1", "two").unwrap();

        assert!(!temp.path().join(".todostore/todo-app-v1.json.tmp").exists());
        assert_eq!(storage.get_item("todo-app-v1").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_sqlite_storage() {
        let temp = TempDir::new().unwrap();
        exercise(&SqliteStorage::open(temp.path().join("todostore.db")).unwrap());
    }

    #[test]
    fn test_sqlite_storage_persists_across_connections() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("todostore.db");

        SqliteStorage::open(&db_path)
            .unwrap()
            .set_item("todo-app-v1", "hello")
            .unwrap();

        let reopened = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(reopened.get_item("todo-app-v1").unwrap().as_deref(), Some("hello"));
    }
}
