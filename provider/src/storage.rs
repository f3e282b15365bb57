use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use wallet_core::error::WalletError;

/// Pluggable key-value storage for the store's persisted projection.
///
/// Values are opaque JSON strings; the store decides what is safe to
/// persist (signing material never is).
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, WalletError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), WalletError>;
    fn remove_item(&self, key: &str) -> Result<(), WalletError>;
}

/// Process-lifetime storage. The default for tests and for hosts that do
/// not want cross-session persistence.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, WalletError> {
        Ok(self.items.lock().expect("storage lock").get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), WalletError> {
        self.items
            .lock()
            .expect("storage lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), WalletError> {
        self.items.lock().expect("storage lock").remove(key);
        Ok(())
    }
}

/// Durable storage backed by a single JSON file of key-value pairs.
pub struct JsonFileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles on the backing file.
    lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, WalletError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                WalletError::internal(format!("corrupt storage file: {e}"))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(WalletError::internal(format!(
                "failed to read storage file: {err}"
            ))),
        }
    }

    fn write_all(&self, items: &HashMap<String, String>) -> Result<(), WalletError> {
        let contents = serde_json::to_string(items)
            .map_err(|e| WalletError::internal(format!("failed to serialize storage: {e}")))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| WalletError::internal(format!("failed to write storage file: {e}")))
    }
}

impl Storage for JsonFileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, WalletError> {
        let _guard = self.lock.lock().expect("storage lock");
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("storage lock");
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("storage lock");
        let mut items = self.read_all()?;
        items.remove(key);
        self.write_all(&items)
    }
}
