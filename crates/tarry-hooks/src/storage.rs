use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tarry_core::{Signal, remember_with_key};

use crate::error::StorageError;

/// String key-value store, the shape of a browser's local storage.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process [`Storage`]; clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    map: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.map.borrow_mut().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.map.borrow_mut().remove(key);
    }
}

/// State mirrored as JSON under one storage key.
pub struct StoredState<T: 'static> {
    key: String,
    storage: Rc<dyn Storage>,
    value: Signal<T>,
}

impl<T: 'static> Clone for StoredState<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            storage: self.storage.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: Serialize + DeserializeOwned + Clone + 'static> StoredState<T> {
    /// Reads `key` from `storage`, falling back to `init` when it is missing
    /// or does not decode.
    pub fn load(storage: Rc<dyn Storage>, key: impl Into<String>, init: impl FnOnce() -> T) -> Self {
        let key = key.into();
        let value = match storage.get(&key) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(err) => {
                    log::warn!("stored value under '{key}' does not decode ({err}); using initial");
                    init()
                }
            },
            None => init(),
        };
        Self {
            key,
            storage,
            value: Signal::new(value),
        }
    }

    pub fn get(&self) -> T {
        self.value.get()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes through to storage; the in-memory value is left alone when
    /// encoding fails.
    pub fn set(&self, value: T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&value).map_err(|source| StorageError::Encode {
            key: self.key.clone(),
            source,
        })?;
        self.storage.set(&self.key, raw);
        self.value.set(value);
        Ok(())
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<(), StorageError> {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Forgets the stored copy and goes back to `init`.
    pub fn reset(&self, init: T) {
        self.storage.remove(&self.key);
        self.value.set(init);
    }

    pub fn subscribe(&self, f: impl Fn(&T) + 'static) {
        self.value.subscribe(f);
    }
}

/// Remembered [`StoredState`], shared by every call with the same `key`.
pub fn use_stored_state<T: Serialize + DeserializeOwned + Clone + 'static>(
    storage: Rc<dyn Storage>,
    key: impl Into<String>,
    init: impl FnOnce() -> T,
) -> StoredState<T> {
    let key = key.into();
    let state = remember_with_key(format!("stored:{key}"), || {
        StoredState::load(storage, key.clone(), init)
    });
    (*state).clone()
}
