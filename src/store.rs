// Task list store: validation, persistence and change notification

use crate::listeners::{Listeners, Subscription};
use crate::snapshot::{self, State};
use crate::storage::Storage;
use crate::task::Task;
use eyre::{Result, eyre};
use std::cell::RefCell;
use tracing::{debug, warn};

/// Storage key for the persisted collection; the suffix is the document version
pub const STORAGE_KEY: &str = "todo-app-v1";

/// Single source of truth for the task collection
///
/// Every operation takes `&self` and no internal borrow is held while
/// listeners run, so a listener may read (or mutate) the store it observes.
/// The store is single-threaded (`!Send`).
pub struct Store<S: Storage> {
    storage: S,
    key: String,
    items: RefCell<Vec<Task>>,
    listeners: Listeners,
}

impl<S: Storage> Store<S> {
    /// Create an empty store persisting under [`STORAGE_KEY`]
    ///
    /// Call [`Store::load`] to restore previously persisted tasks.
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, STORAGE_KEY)
    }

    /// Create an empty store persisting under a custom key
    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            items: RefCell::new(Vec::new()),
            listeners: Listeners::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Replace in-memory state with whatever can be restored from storage
    ///
    /// Missing, unreadable or malformed data yields an empty collection, and an
    /// unusable document is removed from storage; malformed items are dropped
    /// individually. Listeners are not notified.
    pub fn load(&self) -> State {
        let items = match self.storage.get_item(&self.key) {
            Ok(Some(raw)) => match snapshot::decode(&raw) {
                Some(items) => items,
                None => {
                    self.discard_persisted();
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = ?e, "Failed to read persisted state, starting empty");
                Vec::new()
            }
        };

        debug!(key = %self.key, count = items.len(), "load: restored tasks");
        *self.items.borrow_mut() = items.clone();

        State { items }
    }

    /// All tasks ordered by creation time, oldest first
    ///
    /// Ties keep insertion order. Timestamps that do not parse sort first.
    pub fn get_items(&self) -> Vec<Task> {
        let mut keyed: Vec<_> = self
            .items
            .borrow()
            .iter()
            .map(|task| (task.created_at_parsed(), task.clone()))
            .collect();

        // sort_by is stable
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, task)| task).collect()
    }

    /// Number of tasks not yet completed
    pub fn active_count(&self) -> usize {
        self.items.borrow().iter().filter(|t| !t.completed).count()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Find the one task whose id equals `prefix` or starts with it
    pub fn resolve_id(&self, prefix: &str) -> Result<String> {
        let items = self.items.borrow();
        if let Some(task) = items.iter().find(|t| t.id == prefix) {
            return Ok(task.id.clone());
        }

        let matches: Vec<&str> = items
            .iter()
            .map(|t| t.id.as_str())
            .filter(|id| !prefix.is_empty() && id.starts_with(prefix))
            .collect();

        match matches.as_slice() {
            [id] => Ok(id.to_string()),
            [] => Err(eyre!("No task with id {}", prefix)),
            _ => Err(eyre!("Ambiguous id prefix {} matches {} tasks", prefix, matches.len())),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a task; returns `None` when the trimmed title is empty
    pub fn add_item(&self, title: &str) -> Option<Task> {
        let title = title.trim();
        if title.is_empty() {
            debug!("add_item: empty title, not added");
            return None;
        }

        let task = Task::new(title.to_string());
        debug!(id = %task.id, "add_item: adding task");
        self.items.borrow_mut().push(task.clone());

        self.commit();
        Some(task)
    }

    /// Flip the completed flag of task `id`; returns false if there is no such task
    pub fn toggle_item(&self, id: &str) -> bool {
        let toggled = {
            let mut items = self.items.borrow_mut();
            match items.iter_mut().find(|t| t.id == id) {
                Some(task) => {
                    task.completed = !task.completed;
                    debug!(id, completed = task.completed, "toggle_item: toggled task");
                    true
                }
                None => false,
            }
        };

        if toggled {
            self.commit();
        } else {
            debug!(id, "toggle_item: no such task");
        }
        toggled
    }

    /// Remove task `id`; returns false if there is no such task
    pub fn remove_item(&self, id: &str) -> bool {
        let removed = {
            let mut items = self.items.borrow_mut();
            let before = items.len();
            items.retain(|t| t.id != id);
            items.len() != before
        };

        if removed {
            debug!(id, "remove_item: removed task");
            self.commit();
        } else {
            debug!(id, "remove_item: no such task");
        }
        removed
    }

    /// Register a callback fired after every committed mutation
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        self.listeners.subscribe(listener)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn commit(&self) {
        self.persist();
        self.listeners.notify();
    }

    /// Drop an unreadable document so the next write starts from a clean key
    fn discard_persisted(&self) {
        if let Err(e) = self.storage.remove_item(&self.key) {
            warn!(key = %self.key, error = ?e, "Failed to remove malformed persisted state");
        }
    }

    /// Write the whole collection to storage; failures are logged and ignored
    fn persist(&self) {
        let encoded = snapshot::encode(&self.items.borrow());
        let result = encoded.and_then(|raw| self.storage.set_item(&self.key, &raw));

        if let Err(e) = result {
            warn!(key = %self.key, error = ?e, "Failed to persist tasks, continuing in memory");
        }
    }
}
