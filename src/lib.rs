// TodoStore - Persistent task list with pluggable storage and change notification

pub mod listeners;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod task;
pub mod view;

// Re-export main types for convenience
pub use listeners::{Listeners, Subscription};
pub use snapshot::State;
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
pub use store::{STORAGE_KEY, Store};
pub use task::Task;
