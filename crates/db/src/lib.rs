pub mod batch;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod queries;
pub mod records;

use std::sync::Arc;

pub use batch::{BatchPolicy, BatchStore};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage handle passed to everything that reads or writes records.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn BatchStore>,
    policy: BatchPolicy,
}

impl Database {
    pub fn new(store: Arc<dyn BatchStore>, policy: BatchPolicy) -> Self {
        Self { store, policy }
    }

    /// Process-local store with the default policy.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), BatchPolicy::default())
    }

    pub fn store(&self) -> &dyn BatchStore {
        self.store.as_ref()
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }
}
