//! Process-local [`BatchStore`]. Nothing survives a restart; useful for
//! development runs (`ACCORD_STORE=memory`) and tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::batch::{BatchStore, GetOutput, Record, RecordKey, WriteRequest};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<BTreeMap<RecordKey, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }

    pub async fn get(&self, key: &RecordKey) -> Option<serde_json::Value> {
        self.table.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn batch_write(
        &self,
        requests: Vec<WriteRequest>,
    ) -> Result<Vec<WriteRequest>, StoreError> {
        let mut table = self.table.lock().await;
        for request in requests {
            match request {
                WriteRequest::Put(record) => {
                    table.insert(record.key, record.value);
                }
                WriteRequest::Delete(key) => {
                    table.remove(&key);
                }
            }
        }
        Ok(Vec::new())
    }

    async fn batch_get(&self, keys: Vec<RecordKey>) -> Result<GetOutput, StoreError> {
        let table = self.table.lock().await;
        let records = keys
            .into_iter()
            .filter_map(|key| {
                let value = table.get(&key)?.clone();
                Some(Record { key, value })
            })
            .collect();
        Ok(GetOutput {
            records,
            unprocessed: Vec::new(),
        })
    }

    async fn scan(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .table
            .lock()
            .await
            .iter()
            .map(|(key, value)| Record {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_overwrites_and_delete_removes() {
        let store = MemoryStore::new();
        let key = RecordKey::new("1", "guild");

        store
            .batch_write(vec![WriteRequest::Put(Record {
                key: key.clone(),
                value: json!({ "admins": [] }),
            })])
            .await
            .unwrap();
        store
            .batch_write(vec![WriteRequest::Put(Record {
                key: key.clone(),
                value: json!({ "admins": [5] }),
            })])
            .await
            .unwrap();
        assert_eq!(store.get(&key).await, Some(json!({ "admins": [5] })));
        assert_eq!(store.len().await, 1);

        store
            .batch_write(vec![WriteRequest::Delete(key.clone())])
            .await
            .unwrap();
        assert!(store.is_empty().await);

        // deleting again is a no-op
        let unprocessed = store
            .batch_write(vec![WriteRequest::Delete(key)])
            .await
            .unwrap();
        assert!(unprocessed.is_empty());
    }

    #[tokio::test]
    async fn test_get_skips_missing_keys() {
        let store = MemoryStore::new();
        store
            .batch_write(vec![WriteRequest::Put(Record {
                key: RecordKey::new("1", "a"),
                value: json!(1),
            })])
            .await
            .unwrap();

        let output = store
            .batch_get(vec![RecordKey::new("1", "a"), RecordKey::new("1", "b")])
            .await
            .unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].value, json!(1));
        assert!(output.unprocessed.is_empty());
    }
}
