use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    backend::StoreBackend,
    error::{Error, Result},
    ids::StoreId,
    memory_db::{Shared, Slot},
    model::FileStore,
};

/// Content stores over the in-memory backend.
pub struct StoreRegistry {
    shared: Arc<Shared>,
}

impl StoreRegistry {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl StoreBackend for StoreRegistry {
    fn match_hash(&self, hash: &str) -> Result<Vec<FileStore>> {
        let records = self.shared.records.read();
        Ok(records
            .stores
            .values()
            .filter_map(Slot::committed)
            .filter(|s| s.id.hash() == hash)
            .cloned()
            .collect())
    }

    fn reserve(&self, candidate: StoreId) -> Result<StoreId> {
        let mut records = self.shared.records.write();
        let mut id = candidate;
        while records.stores.contains_key(&id.to_string()) {
            id = id.mutate();
        }
        records.stores.insert(id.to_string(), Slot::Reserved);
        debug!(store = %id, "reserved store id");
        Ok(id)
    }

    fn insert(&self, store: &FileStore) -> Result<StoreId> {
        let key = store.id.to_string();
        let mut records = self.shared.records.write();

        // Two writers may have hashed the same bytes concurrently; the
        // second to commit folds onto the first.
        let existing = records
            .stores
            .values()
            .filter_map(Slot::committed)
            .find(|s| {
                s.id.hash() == store.id.hash() && s.content == store.content
            })
            .map(|s| s.id.clone());
        if let Some(existing) = existing {
            if records.stores.get(&key) == Some(&Slot::Reserved) {
                records.stores.remove(&key);
            }
            debug!(store = %existing, released = %key, "deduplicated store");
            return Ok(existing);
        }

        match records.stores.get_mut(&key) {
            Some(slot @ Slot::Reserved) => {
                *slot = Slot::Committed(store.clone());
                info!(store = %key, size = store.file_size, "committed store");
                Ok(store.id.clone())
            }
            Some(Slot::Committed(_)) => Err(Error::InvariantViolation(
                format!("store {key} is already committed"),
            )),
            None => Err(Error::IdNotReserved(key)),
        }
    }

    fn get(&self, id: &StoreId) -> Result<FileStore> {
        let records = self.shared.records.read();
        records
            .stores
            .get(&id.to_string())
            .and_then(Slot::committed)
            .cloned()
            .ok_or_else(|| Error::not_found("store", id))
    }
}
