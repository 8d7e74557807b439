use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::Config,
    error::{Error, Result},
    ids::StoreId,
    memory_db::{MemoryDb, Snapshot},
    model::FileStore,
};

const OWNERS: TableDefinition<&str, &str> = TableDefinition::new("owners");
const FILES: TableDefinition<&str, &str> = TableDefinition::new("files");
const STORES: TableDefinition<&str, &str> = TableDefinition::new("stores");
const STORE_CONTENT: TableDefinition<&str, &[u8]> =
    TableDefinition::new("store_content");
const STORE_TAGS: TableDefinition<u64, &str> =
    TableDefinition::new("store_tags");
const FILE_TAGS: TableDefinition<u64, &str> =
    TableDefinition::new("file_tags");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Store metadata. The bytes live in their own table.
#[derive(Serialize, Deserialize)]
struct StoreMeta {
    id: StoreId,
    file_size: u64,
    content_type: String,
}

/// Durable copy of a [`MemoryDb`] plus the settings table.
pub struct SnapshotDb {
    db: Database,
}

impl SnapshotDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(OWNERS)?;
        txn.open_table(FILES)?;
        txn.open_table(STORES)?;
        txn.open_table(STORE_CONTENT)?;
        txn.open_table(STORE_TAGS)?;
        txn.open_table(FILE_TAGS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Replace the stored records with every committed record of `vault`,
    /// in one write transaction. Settings are left alone.
    pub fn save(&self, vault: &MemoryDb) -> Result<()> {
        let snapshot = vault.export();
        let txn = self.db.begin_write()?;
        txn.delete_table(OWNERS)?;
        txn.delete_table(FILES)?;
        txn.delete_table(STORES)?;
        txn.delete_table(STORE_CONTENT)?;
        txn.delete_table(STORE_TAGS)?;
        txn.delete_table(FILE_TAGS)?;
        {
            let mut table = txn.open_table(OWNERS)?;
            for owner in &snapshot.owners {
                let json = serde_json::to_string(owner)?;
                table.insert(owner.id().to_string().as_str(), json.as_str())?;
            }
        }
        {
            let mut table = txn.open_table(FILES)?;
            for file in &snapshot.files {
                let json = serde_json::to_string(file)?;
                table.insert(file.id()?.to_string().as_str(), json.as_str())?;
            }
        }
        {
            let mut meta = txn.open_table(STORES)?;
            let mut content = txn.open_table(STORE_CONTENT)?;
            for store in &snapshot.stores {
                let key = store.id.to_string();
                let json = serde_json::to_string(&StoreMeta {
                    id: store.id.clone(),
                    file_size: store.file_size,
                    content_type: store.content_type.clone(),
                })?;
                meta.insert(key.as_str(), json.as_str())?;
                content.insert(key.as_str(), store.content.as_slice())?;
            }
        }
        {
            let mut table = txn.open_table(STORE_TAGS)?;
            for (seq, tag) in snapshot.store_tags.iter().enumerate() {
                let json = serde_json::to_string(tag)?;
                table.insert(seq as u64, json.as_str())?;
            }
        }
        {
            let mut table = txn.open_table(FILE_TAGS)?;
            for (seq, tag) in snapshot.file_tags.iter().enumerate() {
                let json = serde_json::to_string(tag)?;
                table.insert(seq as u64, json.as_str())?;
            }
        }
        txn.commit()?;

        info!(
            owners = snapshot.owners.len(),
            files = snapshot.files.len(),
            stores = snapshot.stores.len(),
            "saved snapshot"
        );
        Ok(())
    }

    /// Every record, as written by the last [`save`](Self::save).
    pub fn read_snapshot(&self) -> Result<Snapshot> {
        let txn = self.db.begin_read()?;
        let mut snapshot = Snapshot::default();

        let table = txn.open_table(OWNERS)?;
        for entry in table.iter()? {
            let (_k, v) = entry?;
            snapshot.owners.push(serde_json::from_str(v.value())?);
        }

        let table = txn.open_table(FILES)?;
        for entry in table.iter()? {
            let (_k, v) = entry?;
            snapshot.files.push(serde_json::from_str(v.value())?);
        }

        let meta = txn.open_table(STORES)?;
        let content = txn.open_table(STORE_CONTENT)?;
        for entry in meta.iter()? {
            let (k, v) = entry?;
            let StoreMeta {
                id,
                file_size,
                content_type,
            } = serde_json::from_str(v.value())?;
            let bytes = content
                .get(k.value())?
                .map(|b| b.value().to_vec())
                .ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "store {id} has no content"
                    ))
                })?;
            snapshot.stores.push(FileStore {
                id,
                content: bytes,
                file_size,
                content_type,
            });
        }

        let table = txn.open_table(STORE_TAGS)?;
        for entry in table.iter()? {
            let (_k, v) = entry?;
            snapshot.store_tags.push(serde_json::from_str(v.value())?);
        }

        let table = txn.open_table(FILE_TAGS)?;
        for entry in table.iter()? {
            let (_k, v) = entry?;
            snapshot.file_tags.push(serde_json::from_str(v.value())?);
        }

        Ok(snapshot)
    }

    /// Rebuild a live database, configured from the settings table.
    pub fn load(&self) -> Result<MemoryDb> {
        let config = Config::load(self)?;
        MemoryDb::import(self.read_snapshot()?, config)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }
}

impl std::fmt::Debug for SnapshotDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotDb").finish_non_exhaustive()
    }
}
