use std::{collections::hash_map::Entry, sync::Arc};

use tracing::debug;

use crate::{
    backend::FileBackend,
    error::{Error, Result},
    ids::{FileId, OwnerId},
    memory_db::{Shared, Slot},
    model::File,
};

/// File records over the in-memory backend.
pub struct FileRegistry {
    shared: Arc<Shared>,
}

impl FileRegistry {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl FileBackend for FileRegistry {
    fn reserve(&self, candidate: FileId) -> Result<FileId> {
        let mut records = self.shared.records.write();
        let mut id = candidate;
        while records.files.contains_key(&id.to_string()) {
            id = id.mutate();
        }
        records.files.insert(id.to_string(), Slot::Reserved);
        debug!(file = %id, "reserved file id");
        Ok(id)
    }

    fn insert(&self, file: &File) -> Result<()> {
        let key = file.id()?.to_string();
        let mut records = self.shared.records.write();
        match records.files.entry(key) {
            Entry::Occupied(mut e) if *e.get() == Slot::Reserved => {
                debug!(file = %e.key(), owner = %file.owner, "committed file");
                e.insert(Slot::Committed(file.clone()));
                Ok(())
            }
            Entry::Occupied(e) => Err(Error::InvariantViolation(format!(
                "file {} is already committed",
                e.key()
            ))),
            Entry::Vacant(e) => Err(Error::IdNotReserved(e.into_key())),
        }
    }

    fn get(&self, id: &FileId) -> Result<File> {
        let records = self.shared.records.read();
        records
            .files
            .get(&id.to_string())
            .and_then(Slot::committed)
            .cloned()
            .ok_or_else(|| Error::not_found("file", id))
    }

    fn update(&self, file: &File) -> Result<()> {
        let key = file.id()?.to_string();
        let mut records = self.shared.records.write();
        match records.files.get_mut(&key) {
            Some(slot @ Slot::Committed(_)) => {
                *slot = Slot::Committed(file.clone());
                Ok(())
            }
            _ => Err(Error::not_found("file", key)),
        }
    }

    fn get_owned(&self, owner: &OwnerId) -> Result<Vec<File>> {
        let records = self.shared.records.read();
        Ok(records
            .committed_files()
            .filter(|f| f.owner == *owner)
            .cloned()
            .collect())
    }

    fn get_perm_key(&self, owner: &OwnerId, key: &str) -> Result<Vec<File>> {
        let records = self.shared.records.read();
        Ok(records
            .committed_files()
            .filter(|f| f.is_granted(key, owner))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::Backend,
        ids::{OwnerKind, StoreId},
        memory_db::MemoryDb,
    };

    fn owner(n: u64) -> OwnerId {
        OwnerId::from_parts(OwnerKind::User, n)
    }

    fn store() -> StoreId {
        StoreId::for_content(b"content")
    }

    fn committed(db: &MemoryDb, owner: OwnerId, name: &str) -> File {
        let files = db.files();
        let id = files.reserve(FileId::new(store())).unwrap();
        let mut file = File::new(owner, name);
        file.id = Some(id);
        files.insert(&file).unwrap();
        file
    }

    #[test]
    fn reserve_steps_past_taken_ids() {
        let db = MemoryDb::default();
        let files = db.files();
        let candidate = FileId::from_parts(store(), 7);
        let first = files.reserve(candidate.clone()).unwrap();
        let second = files.reserve(candidate.clone()).unwrap();
        assert_eq!(first, candidate);
        assert_ne!(second, first);
        assert_eq!(second.store(), candidate.store());
    }

    #[test]
    fn insert_requires_reservation() {
        let db = MemoryDb::default();
        let mut file = File::new(owner(1), "a.txt");
        file.id = Some(FileId::from_parts(store(), 1));
        assert!(matches!(
            db.files().insert(&file),
            Err(Error::IdNotReserved(_))
        ));
    }

    #[test]
    fn insert_twice_is_rejected() {
        let db = MemoryDb::default();
        let file = committed(&db, owner(1), "a.txt");
        assert!(db.files().insert(&file).is_err());
    }

    #[test]
    fn reserved_file_is_not_readable() {
        let db = MemoryDb::default();
        let id = db.files().reserve(FileId::new(store())).unwrap();
        assert!(matches!(
            db.files().get(&id),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn update_persists_sharing() {
        let db = MemoryDb::default();
        let mut file = committed(&db, owner(1), "a.txt");
        file.share("view", owner(2));
        db.files().update(&file).unwrap();

        let shared = db.files().get_perm_key(&owner(2), "view").unwrap();
        assert_eq!(shared, vec![file.clone()]);
        assert!(db.files().get_perm_key(&owner(2), "edit").unwrap().is_empty());
        assert!(db.files().get_perm_key(&owner(1), "view").unwrap().is_empty());
    }

    #[test]
    fn update_of_unknown_file_fails() {
        let db = MemoryDb::default();
        let mut file = File::new(owner(1), "a.txt");
        file.id = Some(FileId::from_parts(store(), 9));
        assert!(db.files().update(&file).is_err());
    }

    #[test]
    fn get_owned_filters_by_owner() {
        let db = MemoryDb::default();
        committed(&db, owner(1), "a.txt");
        committed(&db, owner(1), "b.txt");
        committed(&db, owner(2), "c.txt");
        db.files().reserve(FileId::new(store())).unwrap();

        let mut names: Vec<String> = db
            .files()
            .get_owned(&owner(1))
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
