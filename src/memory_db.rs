use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{
    backend::Backend,
    config::Config,
    error::{Error, Result},
    file_registry::FileRegistry,
    ids::{OwnerId, OwnerKind},
    model::{File, FileStore, Owner},
    owner_registry::OwnerRegistry,
    store_registry::StoreRegistry,
    tag::{FileTag, StoreTag},
    tag_index::TagIndex,
};

/// State of an id or name claim. A missing map entry is a free slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot<T> {
    Reserved,
    Committed(T),
}

impl<T> Slot<T> {
    pub(crate) fn committed(&self) -> Option<&T> {
        match self {
            Self::Committed(v) => Some(v),
            Self::Reserved => None,
        }
    }
}

/// Claim on an owner name, remembering which id holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NameSlot {
    Reserved(OwnerId),
    Committed(OwnerId),
}

/// Owners, files and stores. Guarded together by one lock since space
/// accounting reads all three.
#[derive(Debug, Default)]
pub(crate) struct Records {
    pub(crate) owners: HashMap<String, Slot<Owner>>,
    pub(crate) user_names: HashMap<String, NameSlot>,
    pub(crate) group_names: HashMap<String, NameSlot>,
    pub(crate) files: HashMap<String, Slot<File>>,
    pub(crate) stores: HashMap<String, Slot<FileStore>>,
}

impl Records {
    pub(crate) fn names(&self, kind: OwnerKind) -> &HashMap<String, NameSlot> {
        match kind {
            OwnerKind::User => &self.user_names,
            OwnerKind::Group => &self.group_names,
        }
    }

    pub(crate) fn names_mut(
        &mut self,
        kind: OwnerKind,
    ) -> &mut HashMap<String, NameSlot> {
        match kind {
            OwnerKind::User => &mut self.user_names,
            OwnerKind::Group => &mut self.group_names,
        }
    }

    pub(crate) fn committed_files(&self) -> impl Iterator<Item = &File> {
        self.files.values().filter_map(Slot::committed)
    }
}

/// Store-scoped tags keyed by store id then word; file-scoped tags keyed by
/// file id, owner id, then word.
#[derive(Debug, Default)]
pub(crate) struct TagMaps {
    pub(crate) stores: HashMap<String, HashMap<String, StoreTag>>,
    pub(crate) files:
        HashMap<String, HashMap<String, HashMap<String, FileTag>>>,
}

pub(crate) struct Shared {
    pub(crate) records: RwLock<Records>,
    pub(crate) tags: RwLock<TagMaps>,
    pub(crate) config: Config,
}

/// In-memory backend. Cloning is cheap and every clone sees the same data.
#[derive(Clone)]
pub struct MemoryDb {
    shared: Arc<Shared>,
}

/// Every committed record of a [`MemoryDb`], detached from its locks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub owners: Vec<Owner>,
    pub files: Vec<File>,
    pub stores: Vec<FileStore>,
    pub store_tags: Vec<StoreTag>,
    pub file_tags: Vec<FileTag>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl MemoryDb {
    pub fn new(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                records: RwLock::new(Records::default()),
                tags: RwLock::new(TagMaps::default()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Copy out every committed record. Pending reservations are left out.
    pub fn export(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        {
            let records = self.shared.records.read();
            snapshot.owners = records
                .owners
                .values()
                .filter_map(Slot::committed)
                .cloned()
                .collect();
            snapshot.files = records.committed_files().cloned().collect();
            snapshot.stores = records
                .stores
                .values()
                .filter_map(Slot::committed)
                .cloned()
                .collect();
        }
        let tags = self.shared.tags.read();
        snapshot.store_tags = tags
            .stores
            .values()
            .flat_map(|words| words.values().cloned())
            .collect();
        snapshot.file_tags = tags
            .files
            .values()
            .flat_map(|owners| owners.values())
            .flat_map(|words| words.values().cloned())
            .collect();
        snapshot
    }

    /// Rebuild a database from a snapshot.
    ///
    /// Fails on owners whose id kind disagrees with their value and on
    /// duplicate names within a namespace.
    pub fn import(snapshot: Snapshot, config: Config) -> Result<Self> {
        let db = Self::new(config);
        {
            let mut records = db.shared.records.write();
            for owner in snapshot.owners {
                owner.check_kind()?;
                let id = owner.id();
                let names = records.names_mut(owner.kind());
                if names.contains_key(owner.name()) {
                    return Err(Error::NameTaken(owner.name().to_string()));
                }
                names
                    .insert(owner.name().to_string(), NameSlot::Committed(id));
                records
                    .owners
                    .insert(id.to_string(), Slot::Committed(owner));
            }
            for file in snapshot.files {
                let key = file.id()?.to_string();
                records.files.insert(key, Slot::Committed(file));
            }
            for store in snapshot.stores {
                records
                    .stores
                    .insert(store.id.to_string(), Slot::Committed(store));
            }
        }
        {
            let mut tags = db.shared.tags.write();
            for st in snapshot.store_tags {
                tags.stores
                    .entry(st.store.to_string())
                    .or_default()
                    .insert(st.tag.word.clone(), st);
            }
            for ft in snapshot.file_tags {
                tags.files
                    .entry(ft.file.to_string())
                    .or_default()
                    .entry(ft.owner.to_string())
                    .or_default()
                    .insert(ft.tag.word.clone(), ft);
            }
        }
        Ok(db)
    }

    /// Counts of committed records, for status reporting.
    pub fn stats(&self) -> BTreeMap<&'static str, usize> {
        let records = self.shared.records.read();
        let tags = self.shared.tags.read();
        BTreeMap::from([
            (
                "owners",
                records.owners.values().filter_map(Slot::committed).count(),
            ),
            ("files", records.committed_files().count()),
            (
                "stores",
                records.stores.values().filter_map(Slot::committed).count(),
            ),
            (
                "store_tags",
                tags.stores.values().map(HashMap::len).sum::<usize>(),
            ),
            (
                "file_tags",
                tags.files
                    .values()
                    .flat_map(|owners| owners.values())
                    .map(HashMap::len)
                    .sum::<usize>(),
            ),
        ])
    }
}

impl std::fmt::Debug for MemoryDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDb").finish_non_exhaustive()
    }
}

impl Backend for MemoryDb {
    type Tags = TagIndex;
    type Owners = OwnerRegistry;
    type Files = FileRegistry;
    type Stores = StoreRegistry;

    fn tags(&self) -> TagIndex {
        TagIndex::new(self.shared.clone())
    }

    fn owners(&self) -> OwnerRegistry {
        OwnerRegistry::new(self.shared.clone())
    }

    fn files(&self) -> FileRegistry {
        FileRegistry::new(self.shared.clone())
    }

    fn stores(&self) -> StoreRegistry {
        StoreRegistry::new(self.shared.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{FileBackend, OwnerBackend, StoreBackend, TagBackend},
        ids::FileId,
        model::User,
        tag::{Tag, TagType},
    };

    fn populated() -> MemoryDb {
        let db = MemoryDb::default();
        let owners = db.owners();
        let id = owners
            .reserve(OwnerId::new(OwnerKind::User), "alice")
            .unwrap();
        owners.insert(&User::new(id, "alice").into()).unwrap();

        let store = FileStore::from_bytes(b"hello".to_vec(), "text/plain");
        let stores = db.stores();
        let sid = stores.reserve(store.id.clone()).unwrap();
        let store = FileStore { id: sid, ..store };
        stores.insert(&store).unwrap();

        let files = db.files();
        let fid = files.reserve(FileId::new(store.id.clone())).unwrap();
        let mut file = File::new(id, "hello.txt");
        file.id = Some(fid.clone());
        files.insert(&file).unwrap();

        db.tags()
            .upsert(&[FileTag::new(
                fid,
                id,
                Tag::new("hello", TagType::NAME | TagType::CONTENT),
            )])
            .unwrap();
        db
    }

    #[test]
    fn clones_share_state() {
        let db = populated();
        let other = db.clone();
        assert!(other.owners().find_user_name("alice").is_ok());
    }

    #[test]
    fn export_import_preserves_records() {
        let db = populated();
        let snapshot = db.export();
        assert_eq!(snapshot.owners.len(), 1);
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.stores.len(), 1);
        assert_eq!(snapshot.store_tags.len(), 1);
        assert_eq!(snapshot.file_tags.len(), 1);

        let restored =
            MemoryDb::import(snapshot.clone(), Config::default()).unwrap();
        assert_eq!(restored.stats(), db.stats());
        let alice = restored.owners().find_user_name("alice").unwrap();
        let file = &snapshot.files[0];
        let tags = restored.tags().get(file.id().unwrap(), &alice.id).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag.ty, TagType::NAME | TagType::CONTENT);
    }

    #[test]
    fn export_skips_reservations() {
        let db = MemoryDb::default();
        db.owners()
            .reserve(OwnerId::new(OwnerKind::User), "pending")
            .unwrap();
        assert!(db.export().owners.is_empty());
    }

    #[test]
    fn import_rejects_duplicate_names() {
        let a = User::new(OwnerId::new(OwnerKind::User), "same");
        let b = User::new(OwnerId::new(OwnerKind::User), "same");
        let snapshot = Snapshot {
            owners: vec![a.into(), b.into()],
            ..Snapshot::default()
        };
        assert!(matches!(
            MemoryDb::import(snapshot, Config::default()),
            Err(Error::NameTaken(_))
        ));
    }
}
