use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use tracing::debug;

use crate::{
    backend::{FileBackend, TagBackend},
    error::Result,
    file_registry::FileRegistry,
    ids::{FileId, OwnerId},
    memory_db::Shared,
    search,
    tag::{self, FileTag, StoreTag, Tag, TagType},
};

/// Tag index over the in-memory backend.
///
/// All handles share one read/write lock: reads run concurrently, upserts
/// and removals are serialized.
pub struct TagIndex {
    shared: Arc<Shared>,
}

impl TagIndex {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn file_ids(files: Vec<crate::model::File>) -> Vec<FileId> {
        files.into_iter().filter_map(|f| f.id).collect()
    }
}

/// Clear `bits` from `tag`. Returns `false` if nothing is left, in which
/// case the entry must be dropped.
fn clear_bits(tag: &mut Tag, bits: TagType) -> bool {
    match tag.restrict(tag.ty.subtract(bits)) {
        Some(rest) => {
            *tag = rest;
            true
        }
        None => false,
    }
}

/// Merge the file layer with the store layer, word by word. The file entry
/// wins on conflicting data keys; store-only words become synthetic file
/// tags for `(file, owner)`.
fn merge_layers<'a>(
    file: &FileId,
    owner: &OwnerId,
    ftags: impl Iterator<Item = &'a FileTag>,
    stags: impl Iterator<Item = &'a StoreTag>,
) -> Vec<FileTag> {
    let mut merged: HashMap<&str, FileTag> = HashMap::new();
    for st in stags {
        merged.insert(
            &st.tag.word,
            FileTag::new(file.clone(), *owner, st.tag.clone()),
        );
    }
    for ft in ftags {
        match merged.entry(&ft.tag.word) {
            Entry::Occupied(mut e) => e.get_mut().tag.update(&ft.tag),
            Entry::Vacant(e) => {
                e.insert(ft.clone());
            }
        }
    }
    let mut out: Vec<FileTag> = merged.into_values().collect();
    out.sort_by(|a, b| a.tag.word.cmp(&b.tag.word));
    out
}

impl TagBackend for TagIndex {
    fn upsert(&self, tags: &[FileTag]) -> Result<()> {
        let (stags, ftags) = tag::divide(tags);
        let mut maps = self.shared.tags.write();
        for st in stags {
            let scope = maps.stores.entry(st.store.to_string()).or_default();
            match scope.entry(st.tag.word.clone()) {
                Entry::Occupied(mut e) => e.get_mut().tag.update(&st.tag),
                Entry::Vacant(e) => {
                    e.insert(st);
                }
            }
        }
        for ft in ftags {
            let scope = maps
                .files
                .entry(ft.file.to_string())
                .or_default()
                .entry(ft.owner.to_string())
                .or_default();
            match scope.entry(ft.tag.word.clone()) {
                Entry::Occupied(mut e) => e.get_mut().tag.update(&ft.tag),
                Entry::Vacant(e) => {
                    e.insert(ft);
                }
            }
        }
        debug!(count = tags.len(), "upserted tags");
        Ok(())
    }

    fn remove(&self, tags: &[FileTag]) -> Result<()> {
        let (stags, ftags) = tag::divide(tags);
        let mut maps = self.shared.tags.write();
        for st in stags {
            let key = st.store.to_string();
            let Some(scope) = maps.stores.get_mut(&key) else {
                continue;
            };
            if let Some(old) = scope.get_mut(&st.tag.word)
                && !clear_bits(&mut old.tag, st.tag.ty)
            {
                scope.remove(&st.tag.word);
            }
            if scope.is_empty() {
                maps.stores.remove(&key);
            }
        }
        for ft in ftags {
            let file_key = ft.file.to_string();
            let owner_key = ft.owner.to_string();
            let Some(owners) = maps.files.get_mut(&file_key) else {
                continue;
            };
            let Some(scope) = owners.get_mut(&owner_key) else {
                continue;
            };
            if let Some(old) = scope.get_mut(&ft.tag.word)
                && !clear_bits(&mut old.tag, ft.tag.ty)
            {
                scope.remove(&ft.tag.word);
            }
            if scope.is_empty() {
                owners.remove(&owner_key);
            }
            if owners.is_empty() {
                maps.files.remove(&file_key);
            }
        }
        debug!(count = tags.len(), "removed tags");
        Ok(())
    }

    fn get(&self, file: &FileId, owner: &OwnerId) -> Result<Vec<FileTag>> {
        self.get_type(file, owner, TagType::ALLFILE | TagType::ALLSTORE)
    }

    fn get_type(
        &self,
        file: &FileId,
        owner: &OwnerId,
        ty: TagType,
    ) -> Result<Vec<FileTag>> {
        let maps = self.shared.tags.read();
        let ftags = ty
            .intersects(TagType::ALLFILE)
            .then(|| {
                maps.files
                    .get(&file.to_string())?
                    .get(&owner.to_string())
            })
            .flatten();
        let stags = ty
            .intersects(TagType::ALLSTORE)
            .then(|| maps.stores.get(&file.store().to_string()))
            .flatten();
        Ok(merge_layers(
            file,
            owner,
            ftags
                .into_iter()
                .flat_map(HashMap::values)
                .filter(|ft| ft.tag.ty.intersects(ty)),
            stags
                .into_iter()
                .flat_map(HashMap::values)
                .filter(|st| st.tag.ty.intersects(ty)),
        ))
    }

    fn get_all(&self, ty: TagType, owner: &OwnerId) -> Result<Vec<FileTag>> {
        let maps = self.shared.tags.read();
        let owner_key = owner.to_string();
        Ok(maps
            .files
            .values()
            .filter_map(|owners| owners.get(&owner_key))
            .flat_map(HashMap::values)
            .filter(|ft| ft.tag.ty.intersects(ty))
            .cloned()
            .collect())
    }

    fn search_owned(
        &self,
        owner: &OwnerId,
        filters: &[Tag],
    ) -> Result<Vec<FileId>> {
        let files = FileRegistry::new(self.shared.clone()).get_owned(owner)?;
        self.search_files(&Self::file_ids(files), filters)
    }

    fn search_access(
        &self,
        owner: &OwnerId,
        key: &str,
        filters: &[Tag],
    ) -> Result<Vec<FileId>> {
        let files =
            FileRegistry::new(self.shared.clone()).get_perm_key(owner, key)?;
        self.search_files(&Self::file_ids(files), filters)
    }

    fn search_files(
        &self,
        candidates: &[FileId],
        filters: &[Tag],
    ) -> Result<Vec<FileId>> {
        let maps = self.shared.tags.read();
        let matched = search::filter_files(
            candidates,
            filters,
            |file| {
                maps.files
                    .get(&file.to_string())
                    .into_iter()
                    .flat_map(HashMap::values)
                    .flat_map(HashMap::values)
                    .map(|ft| &ft.tag)
            },
            |file| {
                maps.stores
                    .get(&file.store().to_string())
                    .into_iter()
                    .flat_map(HashMap::values)
                    .map(|st| &st.tag)
            },
        );
        debug!(
            candidates = candidates.len(),
            filters = filters.len(),
            matched = matched.len(),
            "searched files"
        );
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::Backend,
        ids::{OwnerKind, StoreId},
        memory_db::MemoryDb,
        tag::TagData,
    };

    fn ids() -> (FileId, OwnerId) {
        (
            FileId::from_parts(StoreId::for_content(b"doc"), 1),
            OwnerId::from_parts(OwnerKind::User, 1),
        )
    }

    fn ftag(file: &FileId, owner: &OwnerId, tag: Tag) -> FileTag {
        FileTag::new(file.clone(), *owner, tag)
    }

    #[test]
    fn upsert_then_get_roundtrip() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let data = TagData::new().with(TagType::NAME, "source", "upload");
        db.tags()
            .upsert(&[ftag(
                &file,
                &owner,
                Tag::new("report", TagType::NAME).with_data(data.clone()),
            )])
            .unwrap();

        let got = db.tags().get(&file, &owner).unwrap();
        assert_eq!(got.len(), 1);
        assert!(got[0].tag.ty.contains(TagType::NAME));
        assert_eq!(got[0].tag.data, data);
    }

    #[test]
    fn store_and_file_layers_merge() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let tags = db.tags();
        tags.upsert(&[ftag(&file, &owner, Tag::new("report", TagType::NAME))])
            .unwrap();
        tags.upsert(&[ftag(
            &file,
            &owner,
            Tag::new("report", TagType::CONTENT),
        )])
        .unwrap();

        let got = tags.get(&file, &owner).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].tag.word, "report");
        assert_eq!(got[0].tag.ty, TagType::NAME | TagType::CONTENT);
    }

    #[test]
    fn file_data_wins_over_store_data() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let both = TagType::NAME | TagType::CONTENT;
        let tags = db.tags();
        tags.upsert(&[ftag(
            &file,
            &owner,
            Tag::new("w", TagType::CONTENT).with_data(
                TagData::new()
                    .with(both, "k", "store")
                    .with(TagType::CONTENT, "only_store", 1),
            ),
        )])
        .unwrap();
        tags.upsert(&[ftag(
            &file,
            &owner,
            Tag::new("w", TagType::NAME)
                .with_data(TagData::new().with(both, "k", "file")),
        )])
        .unwrap();

        let got = tags.get(&file, &owner).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].tag.ty, both);
        assert_eq!(got[0].tag.data.get(both, "k"), Some(&"file".into()));
        assert_eq!(
            got[0].tag.data.get(TagType::CONTENT, "only_store"),
            Some(&1.into())
        );
    }

    #[test]
    fn store_only_words_are_visible_to_every_owner() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let other = OwnerId::from_parts(OwnerKind::User, 2);
        let tags = db.tags();
        tags.upsert(&[ftag(
            &file,
            &owner,
            Tag::new("shared", TagType::CONTENT),
        )])
        .unwrap();
        tags.upsert(&[ftag(&file, &owner, Tag::new("mine", TagType::NAME))])
            .unwrap();

        let seen = tags.get(&file, &other).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].tag.word, "shared");
        assert_eq!(seen[0].owner, other);
        assert_eq!(seen[0].file, file);
    }

    #[test]
    fn clearing_every_bit_deletes_the_entry() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let tags = db.tags();
        let t = ftag(
            &file,
            &owner,
            Tag::new("gone", TagType::NAME | TagType::CONTENT),
        );
        tags.upsert(std::slice::from_ref(&t)).unwrap();
        tags.remove(&[t]).unwrap();
        assert!(tags.get(&file, &owner).unwrap().is_empty());
        assert!(db.export().store_tags.is_empty());
        assert!(db.export().file_tags.is_empty());
    }

    #[test]
    fn partial_clear_keeps_remaining_bits_and_data() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let tags = db.tags();
        tags.upsert(&[ftag(
            &file,
            &owner,
            Tag::new("w", TagType::NAME | TagType::USER).with_data(
                TagData::new()
                    .with(TagType::NAME, "a", 1)
                    .with(TagType::USER, "b", 2),
            ),
        )])
        .unwrap();
        tags.remove(&[ftag(&file, &owner, Tag::new("w", TagType::NAME))])
            .unwrap();

        let got = tags.get(&file, &owner).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].tag.ty, TagType::USER);
        assert_eq!(got[0].tag.data.get(TagType::NAME, "a"), None);
        assert_eq!(got[0].tag.data.get(TagType::USER, "b"), Some(&2.into()));
    }

    #[test]
    fn partial_clear_on_store_scope_filters_data() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let tags = db.tags();
        tags.upsert(&[ftag(
            &file,
            &owner,
            Tag::new("w", TagType::CONTENT | TagType::TOPIC).with_data(
                TagData::new()
                    .with(TagType::CONTENT, "offset", 12)
                    .with(TagType::TOPIC, "score", 3),
            ),
        )])
        .unwrap();
        tags.remove(&[ftag(&file, &owner, Tag::new("w", TagType::CONTENT))])
            .unwrap();

        let stored = db.export().store_tags;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].store, *file.store());
        assert_eq!(stored[0].tag.ty, TagType::TOPIC);
        assert_eq!(stored[0].tag.data.get(TagType::CONTENT, "offset"), None);
        assert_eq!(
            stored[0].tag.data.get(TagType::TOPIC, "score"),
            Some(&3.into())
        );

        let got = tags.get(&file, &owner).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].tag.ty, TagType::TOPIC);
    }

    #[test]
    fn removing_missing_entry_is_a_noop() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        db.tags()
            .remove(&[ftag(&file, &owner, Tag::new("nope", TagType::ALLFILE))])
            .unwrap();
        assert!(db.tags().get(&file, &owner).unwrap().is_empty());
    }

    #[test]
    fn get_type_consults_only_requested_layers() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let tags = db.tags();
        tags.upsert(&[
            ftag(&file, &owner, Tag::new("name", TagType::NAME)),
            ftag(&file, &owner, Tag::new("body", TagType::CONTENT)),
            ftag(&file, &owner, Tag::new("who", TagType::USER)),
        ])
        .unwrap();

        let names = tags.get_type(&file, &owner, TagType::NAME).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].tag.word, "name");

        let content = tags.get_type(&file, &owner, TagType::CONTENT).unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].tag.word, "body");

        let both = tags
            .get_type(&file, &owner, TagType::NAME | TagType::CONTENT)
            .unwrap();
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn get_all_scans_every_file_of_the_owner() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let second = FileId::from_parts(StoreId::for_content(b"other"), 2);
        let stranger = OwnerId::from_parts(OwnerKind::User, 3);
        let tags = db.tags();
        tags.upsert(&[
            ftag(&file, &owner, Tag::new("a", TagType::NAME)),
            ftag(&second, &owner, Tag::new("b", TagType::NAME)),
            ftag(&second, &owner, Tag::new("c", TagType::USER)),
            ftag(&second, &stranger, Tag::new("d", TagType::NAME)),
        ])
        .unwrap();

        let mut words: Vec<String> = tags
            .get_all(TagType::NAME, &owner)
            .unwrap()
            .into_iter()
            .map(|t| t.tag.word)
            .collect();
        words.sort();
        assert_eq!(words, vec!["a", "b"]);
    }

    #[test]
    fn reads_return_independent_copies() {
        let db = MemoryDb::default();
        let (file, owner) = ids();
        let tags = db.tags();
        tags.upsert(&[ftag(&file, &owner, Tag::new("w", TagType::NAME))])
            .unwrap();
        let mut got = tags.get(&file, &owner).unwrap();
        got[0].tag.ty = TagType::USER;
        assert_eq!(tags.get(&file, &owner).unwrap()[0].tag.ty, TagType::NAME);
    }
}
