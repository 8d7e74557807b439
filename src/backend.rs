//! Storage contract the core runs against.
//!
//! Any conforming backend, in memory or durable, can serve the tag index,
//! the owner registry and the ingestion pipeline. Handles returned by
//! [`Backend`] are cheap views over one shared backing structure; every
//! read returns owned copies.

use crate::{
    error::Result,
    ids::{FileId, OwnerId, StoreId},
    model::{File, FileStore, Group, Owner, User},
    tag::{FileTag, Tag, TagType},
};

/// Tag index and search operations.
pub trait TagBackend {
    /// Insert or merge tags. Each tag lands in the store scope, the file
    /// scope, or both, depending on which bit groups its type touches.
    fn upsert(&self, tags: &[FileTag]) -> Result<()>;

    /// Clear the bits of each tag from the matching entry; entries left
    /// with no bits are deleted.
    fn remove(&self, tags: &[FileTag]) -> Result<()>;

    /// Merged view of file-scoped and store-scoped tags for the pair.
    fn get(&self, file: &FileId, owner: &OwnerId) -> Result<Vec<FileTag>>;

    /// Like [`get`](Self::get), restricted to entries intersecting `ty`.
    fn get_type(
        &self,
        file: &FileId,
        owner: &OwnerId,
        ty: TagType,
    ) -> Result<Vec<FileTag>>;

    /// Every file-scoped tag of `owner` intersecting `ty`, across all files.
    /// This is a linear scan over tagged files.
    fn get_all(&self, ty: TagType, owner: &OwnerId) -> Result<Vec<FileTag>>;

    fn search_owned(
        &self,
        owner: &OwnerId,
        filters: &[Tag],
    ) -> Result<Vec<FileId>>;

    fn search_access(
        &self,
        owner: &OwnerId,
        key: &str,
        filters: &[Tag],
    ) -> Result<Vec<FileId>>;

    /// The subset of `candidates` satisfying every filter.
    fn search_files(
        &self,
        candidates: &[FileId],
        filters: &[Tag],
    ) -> Result<Vec<FileId>>;
}

/// Groups related to an owner, as returned by
/// [`OwnerBackend::get_groups`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMembership {
    pub owned: Vec<Group>,
    pub member: Vec<Group>,
}

pub trait OwnerBackend {
    /// Claim `name` and a free id derived from `candidate`. Returns the id
    /// actually claimed.
    fn reserve(&self, candidate: OwnerId, name: &str) -> Result<OwnerId>;

    /// Commit an owner whose id and name were reserved.
    fn insert(&self, owner: &Owner) -> Result<()>;

    fn get(&self, id: &OwnerId) -> Result<Owner>;

    fn find_user_name(&self, name: &str) -> Result<User>;

    fn find_group_name(&self, name: &str) -> Result<Group>;

    fn get_groups(&self, id: &OwnerId) -> Result<GroupMembership>;

    fn update(&self, owner: &Owner) -> Result<()>;

    /// Bytes consumed by the distinct stores behind the owner's files.
    fn get_space(&self, id: &OwnerId) -> Result<u64>;

    /// Bytes the owner is allotted.
    fn get_total_space(&self, id: &OwnerId) -> Result<u64>;
}

pub trait FileBackend {
    fn reserve(&self, candidate: FileId) -> Result<FileId>;

    fn insert(&self, file: &File) -> Result<()>;

    fn get(&self, id: &FileId) -> Result<File>;

    fn update(&self, file: &File) -> Result<()>;

    fn get_owned(&self, owner: &OwnerId) -> Result<Vec<File>>;

    /// Files on which `owner` was explicitly granted `key`.
    fn get_perm_key(&self, owner: &OwnerId, key: &str) -> Result<Vec<File>>;
}

pub trait StoreBackend {
    fn match_hash(&self, hash: &str) -> Result<Vec<FileStore>>;

    fn reserve(&self, candidate: StoreId) -> Result<StoreId>;

    /// Commit a reserved store. Returns the id the content now lives under,
    /// which differs from `store.id` when the backend resolved it onto an
    /// identical store committed in the meantime.
    fn insert(&self, store: &FileStore) -> Result<StoreId>;

    fn get(&self, id: &StoreId) -> Result<FileStore>;
}

/// Hands out handles for each part of the contract.
pub trait Backend {
    type Tags: TagBackend;
    type Owners: OwnerBackend;
    type Files: FileBackend;
    type Stores: StoreBackend;

    fn tags(&self) -> Self::Tags;
    fn owners(&self) -> Self::Owners;
    fn files(&self) -> Self::Files;
    fn stores(&self) -> Self::Stores;
}
