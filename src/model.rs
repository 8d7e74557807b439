use std::{
    collections::{BTreeMap, BTreeSet},
    io::Read,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    ids::{FileId, OwnerId, OwnerKind, StoreId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl User {
    pub fn new(id: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: String::new(),
            roles: BTreeSet::new(),
        }
    }

    /// Returns `false` if the role was already present.
    pub fn add_role(&mut self, role: impl Into<String>) -> bool {
        self.roles.insert(role.into())
    }

    /// Returns `false` if the role was not present.
    pub fn remove_role(&mut self, role: &str) -> bool {
        self.roles.remove(role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: OwnerId,
    pub name: String,
    pub owner: OwnerId,
    #[serde(default)]
    pub members: BTreeSet<OwnerId>,
}

impl Group {
    pub fn new(id: OwnerId, name: impl Into<String>, owner: OwnerId) -> Self {
        Self {
            id,
            name: name.into(),
            owner,
            members: BTreeSet::new(),
        }
    }

    pub fn add_member(&mut self, member: OwnerId) -> bool {
        self.members.insert(member)
    }

    pub fn remove_member(&mut self, member: &OwnerId) -> bool {
        self.members.remove(member)
    }

    pub fn is_member(&self, id: &OwnerId) -> bool {
        self.members.contains(id)
    }
}

/// A user or a group, as stored in the owner registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Owner {
    User(User),
    Group(Group),
}

impl Owner {
    pub fn id(&self) -> OwnerId {
        match self {
            Self::User(u) => u.id,
            Self::Group(g) => g.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User(u) => &u.name,
            Self::Group(g) => &g.name,
        }
    }

    pub fn kind(&self) -> OwnerKind {
        match self {
            Self::User(_) => OwnerKind::User,
            Self::Group(_) => OwnerKind::Group,
        }
    }

    /// Fails if the id's kind disagrees with the variant, which would put
    /// the owner's name in the wrong namespace.
    pub fn check_kind(&self) -> Result<()> {
        if self.id().kind() != self.kind() {
            return Err(Error::InvariantViolation(format!(
                "{} {} carries a {} id",
                self.kind(),
                self.name(),
                self.id().kind()
            )));
        }
        Ok(())
    }

    pub fn into_user(self) -> Option<User> {
        match self {
            Self::User(u) => Some(u),
            Self::Group(_) => None,
        }
    }

    pub fn into_group(self) -> Option<Group> {
        match self {
            Self::Group(g) => Some(g),
            Self::User(_) => None,
        }
    }
}

impl From<User> for Owner {
    fn from(u: User) -> Self {
        Self::User(u)
    }
}

impl From<Group> for Owner {
    fn from(g: Group) -> Self {
        Self::Group(g)
    }
}

/// A file record: one owner's handle on a content store.
///
/// The id is assigned during ingestion, once the store is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: Option<FileId>,
    pub owner: OwnerId,
    pub name: String,
    /// Permission key (e.g. `view`) to the owners granted it.
    #[serde(default)]
    pub permissions: BTreeMap<String, BTreeSet<OwnerId>>,
}

impl File {
    pub fn new(owner: OwnerId, name: impl Into<String>) -> Self {
        Self {
            id: None,
            owner,
            name: name.into(),
            permissions: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Result<&FileId> {
        self.id.as_ref().ok_or_else(|| {
            Error::InvariantViolation(format!(
                "file {:?} has no id yet",
                self.name
            ))
        })
    }

    pub fn share(&mut self, key: impl Into<String>, with: OwnerId) {
        self.permissions.entry(key.into()).or_default().insert(with);
    }

    pub fn revoke(&mut self, key: &str, from: &OwnerId) -> bool {
        let Some(granted) = self.permissions.get_mut(key) else {
            return false;
        };
        let removed = granted.remove(from);
        if granted.is_empty() {
            self.permissions.remove(key);
        }
        removed
    }

    pub fn is_granted(&self, key: &str, who: &OwnerId) -> bool {
        self.permissions
            .get(key)
            .is_some_and(|granted| granted.contains(who))
    }
}

/// A content blob. Created once per distinct byte sequence and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStore {
    pub id: StoreId,
    pub content: Vec<u8>,
    pub file_size: u64,
    pub content_type: String,
}

impl FileStore {
    /// Materialize `stream`, hashing it into a candidate store id.
    ///
    /// With a `limit`, at most `limit + 1` bytes are pulled from the stream;
    /// anything longer is rejected with [`Error::FileTooLarge`] and the rest
    /// of the stream is left unread.
    pub fn read(
        mut stream: impl Read,
        content_type: impl Into<String>,
        limit: Option<u64>,
    ) -> Result<Self> {
        let mut content = Vec::new();
        match limit {
            Some(limit) => {
                stream
                    .take(limit.saturating_add(1))
                    .read_to_end(&mut content)?;
                if content.len() as u64 > limit {
                    return Err(Error::FileTooLarge { limit });
                }
            }
            None => {
                stream.read_to_end(&mut content)?;
            }
        }
        Ok(Self::from_bytes(content, content_type))
    }

    pub fn from_bytes(
        content: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: StoreId::for_content(&content),
            file_size: content.len() as u64,
            content,
            content_type: content_type.into(),
        }
    }
}
