use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Namespace an owner identity lives in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Group,
}

impl OwnerKind {
    fn prefix(self) -> char {
        match self {
            Self::User => 'u',
            Self::Group => 'g',
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c {
            'u' => Some(Self::User),
            'g' => Some(Self::Group),
            _ => None,
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Group => f.write_str("group"),
        }
    }
}

/// Identity of a user or group: a kind plus an opaque random payload.
///
/// The string form (`u-0123456789abcdef`) is used as the map key
/// everywhere an owner is indexed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct OwnerId {
    kind: OwnerKind,
    payload: u64,
}

impl OwnerId {
    /// A fresh candidate id with a random payload.
    pub fn new(kind: OwnerKind) -> Self {
        Self::from_parts(kind, rand::random())
    }

    pub fn from_parts(kind: OwnerKind, payload: u64) -> Self {
        Self { kind, payload }
    }

    pub fn kind(&self) -> OwnerKind {
        self.kind
    }

    /// Re-derive the payload, keeping the kind. Used to retry a
    /// reservation whose candidate collided.
    pub fn mutate(&self) -> Self {
        let mut next = Self::new(self.kind);
        while next.payload == self.payload {
            next = Self::new(self.kind);
        }
        next
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:016x}", self.kind.prefix(), self.payload)
    }
}

impl FromStr for OwnerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed =
            || Error::InvariantViolation(format!("bad owner id {s:?}"));
        let (prefix, payload) = s.split_once('-').ok_or_else(malformed)?;
        let mut chars = prefix.chars();
        let kind = match (chars.next(), chars.next()) {
            (Some(c), None) => {
                OwnerKind::from_prefix(c).ok_or_else(malformed)?
            }
            _ => return Err(malformed()),
        };
        let payload =
            u64::from_str_radix(payload, 16).map_err(|_| malformed())?;
        Ok(Self { kind, payload })
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for OwnerId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Identity of a content blob: the content hash plus a disambiguating
/// stamp, so that two different byte sequences sharing a hash can both be
/// stored.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct StoreId {
    hash: String,
    stamp: u16,
}

impl StoreId {
    /// Candidate id for the given content.
    pub fn for_content(content: &[u8]) -> Self {
        Self::from_hash(content_hash(content))
    }

    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            stamp: 0,
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Pick a different stamp for the same hash.
    pub fn mutate(&self) -> Self {
        let mut stamp: u16 = rand::random();
        while stamp == self.stamp {
            stamp = rand::random();
        }
        Self {
            hash: self.hash.clone(),
            stamp,
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04x}", self.hash, self.stamp)
    }
}

impl FromStr for StoreId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed =
            || Error::InvariantViolation(format!("bad store id {s:?}"));
        let (hash, stamp) = s.rsplit_once('.').ok_or_else(malformed)?;
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        let stamp = u16::from_str_radix(stamp, 16).map_err(|_| malformed())?;
        Ok(Self {
            hash: hash.to_string(),
            stamp,
        })
    }
}

impl From<StoreId> for String {
    fn from(id: StoreId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for StoreId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Identity of one file record: the store holding its bytes plus a
/// per-file payload.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct FileId {
    store: StoreId,
    payload: u32,
}

impl FileId {
    /// A fresh candidate id on top of `store`.
    pub fn new(store: StoreId) -> Self {
        Self {
            store,
            payload: rand::random(),
        }
    }

    pub fn from_parts(store: StoreId, payload: u32) -> Self {
        Self { store, payload }
    }

    pub fn store(&self) -> &StoreId {
        &self.store
    }

    pub fn mutate(&self) -> Self {
        let mut payload: u32 = rand::random();
        while payload == self.payload {
            payload = rand::random();
        }
        Self {
            store: self.store.clone(),
            payload,
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08x}", self.store, self.payload)
    }
}

impl FromStr for FileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed =
            || Error::InvariantViolation(format!("bad file id {s:?}"));
        let (store, payload) = s.rsplit_once('/').ok_or_else(malformed)?;
        let payload =
            u32::from_str_radix(payload, 16).map_err(|_| malformed())?;
        Ok(Self {
            store: store.parse()?,
            payload,
        })
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for FileId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Hex-encoded BLAKE3 digest of `content`.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}
