//! Tag model: typed, bit-flagged metadata attached either to a content
//! blob (store scope) or to a (file, owner) pair (file scope).
//!
//! A [`TagType`] is a set of independent flag bits. The low half of the bit
//! space ([`TagType::ALLSTORE`]) holds store-scoped categories, the high
//! half ([`TagType::ALLFILE`]) file-scoped ones. A tag whose type spans both
//! halves contributes an entry to each scope.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{
    error::Error,
    ids::{FileId, OwnerId, StoreId},
};

/// Flag set describing which categories a tag belongs to.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagType(u32);

impl TagType {
    pub const EMPTY: Self = Self(0);

    // Store-scoped categories.
    pub const CONTENT: Self = Self(1);
    pub const SEARCH: Self = Self(1 << 1);
    pub const TOPIC: Self = Self(1 << 2);
    pub const ACTION: Self = Self(1 << 3);
    pub const RESOURCE: Self = Self(1 << 4);
    pub const PROCESS: Self = Self(1 << 5);
    pub const ALLSTORE: Self = Self(0x0000_ffff);

    // File-scoped categories.
    pub const USER: Self = Self(1 << 16);
    pub const NAME: Self = Self(1 << 17);
    pub const ALLFILE: Self = Self(0xffff_0000);

    const NAMED: &'static [(Self, &'static str)] = &[
        (Self::CONTENT, "CONTENT"),
        (Self::SEARCH, "SEARCH"),
        (Self::TOPIC, "TOPIC"),
        (Self::ACTION, "ACTION"),
        (Self::RESOURCE, "RESOURCE"),
        (Self::PROCESS, "PROCESS"),
        (Self::USER, "USER"),
        (Self::NAME, "NAME"),
        (Self::ALLSTORE, "ALLSTORE"),
        (Self::ALLFILE, "ALLFILE"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Bits of `self` that are not in `other`.
    pub const fn subtract(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The store-scoped part of this type.
    pub const fn store_part(self) -> Self {
        self.intersection(Self::ALLSTORE)
    }

    /// The file-scoped part of this type.
    pub const fn file_part(self) -> Self {
        self.intersection(Self::ALLFILE)
    }

    /// Iterate over the individual bits that are set.
    pub fn categories(self) -> impl Iterator<Item = Self> {
        (0..32)
            .map(|i| Self(1 << i))
            .filter(move |bit| self.intersects(*bit))
    }

    fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, name)| *name)
    }
}

impl std::ops::BitOr for TagType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagType({self})")
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("0");
        }
        if let Some(name) = self.name() {
            return f.write_str(name);
        }
        let parts: Vec<String> = self
            .categories()
            .map(|bit| match bit.name() {
                Some(name) => name.to_string(),
                None => format!("{:#x}", bit.0),
            })
            .collect();
        f.write_str(&parts.join("|"))
    }
}

/// Parses `NAME`, `name|content`, or a raw number (`0x20000`, `131072`).
impl FromStr for TagType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ty = Self::EMPTY;
        for part in s.split('|').map(str::trim) {
            let upper = part.to_ascii_uppercase();
            let bit = if let Some((named, _)) =
                Self::NAMED.iter().find(|(_, name)| *name == upper)
            {
                *named
            } else if let Some(hex) = upper.strip_prefix("0X") {
                u32::from_str_radix(hex, 16).map(Self).map_err(|_| {
                    Error::InvariantViolation(format!(
                        "unknown tag type {part:?}"
                    ))
                })?
            } else {
                part.parse().map(Self).map_err(|_| {
                    Error::InvariantViolation(format!(
                        "unknown tag type {part:?}"
                    ))
                })?
            };
            ty = ty.union(bit);
        }
        Ok(ty)
    }
}

impl Serialize for TagType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for TagType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        u32::deserialize(d).map(Self)
    }
}

/// Per-category key/value payload of a tag.
///
/// Categories are [`TagType`] values, usually single bits. A category
/// survives scope filtering as long as it intersects the remaining type, so
/// a category spanning both scopes is kept on both sides. On the wire
/// categories are keyed by name, e.g. `{"SEARCH": {"regex": true}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagData(BTreeMap<TagType, BTreeMap<String, Value>>);

impl TagData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, category: TagType, key: &str) -> Option<&Value> {
        self.0.get(&category)?.get(key)
    }

    pub fn insert(
        &mut self,
        category: TagType,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.0
            .entry(category)
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn with(
        mut self,
        category: TagType,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.insert(category, key, value);
        self
    }

    pub fn categories(&self) -> impl Iterator<Item = TagType> + '_ {
        self.0.keys().copied()
    }

    /// Merge `other` into `self`; on a key present in both, `other` wins.
    pub fn merge(&mut self, other: &Self) {
        for (category, entries) in &other.0 {
            let target = self.0.entry(*category).or_default();
            for (key, value) in entries {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    /// Keep only the categories implied by `ty`.
    pub fn filter_type(&self, ty: TagType) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(category, _)| category.intersects(ty))
                .map(|(category, entries)| (*category, entries.clone()))
                .collect(),
        )
    }
}

impl Serialize for TagData {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let named: BTreeMap<String, &BTreeMap<String, Value>> = self
            .0
            .iter()
            .map(|(category, entries)| (category.to_string(), entries))
            .collect();
        named.serialize(s)
    }
}

impl<'de> Deserialize<'de> for TagData {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let named =
            BTreeMap::<String, BTreeMap<String, Value>>::deserialize(d)?;
        let mut data = BTreeMap::new();
        for (name, entries) in named {
            let category: TagType =
                name.parse().map_err(serde::de::Error::custom)?;
            data.insert(category, entries);
        }
        Ok(Self(data))
    }
}

/// One metadata unit: a word, the categories it belongs to, and optional
/// per-category data. Also the wire shape of a search filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub word: String,
    #[serde(rename = "type")]
    pub ty: TagType,
    #[serde(default, skip_serializing_if = "TagData::is_empty")]
    pub data: TagData,
}

impl Tag {
    pub fn new(word: impl Into<String>, ty: TagType) -> Self {
        Self {
            word: word.into(),
            ty,
            data: TagData::new(),
        }
    }

    pub fn with_data(mut self, data: TagData) -> Self {
        self.data = data;
        self
    }

    /// A filter that matches words against `pattern` as a regular
    /// expression.
    pub fn regex(pattern: impl Into<String>, ty: TagType) -> Self {
        Self::new(pattern, ty.union(TagType::SEARCH))
            .with_data(TagData::new().with(TagType::SEARCH, "regex", true))
    }

    /// Whether this tag, used as a filter, requests regex matching.
    pub fn is_regex(&self) -> bool {
        self.ty.intersects(TagType::SEARCH)
            && self.data.get(TagType::SEARCH, "regex")
                == Some(&Value::Bool(true))
    }

    /// Union of types and data; `other` wins on conflicting data keys.
    pub fn update(&mut self, other: &Tag) {
        self.ty = self.ty.union(other.ty);
        self.data.merge(&other.data);
    }

    /// Restrict the tag to the bits in `ty`. Returns `None` when nothing
    /// remains.
    pub fn restrict(&self, ty: TagType) -> Option<Tag> {
        let remaining = self.ty.intersection(ty);
        if remaining.is_empty() {
            return None;
        }
        Some(Tag {
            word: self.word.clone(),
            ty: remaining,
            data: self.data.filter_type(remaining),
        })
    }
}

/// A tag attached to a content blob, visible through every file that
/// references the blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreTag {
    pub store: StoreId,
    #[serde(flatten)]
    pub tag: Tag,
}

/// A tag attached to one (file, owner) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTag {
    pub file: FileId,
    pub owner: OwnerId,
    #[serde(flatten)]
    pub tag: Tag,
}

impl FileTag {
    pub fn new(file: FileId, owner: OwnerId, tag: Tag) -> Self {
        Self { file, owner, tag }
    }

    /// The store-scoped share of this tag, addressed to the file's store.
    pub fn store_tag(&self) -> Option<StoreTag> {
        self.tag.restrict(TagType::ALLSTORE).map(|tag| StoreTag {
            store: self.file.store().clone(),
            tag,
        })
    }

    /// The file-scoped share of this tag.
    pub fn pure(&self) -> Option<FileTag> {
        self.tag.restrict(TagType::ALLFILE).map(|tag| FileTag {
            file: self.file.clone(),
            owner: self.owner,
            tag,
        })
    }
}

/// Partition tags into their store-scoped and file-scoped shares.
pub fn divide(tags: &[FileTag]) -> (Vec<StoreTag>, Vec<FileTag>) {
    let mut stags = Vec::with_capacity(tags.len());
    let mut ftags = Vec::with_capacity(tags.len());
    for t in tags {
        if let Some(st) = t.store_tag() {
            stags.push(st);
        }
        if let Some(ft) = t.pure() {
            ftags.push(ft);
        }
    }
    (stags, ftags)
}
