//! Filter evaluation for tag searches.
//!
//! A file passes a search when it satisfies every filter. A single filter
//! is satisfied by a matching word in either scope it targets: the
//! file-scoped tags of *any* owner of the file, or the tags of the file's
//! store.

use std::collections::HashSet;

use regex::Regex;

use crate::{
    ids::FileId,
    tag::{Tag, TagType},
};

enum WordMatch {
    Exact(String),
    /// `None` when the pattern failed to compile; such a filter never
    /// matches.
    Pattern(Option<Regex>),
}

/// A filter prepared for repeated matching.
pub struct CompiledFilter {
    ty: TagType,
    word: WordMatch,
}

impl CompiledFilter {
    pub fn new(filter: &Tag) -> Self {
        let word = if filter.is_regex() {
            let compiled = Regex::new(&filter.word);
            if let Err(e) = &compiled {
                tracing::debug!(
                    pattern = %filter.word,
                    "invalid filter regex: {e}"
                );
            }
            WordMatch::Pattern(compiled.ok())
        } else {
            WordMatch::Exact(filter.word.clone())
        };
        Self {
            ty: filter.ty,
            word,
        }
    }

    pub fn targets_file_scope(&self) -> bool {
        self.ty.intersects(TagType::ALLFILE)
    }

    pub fn targets_store_scope(&self) -> bool {
        self.ty.intersects(TagType::ALLSTORE)
    }

    /// Whether a stored tag satisfies this filter: the types must share a
    /// bit and the word must match.
    pub fn matches(&self, tag: &Tag) -> bool {
        if !tag.ty.intersects(self.ty) {
            return false;
        }
        match &self.word {
            WordMatch::Exact(word) => *word == tag.word,
            WordMatch::Pattern(Some(re)) => re.is_match(&tag.word),
            WordMatch::Pattern(None) => false,
        }
    }
}

/// Keep the candidates that satisfy every filter.
///
/// `file_tags` yields the file-scoped tags of a file across all owners,
/// `store_tags` the tags of its store. The result is de-duplicated and
/// keeps first-seen candidate order.
pub fn filter_files<'t, F, I, S, J>(
    candidates: &[FileId],
    filters: &[Tag],
    file_tags: F,
    store_tags: S,
) -> Vec<FileId>
where
    F: Fn(&FileId) -> I,
    I: Iterator<Item = &'t Tag>,
    S: Fn(&FileId) -> J,
    J: Iterator<Item = &'t Tag>,
{
    let compiled: Vec<CompiledFilter> =
        filters.iter().map(CompiledFilter::new).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for file in candidates {
        if !seen.insert(file) {
            continue;
        }
        let passes = compiled.iter().all(|filter| {
            (filter.targets_file_scope()
                && file_tags(file).any(|t| filter.matches(t)))
                || (filter.targets_store_scope()
                    && store_tags(file).any(|t| filter.matches(t)))
        });
        if passes {
            out.push(file.clone());
        }
    }
    out
}
