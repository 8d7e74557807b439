use std::{
    collections::BTreeSet,
    io::{BufRead, BufReader, Read},
};

use crate::{
    error::Result,
    tag::{Tag, TagType},
};

/// Iterate over the lower-cased words of `text`.
///
/// A word is a maximal run of ASCII letters and digits; everything else is a
/// separator.
pub fn scan_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
}

/// One `CONTENT` tag per distinct word in `content`.
///
/// Invalid UTF-8 is replaced rather than rejected; only ASCII runs count as
/// words anyway. Words never span a line break.
pub fn extract_content_tags(content: impl Read) -> Result<Vec<Tag>> {
    let mut reader = BufReader::new(content);
    let mut seen = BTreeSet::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        seen.extend(scan_words(&String::from_utf8_lossy(&line)));
    }
    Ok(seen
        .into_iter()
        .map(|w| Tag::new(w, TagType::CONTENT))
        .collect())
}

/// `NAME` tags for a file name: the name itself, then each distinct word in
/// it, in order of first appearance.
pub fn build_name_tags(name: &str) -> Vec<Tag> {
    let mut out = vec![Tag::new(name, TagType::NAME)];
    let mut seen = BTreeSet::new();
    for w in scan_words(name) {
        if seen.insert(w.clone()) {
            out.push(Tag::new(w, TagType::NAME));
        }
    }
    out
}
