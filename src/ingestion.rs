use std::{io::Read, path::Path, sync::mpsc};

use tracing::{debug, info, warn};

use crate::{
    backend::{Backend, FileBackend, OwnerBackend, StoreBackend, TagBackend},
    config::Config,
    error::{Error, Result},
    ids::{FileId, StoreId},
    model::{File, FileStore},
    tag::FileTag,
    words,
};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    /// The store now holding the bytes.
    pub store: StoreId,
    /// The committed file record, with its id assigned.
    pub file: File,
    /// Whether the bytes were already stored.
    pub deduplicated: bool,
}

/// Store `stream` as the content of `file` and commit the file record.
///
/// Checks, in order, the file-size limit and the owner's quota, then
/// reuses a byte-identical store if one exists. The first failing step
/// aborts the ingestion. A store committed before a later step fails is
/// kept; it is harmless and will be picked up by the next identical
/// ingestion.
pub fn ingest_file<B: Backend>(
    backend: &B,
    config: &Config,
    mut file: File,
    content_type: &str,
    stream: impl Read,
) -> Result<Ingested> {
    let candidate = FileStore::read(stream, content_type, config.file_limit)?;
    let size = candidate.file_size;

    let owners = backend.owners();
    let used = owners.get_space(&file.owner)?;
    let total = owners.get_total_space(&file.owner)?;
    if used.saturating_add(size) > total {
        warn!(owner = %file.owner, size, used, total, "quota exceeded");
        return Err(Error::QuotaExceeded {
            requested: size,
            used,
            total,
        });
    }

    let (store, deduplicated) = resolve_store(backend, candidate)?;

    let files = backend.files();
    let id = files.reserve(FileId::new(store.clone()))?;
    file.id = Some(id.clone());
    files.insert(&file)?;

    info!(
        file = %id,
        owner = %file.owner,
        file_name = %file.name,
        size,
        deduplicated,
        "ingested file"
    );
    Ok(Ingested {
        store,
        file,
        deduplicated,
    })
}

/// Find a committed store holding exactly these bytes, or create one.
fn resolve_store<B: Backend>(
    backend: &B,
    candidate: FileStore,
) -> Result<(StoreId, bool)> {
    let stores = backend.stores();
    let existing = stores
        .match_hash(candidate.id.hash())?
        .into_iter()
        .find(|s| s.content == candidate.content);
    if let Some(existing) = existing {
        debug!(store = %existing.id, "reusing identical store");
        return Ok((existing.id, true));
    }

    let reserved = stores.reserve(candidate.id.clone())?;
    let resolved = stores.insert(&FileStore {
        id: reserved.clone(),
        ..candidate
    })?;
    Ok((resolved.clone(), resolved != reserved))
}

/// Populate the tag index for a committed file: one store-scoped
/// `CONTENT` tag per word of `content`, and file-scoped `NAME` tags for
/// the file's owner built from its name.
///
/// Returns the number of tags written.
pub fn index_file<B: Backend>(
    backend: &B,
    file: &File,
    content: &[u8],
) -> Result<usize> {
    let id = file.id()?;
    let tags: Vec<FileTag> = words::extract_content_tags(content)?
        .into_iter()
        .chain(words::build_name_tags(&file.name))
        .map(|tag| FileTag::new(id.clone(), file.owner, tag))
        .collect();
    backend.tags().upsert(&tags)?;
    debug!(file = %id, tags = tags.len(), "indexed file");
    Ok(tags.len())
}

/// Run [`index_file`] on the rayon pool.
///
/// Failures are logged. The returned receiver yields the outcome once;
/// callers that do not care may drop it.
pub fn index_in_background<B>(
    backend: B,
    file: File,
    content: Vec<u8>,
) -> mpsc::Receiver<Result<usize>>
where
    B: Backend + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    rayon::spawn(move || {
        let outcome = index_file(&backend, &file, &content);
        if let Err(e) = &outcome {
            warn!(file_name = %file.name, "background indexing failed: {e}");
        }
        let _ = tx.send(outcome);
    });
    rx
}

/// Content type for a path, from its extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("txt") => "text/plain",
        Some("md" | "markdown") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
