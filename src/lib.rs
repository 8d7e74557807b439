//! docvault - the indexing core of a document vault.
//!
//! Files are stored once per distinct byte sequence and tagged with typed,
//! bit-flagged words. Tags live either on the content itself, shared by
//! every file holding those bytes, or on a single (file, owner) pair.
//! Reads merge the two layers; searches AND together exact or regex word
//! filters. A registry hands out collision-free ids and unique names to
//! users and groups.
//!
//! # Quick start
//!
//! ```no_run
//! use docvault::{Config, MemoryDb, ingestion};
//! use docvault::backend::{Backend, OwnerBackend, TagBackend};
//! use docvault::ids::{OwnerId, OwnerKind};
//! use docvault::model::{File, User};
//! use docvault::tag::{Tag, TagType};
//!
//! let vault = MemoryDb::new(Config::default());
//! let owners = vault.owners();
//! let id = owners.reserve(OwnerId::new(OwnerKind::User), "alice").unwrap();
//! owners.insert(&User::new(id, "alice").into()).unwrap();
//!
//! let bytes = b"quarterly numbers";
//! let done = ingestion::ingest_file(
//!     &vault,
//!     vault.config(),
//!     File::new(id, "report.txt"),
//!     "text/plain",
//!     &bytes[..],
//! )
//! .unwrap();
//! ingestion::index_file(&vault, &done.file, bytes).unwrap();
//!
//! let hits = vault
//!     .tags()
//!     .search_owned(&id, &[Tag::regex("^quarter", TagType::CONTENT)])
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

pub mod backend;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod file_registry;
pub mod ids;
pub mod ingestion;
pub mod memory_db;
pub mod model;
pub mod owner_registry;
pub mod search;
pub mod snapshot_db;
pub mod store_registry;
pub mod tag;
pub mod tag_index;
pub mod words;

pub use config::Config;
pub use data_dir::{DataDir, DataDirSource};
pub use error::{Error, Result};
pub use memory_db::{MemoryDb, Snapshot};
pub use snapshot_db::SnapshotDb;
