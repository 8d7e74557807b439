use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// Overrides the default vault location when set to a non-empty path.
pub const DATA_DIR_ENV: &str = "DOCVAULT_DATA_DIR";

const SNAPSHOT_FILE: &str = "vault.redb";

/// Which setting picked the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirSource {
    Flag,
    Env,
    Xdg,
}

impl fmt::Display for DataDirSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flag => "--data-dir",
            Self::Env => DATA_DIR_ENV,
            Self::Xdg => "XDG data home",
        })
    }
}

/// Directory holding the vault snapshot. Always absolute and present on
/// disk once resolved.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    source: DataDirSource,
}

impl DataDir {
    /// Resolve from `--data-dir`, then [`DATA_DIR_ENV`], then
    /// `~/.local/share/docvault`, creating the directory if needed.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, std::env::var_os(DATA_DIR_ENV))
    }

    fn resolve_with(
        explicit: Option<&Path>,
        env: Option<OsString>,
    ) -> Result<Self> {
        let (root, source) = match configured(explicit, env) {
            Some(chosen) => chosen,
            None => (xdg_data_home()?, DataDirSource::Xdg),
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        let root =
            std::path::absolute(&root).map_err(|_| Error::DataDir(root))?;

        Ok(Self { root, source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> DataDirSource {
        self.source
    }

    pub fn snapshot_db(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }
}

/// The path set by flag or environment, if any. An empty variable counts
/// as unset.
fn configured(
    explicit: Option<&Path>,
    env: Option<OsString>,
) -> Option<(PathBuf, DataDirSource)> {
    if let Some(path) = explicit {
        return Some((path.to_path_buf(), DataDirSource::Flag));
    }
    env.filter(|v| !v.is_empty())
        .map(|v| (PathBuf::from(v), DataDirSource::Env))
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("docvault")
        .get_data_home()
        .ok_or_else(|| {
            Error::Config("could not determine XDG data home directory".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_environment() {
        let flag = tempfile::tempdir().unwrap();
        let env = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve_with(
            Some(flag.path()),
            Some(env.path().into()),
        )
        .unwrap();

        assert_eq!(dir.root(), flag.path());
        assert_eq!(dir.source(), DataDirSource::Flag);
        assert_eq!(dir.snapshot_db(), flag.path().join("vault.redb"));
    }

    #[test]
    fn environment_is_used_without_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir =
            DataDir::resolve_with(None, Some(nested.clone().into())).unwrap();

        assert!(nested.is_dir());
        assert_eq!(dir.root(), nested);
        assert_eq!(dir.source(), DataDirSource::Env);
    }

    #[test]
    fn empty_environment_value_falls_back_to_xdg() {
        assert_eq!(configured(None, Some(OsString::new())), None);
        assert_eq!(configured(None, None), None);
    }

    #[test]
    fn unusable_path_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("plain");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(
            DataDir::resolve(Some(&file.join("sub"))),
            Err(Error::DataDir(_))
        ));
    }

    #[test]
    fn source_names_the_setting() {
        assert_eq!(DataDirSource::Env.to_string(), "DOCVAULT_DATA_DIR");
        assert_eq!(DataDirSource::Flag.to_string(), "--data-dir");
    }
}
