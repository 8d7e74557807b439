use crate::{
    error::{Error, Result},
    ids::OwnerKind,
    snapshot_db::SnapshotDb,
};

pub const DEFAULT_USER_QUOTA: u64 = 50 * 1024 * 1024;
pub const DEFAULT_GROUP_QUOTA: u64 = 0;
pub const DEFAULT_FILE_LIMIT: u64 = 5 * 1024 * 1024;

pub const USER_QUOTA_KEY: &str = "user_quota";
pub const GROUP_QUOTA_KEY: &str = "group_quota";
pub const FILE_LIMIT_KEY: &str = "file_limit";

/// Quota policy and upload limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub user_quota: u64,
    pub group_quota: u64,
    /// Largest accepted file in bytes. `None` means unlimited.
    pub file_limit: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_quota: DEFAULT_USER_QUOTA,
            group_quota: DEFAULT_GROUP_QUOTA,
            file_limit: Some(DEFAULT_FILE_LIMIT),
        }
    }
}

impl Config {
    /// Read the policy from the settings table, falling back to defaults
    /// for keys that are not set.
    pub fn load(db: &SnapshotDb) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = db.get_setting(USER_QUOTA_KEY)? {
            config.user_quota = parse_setting(USER_QUOTA_KEY, &v)?;
        }
        if let Some(v) = db.get_setting(GROUP_QUOTA_KEY)? {
            config.group_quota = parse_setting(GROUP_QUOTA_KEY, &v)?;
        }
        if let Some(v) = db.get_setting(FILE_LIMIT_KEY)? {
            config.file_limit = parse_file_limit(&v)?;
        }
        Ok(config)
    }

    pub fn quota_for(&self, kind: OwnerKind) -> u64 {
        match kind {
            OwnerKind::User => self.user_quota,
            OwnerKind::Group => self.group_quota,
        }
    }
}

fn parse_setting(key: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("setting {key} is not a byte count: {value:?}"))
    })
}

/// `0` selects the default limit, a negative value disables the limit.
fn parse_file_limit(value: &str) -> Result<Option<u64>> {
    let limit: i64 = value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "setting {FILE_LIMIT_KEY} is not a byte count: {value:?}"
        ))
    })?;
    Ok(match limit {
        0 => Some(DEFAULT_FILE_LIMIT),
        n if n < 0 => None,
        n => Some(n.unsigned_abs()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, SnapshotDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = SnapshotDb::open(&tmp.path().join("vault.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn defaults_when_unset() {
        let (_tmp, db) = test_db();
        assert_eq!(Config::load(&db).unwrap(), Config::default());
    }

    #[test]
    fn settings_override_defaults() {
        let (_tmp, db) = test_db();
        db.set_setting(USER_QUOTA_KEY, "1000").unwrap();
        db.set_setting(GROUP_QUOTA_KEY, "2000").unwrap();
        db.set_setting(FILE_LIMIT_KEY, "10").unwrap();

        let config = Config::load(&db).unwrap();
        assert_eq!(config.user_quota, 1000);
        assert_eq!(config.group_quota, 2000);
        assert_eq!(config.file_limit, Some(10));
    }

    #[test]
    fn file_limit_special_values() {
        assert_eq!(parse_file_limit("0").unwrap(), Some(DEFAULT_FILE_LIMIT));
        assert_eq!(parse_file_limit("-1").unwrap(), None);
        assert_eq!(parse_file_limit(" 42 ").unwrap(), Some(42));
    }

    #[test]
    fn garbage_is_a_config_error() {
        let (_tmp, db) = test_db();
        db.set_setting(USER_QUOTA_KEY, "lots").unwrap();
        assert!(matches!(Config::load(&db), Err(Error::Config(_))));
    }

    #[test]
    fn quota_by_kind() {
        let config = Config::default();
        assert_eq!(config.quota_for(OwnerKind::User), DEFAULT_USER_QUOTA);
        assert_eq!(config.quota_for(OwnerKind::Group), 0);
    }
}
