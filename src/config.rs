//! Global configuration shared by every source driver.
//!
//! Settings are loaded from TOML. The persist store is a runtime attachment and
//! never part of the serialized form.

use crate::error::{Result, SourceError};
use crate::persist::PersistStore;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// `major.minor` version declared by a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ConfigVersion {
    pub major: u16,
    pub minor: u16,
}

impl ConfigVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// The version written by configurations for this release.
pub const CURRENT_VERSION: ConfigVersion = ConfigVersion::new(4, 0);

/// Below this version pipe() sources keep expecting a hostname in messages.
pub const COMPAT_PIPE_HOSTNAME: ConfigVersion = ConfigVersion::new(3, 2);

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ConfigVersion {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SourceError::config(format!("invalid config version: {s:?}"));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for ConfigVersion {
    type Error = SourceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Process-wide configuration handed to drivers at construction and init.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    pub version: ConfigVersion,
    /// Permission bits for created files and FIFOs
    pub file_perm: u32,
    /// Permission bits for created parent directories
    pub dir_perm: u32,
    /// Maximum message size in bytes
    pub log_msg_size: usize,
    /// Where restore-state offsets are saved; memory only when unset
    pub persist_file: Option<PathBuf>,
    #[serde(skip)]
    persist: Option<Arc<PersistStore>>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            file_perm: 0o600,
            dir_perm: 0o700,
            log_msg_size: 65536,
            persist_file: None,
            persist: None,
        }
    }
}

impl GlobalConfig {
    /// Default configuration file location (`$XDG_CONFIG_HOME/filesrc/filesrc.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("filesrc").join("filesrc.toml"))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SourceError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SourceError::filesystem(format!("Failed to read config: {}", path.display()), e)
        })?;
        Self::from_toml(&text)
    }

    /// Configuration declaring the given version, everything else default
    pub fn with_version(version: ConfigVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn is_version_older(&self, threshold: ConfigVersion) -> bool {
        self.version < threshold
    }

    fn validate(&self) -> Result<()> {
        if self.log_msg_size == 0 {
            return Err(SourceError::config("log_msg_size must be positive"));
        }
        if self.file_perm > 0o7777 || self.dir_perm > 0o7777 {
            return Err(SourceError::config("permission bits out of range"));
        }
        Ok(())
    }

    /// Attach the persist store readers save their positions into
    pub fn attach_persist(&mut self, store: Arc<PersistStore>) {
        self.persist = Some(store);
    }

    pub fn persist(&self) -> Option<&Arc<PersistStore>> {
        self.persist.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let cfg = GlobalConfig::default();
        assert_eq!(cfg.version, CURRENT_VERSION);
        assert_eq!(cfg.file_perm, 0o600);
        assert_eq!(cfg.log_msg_size, 65536);
        assert!(cfg.persist().is_none());
    }

    #[test]
    fn test_from_toml() {
        let cfg = GlobalConfig::from_toml(
            r#"
            version = "3.1"
            file_perm = 0o644
            persist_file = "/var/lib/filesrc/state.toml"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.version, ConfigVersion::new(3, 1));
        assert_eq!(cfg.file_perm, 0o644);
        assert_eq!(cfg.dir_perm, 0o700);
        assert!(cfg.is_version_older(COMPAT_PIPE_HOSTNAME));
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(GlobalConfig::from_toml("version = \"four\"").is_err());
        assert!(GlobalConfig::from_toml("log_msg_size = 0").is_err());
        assert!(GlobalConfig::from_toml("unknown_key = 1").is_err());
    }

    #[test]
    fn test_version_threshold() {
        assert!(!GlobalConfig::with_version(COMPAT_PIPE_HOSTNAME).is_version_older(COMPAT_PIPE_HOSTNAME));
        assert!(GlobalConfig::with_version(ConfigVersion::new(2, 9)).is_version_older(COMPAT_PIPE_HOSTNAME));
    }

    proptest! {
        #[test]
        fn version_parse_matches_display(major in 0u16..100, minor in 0u16..100) {
            let version = ConfigVersion::new(major, minor);
            prop_assert_eq!(version.to_string().parse::<ConfigVersion>().unwrap(), version);
        }

        #[test]
        fn version_order_is_lexicographic(a in (0u16..10, 0u16..10), b in (0u16..10, 0u16..10)) {
            let lhs = ConfigVersion::new(a.0, a.1);
            let rhs = ConfigVersion::new(b.0, b.1);
            prop_assert_eq!(lhs < rhs, a < b);
        }
    }
}
