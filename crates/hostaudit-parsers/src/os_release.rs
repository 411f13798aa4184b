//! `/etc/os-release` identification

use crate::host::HostRoot;
use hostaudit_core::{Error, Result};
use serde::{Deserialize, Serialize};

pub const OS_RELEASE: &str = "/etc/os-release";
const OS_RELEASE_FALLBACK: &str = "/usr/lib/os-release";

/// Distribution identification fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRelease {
    pub name: String,
    pub version: String,
    pub version_id: String,
    pub id: String,
    /// Space separated parent distributions
    pub id_like: Vec<String>,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let mut release = OsRelease::default();

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();

            match key.trim() {
                "NAME" => release.name = value,
                "VERSION" => release.version = value,
                "VERSION_ID" => release.version_id = value,
                "ID" => release.id = value.to_lowercase(),
                "ID_LIKE" => {
                    release.id_like = value
                        .split_whitespace()
                        .map(|s| s.to_lowercase())
                        .collect()
                }
                _ => {}
            }
        }

        release
    }

    /// Load from `/etc/os-release`, falling back to `/usr/lib/os-release`
    pub fn load(host: &HostRoot) -> Result<Self> {
        match host.read_secure(OS_RELEASE) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(Error::FileNotFound { .. }) | Err(Error::SymlinkRejected { .. }) => {
                // /etc/os-release is commonly a symlink into /usr/lib
                host.read_plain(OS_RELEASE_FALLBACK)
                    .map(|content| Self::parse(&content))
            }
            Err(e) => Err(e),
        }
    }

    /// `ID` followed by `ID_LIKE` entries
    pub fn lineage(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.id_like.iter().map(String::as_str))
    }

    /// Human readable OS version, preferring `VERSION`
    pub fn display_version(&self) -> &str {
        if self.version.is_empty() {
            &self.version_id
        } else {
            &self.version
        }
    }
}
