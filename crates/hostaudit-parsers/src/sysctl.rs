//! Kernel parameter sources: the live `/proc/sys` tree and persisted sysctl config

use crate::host::{join_host, HostRoot};
use hostaudit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const PROC_SYS: &str = "/proc/sys";
pub const SYSCTL_CONF: &str = "/etc/sysctl.conf";
pub const SYSCTL_D: &str = "/etc/sysctl.d";

/// A persisted parameter value and the file that set it last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedValue {
    pub value: String,
    pub source: String,
}

/// Canonical parameter name: `/` separators become `.`
pub fn normalize_key(key: &str) -> String {
    key.trim().trim_matches('/').replace('/', ".")
}

/// Collapse internal whitespace (tabs in multi-value entries) to single spaces
pub fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse one sysctl config file into ordered `(key, value)` pairs
pub fn parse_conf(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            // Leading '-' only tells sysctl to ignore failures
            let key = normalize_key(key.trim().trim_start_matches('-'));
            if key.is_empty() {
                return None;
            }
            Some((key, normalize_value(value)))
        })
        .collect()
}

/// Load persisted values from `/etc/sysctl.conf` then `/etc/sysctl.d/*.conf`
///
/// Files are applied in order and later files override earlier keys.
/// Symlinked files are skipped and never trusted as a persistence source.
pub fn load_persistent(host: &HostRoot) -> BTreeMap<String, PersistedValue> {
    let mut files = vec![SYSCTL_CONF.to_string()];
    match host.list_dir(SYSCTL_D) {
        Ok(names) => files.extend(
            names
                .into_iter()
                .filter(|n| n.ends_with(".conf"))
                .map(|n| join_host(SYSCTL_D, &n)),
        ),
        Err(Error::FileNotFound { .. }) => {}
        Err(e) => warn!("Cannot list {}: {}", SYSCTL_D, e),
    }

    let mut persisted = BTreeMap::new();
    for file in &files {
        let content = match host.read_secure(file) {
            Ok(content) => content,
            Err(Error::FileNotFound { .. }) => continue,
            Err(e) => {
                warn!("Skipping sysctl config {}: {}", file, e);
                continue;
            }
        };
        for (key, value) in parse_conf(&content) {
            persisted.insert(
                key,
                PersistedValue {
                    value,
                    source: file.clone(),
                },
            );
        }
    }

    debug!("Loaded {} persisted sysctl values", persisted.len());
    persisted
}

/// Read every readable parameter under `/proc/sys`
pub fn read_runtime(host: &HostRoot) -> BTreeMap<String, String> {
    let base = host.resolve(PROC_SYS);
    let mut runtime = BTreeMap::new();

    for entry in WalkDir::new(&base)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Ok(rel) = entry.path().strip_prefix(&base) else {
            continue;
        };
        // Write-only and permission-protected entries are skipped
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        let key = normalize_key(&rel.to_string_lossy());
        runtime.insert(key, normalize_value(&String::from_utf8_lossy(&bytes)));
    }

    debug!("Read {} runtime sysctl values", runtime.len());
    runtime
}

/// Read a single live parameter without walking the tree
pub fn read_runtime_key(host: &HostRoot, key: &str) -> Result<String> {
    let path = format!("{}/{}", PROC_SYS, normalize_key(key).replace('.', "/"));
    host.read_plain(&path).map(|v| normalize_value(&v))
}
