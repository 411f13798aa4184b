//! Account database lookups (`/etc/passwd`, `/etc/group`)

use crate::host::HostRoot;
use std::collections::BTreeMap;
use tracing::debug;

pub const PASSWD: &str = "/etc/passwd";
pub const GROUP: &str = "/etc/group";

/// uid/gid to name tables read once from the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accounts {
    users: BTreeMap<u32, String>,
    groups: BTreeMap<u32, String>,
}

impl Accounts {
    pub fn load(host: &HostRoot) -> Self {
        let users = read_table(host, PASSWD);
        let groups = read_table(host, GROUP);
        debug!("Loaded {} users and {} groups", users.len(), groups.len());
        Self { users, groups }
    }

    pub fn from_content(passwd: &str, group: &str) -> Self {
        Self {
            users: parse_table(passwd),
            groups: parse_table(group),
        }
    }

    /// User name for a uid, or the uid itself
    pub fn username(&self, uid: u32) -> String {
        self.users
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| uid.to_string())
    }

    /// Group name for a gid, or the gid itself
    pub fn groupname(&self, gid: u32) -> String {
        self.groups
            .get(&gid)
            .cloned()
            .unwrap_or_else(|| gid.to_string())
    }
}

fn read_table(host: &HostRoot, path: &str) -> BTreeMap<u32, String> {
    host.read_secure(path)
        .map(|content| parse_table(&content))
        .unwrap_or_default()
}

/// `name:x:id:...` lines; the first entry for an id wins, as with getpwuid
fn parse_table(content: &str) -> BTreeMap<u32, String> {
    let mut table = BTreeMap::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3 {
            if let Ok(id) = parts[2].parse::<u32>() {
                table.entry(id).or_insert_with(|| parts[0].to_string());
            }
        }
    }
    table
}
