//! Mount table parsers for `/proc/mounts` and `/etc/fstab`

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const PROC_MOUNTS: &str = "/proc/mounts";
pub const FSTAB: &str = "/etc/fstab";

/// One mounted (or declared) filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub device: String,
    pub fs_type: String,
    /// Option names; `key=value` options are stored by key only
    pub options: BTreeSet<String>,
}

impl MountInfo {
    pub fn has_option(&self, option: &str) -> bool {
        let key = option.split_once('=').map(|(k, _)| k).unwrap_or(option);
        self.options.contains(key)
    }

    pub fn options_display(&self) -> String {
        self.options.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Mount point to mount info
pub type MountTable = BTreeMap<String, MountInfo>;

/// Parse the live mount table; the last mount on a point is the visible one
pub fn parse_proc_mounts(content: &str) -> MountTable {
    parse_table(content, 4)
}

/// Parse fstab; swap and `none` mount points are skipped
pub fn parse_fstab(content: &str) -> MountTable {
    parse_table(content, 3)
}

fn parse_table(content: &str, min_fields: usize) -> MountTable {
    let mut table = MountTable::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < min_fields {
            continue;
        }

        let mount_point = unescape(fields[1]);
        if mount_point == "none" || mount_point == "swap" || fields[2] == "swap" {
            continue;
        }

        table.insert(
            mount_point,
            MountInfo {
                device: unescape(fields[0]),
                fs_type: fields[2].to_string(),
                options: parse_options(fields.get(3).copied().unwrap_or("")),
            },
        );
    }

    table
}

/// Split a comma separated option field into option names
pub fn parse_options(field: &str) -> BTreeSet<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| o.split_once('=').map(|(k, _)| k).unwrap_or(o).to_string())
        .collect()
}

/// Decode the octal escapes the kernel uses for whitespace and backslashes
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_proc_mounts() {
        let table = parse_proc_mounts(
            "/dev/sda2 / ext4 rw,relatime 0 0\ntmpfs /tmp tmpfs rw,nosuid,nodev,size=2048k,mode=1777 0 0\n/dev/sdb1 /mnt/My\\040Disk vfat rw 0 0\nshort line\n",
        );
        assert_eq!(table.len(), 3);

        let tmp = &table["/tmp"];
        assert_eq!(tmp.fs_type, "tmpfs");
        assert!(tmp.has_option("nodev"));
        assert!(tmp.has_option("size"));
        assert!(tmp.has_option("size=4096k"));
        assert!(!tmp.has_option("noexec"));
        assert!(table.contains_key("/mnt/My Disk"));
    }

    #[test]
    fn test_fstab_options_optional() {
        let table = parse_fstab(
            "# /etc/fstab\nUUID=abc / ext4 defaults 0 1\nUUID=def none swap sw 0 0\n/dev/sdc1 /var/tmp xfs\nUUID=123 /home ext4 defaults,nodev 0 2\n",
        );
        assert_eq!(table.len(), 3);
        assert!(table["/var/tmp"].options.is_empty());
        assert!(table["/home"].has_option("nodev"));
        assert_eq!(table["/"].device, "UUID=abc");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("/mnt/a\\040b"), "/mnt/a b");
        assert_eq!(unescape("/mnt/back\\134slash"), "/mnt/back\\slash");
        assert_eq!(unescape("/mnt/trailing\\04"), "/mnt/trailing\\04");
    }
}
