//! Host filesystem access: root-prefixed paths and symlink-safe reads
//!
//! Every read of host configuration goes through [`HostRoot`]. Paths are
//! always expressed as the audited host sees them (`/etc/sudoers`), then
//! re-rooted under the configured prefix, so the same code audits the live
//! system (`/`) or a mounted image / test fixture.

use hostaudit_core::{Error, Result};
use std::fs::{self, Metadata};
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

/// Filesystem prefix under which host paths are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoot {
    root: PathBuf,
}

impl HostRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The live system
    pub fn system() -> Self {
        Self::new("/")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_system(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Map a host path onto the local filesystem
    ///
    /// `..` components are resolved lexically and never climb above the root.
    pub fn resolve(&self, host_path: impl AsRef<Path>) -> PathBuf {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in host_path.as_ref().components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    resolved.pop();
                    depth -= 1;
                }
                _ => {}
            }
        }
        resolved
    }

    /// Map a local path back to the host's view of it
    pub fn host_path(&self, local: &Path) -> String {
        match local.strip_prefix(&self.root) {
            Ok(rel) => format!("/{}", rel.display()),
            Err(_) => local.display().to_string(),
        }
    }

    /// `lstat` a host path
    pub fn lstat(&self, host_path: &str) -> Result<Metadata> {
        lstat(&self.resolve(host_path), host_path)
    }

    pub fn exists(&self, host_path: &str) -> bool {
        fs::symlink_metadata(self.resolve(host_path)).is_ok()
    }

    pub fn is_dir(&self, host_path: &str) -> bool {
        fs::symlink_metadata(self.resolve(host_path))
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Read a host file, refusing symlinks
    pub fn read_secure(&self, host_path: &str) -> Result<String> {
        read_secure(&self.resolve(host_path), host_path, None)
    }

    /// Read a host file, refusing symlinks and files above `limit` bytes
    pub fn read_secure_limited(&self, host_path: &str, limit: u64) -> Result<String> {
        read_secure(&self.resolve(host_path), host_path, Some(limit))
    }

    /// Read a small host file (e.g. `/proc` entries) without symlink checks
    pub fn read_plain(&self, host_path: &str) -> Result<String> {
        let local = self.resolve(host_path);
        fs::read(&local)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| io_error(e, host_path))
    }

    /// Sorted names of the entries in a host directory
    pub fn list_dir(&self, host_path: &str) -> Result<Vec<String>> {
        let local = self.resolve(host_path);
        let entries = fs::read_dir(&local).map_err(|e| io_error(e, host_path))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl Default for HostRoot {
    fn default() -> Self {
        Self::system()
    }
}

/// Join a directory and a name using host path syntax
pub fn join_host(dir: &str, name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent directory of a host path
pub fn host_parent(path: &str) -> String {
    match Path::new(path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.display().to_string(),
        _ => String::from("/"),
    }
}

pub(crate) fn io_error(err: std::io::Error, display: &str) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::FileNotFound {
            path: display.to_string(),
        }
    } else {
        Error::Io(err)
    }
}

fn lstat(local: &Path, display: &str) -> Result<Metadata> {
    fs::symlink_metadata(local).map_err(|e| io_error(e, display))
}

/// `lstat`, reject symlinks, open, then confirm the opened file is the one inspected
pub fn read_secure(local: &Path, display: &str, limit: Option<u64>) -> Result<String> {
    let before = lstat(local, display)?;

    if before.file_type().is_symlink() {
        return Err(Error::SymlinkRejected {
            path: display.to_string(),
        });
    }
    if !before.is_file() {
        return Err(Error::NotRegularFile {
            path: display.to_string(),
        });
    }
    if let Some(limit) = limit {
        if before.len() > limit {
            return Err(Error::FileTooLarge {
                path: display.to_string(),
                size: before.len(),
                limit,
            });
        }
    }

    let mut file = fs::File::open(local).map_err(|e| io_error(e, display))?;
    let opened = file.metadata()?;
    if opened.dev() != before.dev() || opened.ino() != before.ino() {
        // Swapped between lstat and open
        return Err(Error::SymlinkRejected {
            path: display.to_string(),
        });
    }

    let mut bytes = Vec::new();
    match limit {
        Some(limit) => {
            file.take(limit + 1).read_to_end(&mut bytes)?;
            if bytes.len() as u64 > limit {
                return Err(Error::FileTooLarge {
                    path: display.to_string(),
                    size: bytes.len() as u64,
                    limit,
                });
            }
        }
        None => {
            file.read_to_end(&mut bytes)?;
        }
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_stays_under_root() {
        let host = HostRoot::new("/srv/image");
        assert_eq!(host.resolve("/etc/fstab"), PathBuf::from("/srv/image/etc/fstab"));
        assert_eq!(
            host.resolve("/etc/../../../shadow"),
            PathBuf::from("/srv/image/shadow")
        );
        assert_eq!(HostRoot::system().resolve("/proc/mounts"), PathBuf::from("/proc/mounts"));
    }

    #[test]
    fn test_host_path_round_trip() {
        let host = HostRoot::new("/srv/image");
        let local = host.resolve("/etc/ssh/sshd_config");
        assert_eq!(host.host_path(&local), "/etc/ssh/sshd_config");
    }

    #[test]
    fn test_read_secure_rejects_symlink() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/real"), "data").unwrap();
        symlink(dir.path().join("etc/real"), dir.path().join("etc/link")).unwrap();

        let host = HostRoot::new(dir.path());
        assert_eq!(host.read_secure("/etc/real").unwrap(), "data");
        assert!(matches!(
            host.read_secure("/etc/link"),
            Err(Error::SymlinkRejected { .. })
        ));
        assert!(matches!(
            host.read_secure("/etc/absent"),
            Err(Error::FileNotFound { .. })
        ));
        assert!(matches!(
            host.read_secure("/etc"),
            Err(Error::NotRegularFile { .. })
        ));
    }

    #[test]
    fn test_read_secure_limit() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big"), "0123456789").unwrap();
        let host = HostRoot::new(dir.path());

        assert!(host.read_secure_limited("/big", 10).is_ok());
        assert!(matches!(
            host.read_secure_limited("/big", 4),
            Err(Error::FileTooLarge { size: 10, .. })
        ));
    }

    #[test]
    fn test_join_host() {
        assert_eq!(join_host("/etc/pam.d", "common-auth"), "/etc/pam.d/common-auth");
        assert_eq!(join_host("/etc/pam.d/", "su"), "/etc/pam.d/su");
        assert_eq!(join_host("/etc/pam.d", "/opt/pam/x"), "/opt/pam/x");
        assert_eq!(host_parent("/etc/ssh/sshd_config"), "/etc/ssh");
    }
}
