//! Kernel module state: loaded modules, modprobe deny rules and on-disk inventory

use crate::host::{join_host, HostRoot};
use hostaudit_core::Error;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const PROC_MODULES: &str = "/proc/modules";

/// Directories modprobe reads configuration from
pub const MODPROBE_DIRS: &[&str] = &[
    "/etc/modprobe.d",
    "/run/modprobe.d",
    "/usr/lib/modprobe.d",
    "/lib/modprobe.d",
];

const MODULE_SUFFIXES: &[&str] = &[".ko", ".ko.xz", ".ko.zst", ".ko.gz"];

const NOOP_INSTALL_TARGETS: &[&str] = &["/bin/true", "/bin/false", "/usr/bin/true", "/usr/bin/false"];

/// Canonical module name; the kernel treats `-` and `_` as the same
pub fn normalize_module(name: &str) -> String {
    name.trim().replace('-', "_")
}

/// Module name from a module file name (`cramfs.ko.zst` -> `cramfs`)
pub fn module_from_file(file_name: &str) -> Option<String> {
    MODULE_SUFFIXES
        .iter()
        .rev()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
        .map(normalize_module)
}

/// Names in `/proc/modules` (first field of each line)
pub fn parse_proc_modules(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(normalize_module)
        .collect()
}

/// Modules a modprobe config denies, via `blacklist` or a no-op `install`
pub fn parse_modprobe_conf(content: &str) -> BTreeSet<String> {
    let mut denied = BTreeSet::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["blacklist", module, ..] => {
                denied.insert(normalize_module(module));
            }
            ["install", module, target, ..] if NOOP_INSTALL_TARGETS.contains(target) => {
                denied.insert(normalize_module(module));
            }
            _ => {}
        }
    }
    denied
}

/// Collect denied modules from every `*.conf` in the given modprobe directories
///
/// Symlinked files are skipped.
pub fn load_blacklist(host: &HostRoot, dirs: &[String]) -> BTreeSet<String> {
    let mut denied = BTreeSet::new();
    for dir in dirs {
        let names = match host.list_dir(dir) {
            Ok(names) => names,
            Err(Error::FileNotFound { .. }) => continue,
            Err(e) => {
                warn!("Cannot list {}: {}", dir, e);
                continue;
            }
        };
        for name in names.iter().filter(|n| n.ends_with(".conf")) {
            let path = join_host(dir, name);
            match host.read_secure(&path) {
                Ok(content) => denied.extend(parse_modprobe_conf(&content)),
                Err(e) => debug!("Skipping modprobe config {}: {}", path, e),
            }
        }
    }
    denied
}

/// Module keys from a `modules.dep` file
pub fn parse_modules_dep(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(path, _)| path.contains(".ko"))
        .filter_map(|(path, _)| {
            let file = path.trim().rsplit('/').next()?;
            module_from_file(file)
        })
        .collect()
}

/// Modules present on disk for a kernel release
pub fn load_available(host: &HostRoot, kernel_release: &str) -> BTreeSet<String> {
    let modules_dir = format!("/lib/modules/{}", kernel_release);
    let tree = host.resolve(format!("{}/kernel", modules_dir));

    let mut available: BTreeSet<String> = WalkDir::new(&tree)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| module_from_file(&e.file_name().to_string_lossy()))
        .collect();

    let dep_path = format!("{}/modules.dep", modules_dir);
    match host.read_secure(&dep_path) {
        Ok(content) => available.extend(parse_modules_dep(&content)),
        Err(Error::FileNotFound { .. }) => {}
        Err(e) => warn!("Cannot read {}: {}", dep_path, e),
    }

    debug!(
        "Found {} available modules for kernel {}",
        available.len(),
        kernel_release
    );
    available
}
