//! Immutable, point-in-time view of host configuration for one audit run

use crate::platform::{
    adapter_for, PackageState, PlatformAdapter, PlatformFamily, ServiceActivity, ServiceEnablement,
};
use chrono::{DateTime, Utc};
use hostaudit_common::AuditConfig;
use hostaudit_core::{Error, ErrorKind, Evidence, EvidenceMethod, Outcome, Result};
use hostaudit_parsers::modules::{self, PROC_MODULES};
use hostaudit_parsers::mounts::{self, FSTAB, PROC_MOUNTS};
use hostaudit_parsers::pam::PAM_DIR;
use hostaudit_parsers::sshd::SSHD_CONFIG;
use hostaudit_parsers::sudoers::SUDOERS;
use hostaudit_parsers::sysctl::{self, PersistedValue};
use hostaudit_parsers::{
    join_host, Accounts, HostRoot, MountTable, OsRelease, PamEntry, PamParser, SshdConfig,
    SshdParser, SudoDefaults, SudoersParser,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const IPV6_DISABLE_KEY: &str = "net.ipv6.conf.all.disable_ipv6";

/// Host identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub os_id: String,
    pub kernel_release: Option<String>,
    pub platform: PlatformFamily,
    pub scanned_at: DateTime<Utc>,
}

/// Live and persisted kernel parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SysctlState {
    pub runtime: BTreeMap<String, String>,
    pub persistent: BTreeMap<String, PersistedValue>,
    pub ipv6_enabled: bool,
}

impl SysctlState {
    pub fn runtime_value(&self, param: &str) -> Option<&str> {
        self.runtime.get(param).map(String::as_str)
    }

    pub fn persisted(&self, param: &str) -> Option<&PersistedValue> {
        self.persistent.get(param)
    }

    /// IPv6 parameters only apply while IPv6 is enabled
    pub fn is_applicable(&self, param: &str) -> bool {
        self.ipv6_enabled || !param.contains("ipv6")
    }

    /// Whether any sysctl config declares anything at all
    pub fn has_persistent_config(&self) -> bool {
        !self.persistent.is_empty()
    }
}

/// Live mount table and fstab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountState {
    pub runtime: MountTable,
    pub fstab: MountTable,
}

/// Loaded, denied and installed kernel modules, names normalized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelState {
    pub loaded: BTreeSet<String>,
    pub blacklisted: BTreeSet<String>,
    pub available: BTreeSet<String>,
}

/// Module status used by the module evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub loaded: bool,
    pub blacklisted: bool,
    pub exists: bool,
}

impl KernelState {
    pub fn module_info(&self, module: &str) -> ModuleInfo {
        let name = modules::normalize_module(module);
        ModuleInfo {
            loaded: self.loaded.contains(&name),
            blacklisted: self.blacklisted.contains(&name),
            exists: self.available.contains(&name),
        }
    }
}

/// A read or parse failure captured at snapshot time
///
/// Stored instead of the error itself so the snapshot stays cloneable and
/// the failure surfaces on every rule that depends on the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub path: String,
    pub message: String,
    pub code: &'static str,
    pub kind: ErrorKind,
}

impl SourceError {
    pub fn new(path: impl Into<String>, err: &Error) -> Self {
        Self {
            path: path.into(),
            message: err.to_string(),
            code: err.code(),
            kind: err.kind(),
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == ErrorKind::Symlink
    }

    /// ERROR outcome naming the failed source
    pub fn to_outcome(&self) -> Outcome {
        let method = match self.kind {
            ErrorKind::Symlink | ErrorKind::Limit => EvidenceMethod::File,
            _ => EvidenceMethod::Error,
        };
        Outcome::error(
            self.message.clone(),
            self.kind,
            Evidence::new(method, self.path.clone(), self.code),
        )
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Everything rules are evaluated against
///
/// Built once by [`SnapshotBuilder`] and only ever shared by reference.
/// Services and packages are not collected up front; they are queried
/// through the platform adapter when a rule asks for them.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: Meta,
    pub sysctl: SysctlState,
    pub mounts: MountState,
    pub kernel: KernelState,
    /// Pre-parsed PAM stacks keyed by host path
    pub pam: BTreeMap<String, SourceResult<Vec<PamEntry>>>,
    pub sudo: SourceResult<SudoDefaults>,
    pub ssh: SourceResult<SshdConfig>,
    pub accounts: Accounts,
    host: HostRoot,
    platform: Arc<dyn PlatformAdapter>,
    max_include_depth: usize,
}

impl Snapshot {
    pub fn host(&self) -> &HostRoot {
        &self.host
    }

    pub fn platform(&self) -> &dyn PlatformAdapter {
        self.platform.as_ref()
    }

    /// Host path of a PAM service, accepting bare names or absolute paths
    pub fn pam_path(&self, file: &str) -> String {
        join_host(PAM_DIR, file)
    }

    /// Entries of a PAM service; files outside the pre-parsed set are parsed now
    pub fn pam_entries(&self, file: &str) -> SourceResult<Cow<'_, [PamEntry]>> {
        let path = self.pam_path(file);
        if let Some(cached) = self.pam.get(&path) {
            return cached
                .as_ref()
                .map(|entries| Cow::Borrowed(entries.as_slice()))
                .map_err(Clone::clone);
        }

        PamParser::new(&self.host)
            .with_max_depth(self.max_include_depth)
            .parse(&path)
            .map(Cow::Owned)
            .map_err(|e| SourceError::new(&path, &e))
    }

    pub fn service_enablement(&self, name: &str) -> Result<ServiceEnablement> {
        self.platform.service_enablement(&unit_name(name))
    }

    pub fn service_activity(&self, name: &str) -> Result<ServiceActivity> {
        self.platform.service_activity(&unit_name(name))
    }

    pub fn package_state(&self, name: &str) -> Result<PackageState> {
        self.platform.package_state(name)
    }
}

/// `sshd` -> `sshd.service`; names with a unit suffix are kept
fn unit_name(name: &str) -> String {
    const SUFFIXES: &[&str] = &[".service", ".socket", ".timer", ".target", ".mount", ".path"];
    let name = name.trim();
    if SUFFIXES.iter().any(|s| name.ends_with(s)) {
        name.to_string()
    } else {
        format!("{}.service", name)
    }
}

/// Collects host state into a [`Snapshot`]
pub struct SnapshotBuilder {
    config: AuditConfig,
    host: HostRoot,
    platform: Option<Arc<dyn PlatformAdapter>>,
}

impl SnapshotBuilder {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            host: HostRoot::new(config.host.root.clone()),
            config: config.clone(),
            platform: None,
        }
    }

    /// Use a specific platform adapter instead of detecting one
    pub fn with_platform(mut self, platform: Arc<dyn PlatformAdapter>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Read and parse everything; individual failures are recorded, never raised
    pub fn build(self) -> Snapshot {
        info!("Building snapshot of {}", self.host.root().display());

        let release = OsRelease::load(&self.host).unwrap_or_else(|e| {
            warn!("Cannot read os-release: {}", e);
            OsRelease::default()
        });
        let platform = self.resolve_platform(&release);

        let sysctl = self.collect_sysctl();
        let kernel_release = self
            .config
            .host
            .kernel_release
            .clone()
            .or_else(|| sysctl.runtime_value("kernel.osrelease").map(String::from));

        let meta = Meta {
            hostname: self.hostname(&sysctl),
            os_name: release.name.clone(),
            os_version: release.display_version().to_string(),
            os_id: release.id.clone(),
            kernel_release: kernel_release.clone(),
            platform: platform.family(),
            scanned_at: Utc::now(),
        };

        let mounts = self.collect_mounts();
        let kernel = self.collect_kernel(platform.as_ref(), kernel_release.as_deref());
        let pam = self.collect_pam(platform.as_ref());

        let depth = self.config.limits.max_include_depth;
        let sudo = SudoersParser::new(&self.host)
            .with_max_depth(depth)
            .parse(SUDOERS)
            .map_err(|e| source_failure(SUDOERS, &e));
        let ssh = SshdParser::new(&self.host)
            .with_max_depth(depth)
            .parse(SSHD_CONFIG)
            .map_err(|e| source_failure(SSHD_CONFIG, &e));

        let accounts = Accounts::load(&self.host);

        info!(
            "Snapshot ready: {} ({} {}), {} runtime sysctl keys, {} mounts, {} loaded modules, {} PAM files",
            meta.hostname,
            meta.os_name,
            meta.os_version,
            sysctl.runtime.len(),
            mounts.runtime.len(),
            kernel.loaded.len(),
            pam.len()
        );

        Snapshot {
            meta,
            sysctl,
            mounts,
            kernel,
            pam,
            sudo,
            ssh,
            accounts,
            host: self.host,
            platform,
            max_include_depth: depth,
        }
    }

    fn resolve_platform(&self, release: &OsRelease) -> Arc<dyn PlatformAdapter> {
        if let Some(platform) = &self.platform {
            return Arc::clone(platform);
        }

        let family = match self.config.host.platform.as_deref() {
            Some(forced) => forced.parse().unwrap_or_else(|e| {
                warn!("{}; detecting platform instead", e);
                PlatformFamily::detect(release)
            }),
            None => PlatformFamily::detect(release),
        };
        debug!("Platform family: {}", family);

        adapter_for(
            family,
            &self.host,
            self.config.timeouts.package_query(),
            self.config.timeouts.service_query(),
        )
    }

    fn hostname(&self, sysctl: &SysctlState) -> String {
        if let Some(name) = sysctl.runtime_value("kernel.hostname") {
            return name.to_string();
        }
        if self.host.is_system() {
            if let Ok(name) = hostname::get() {
                return name.to_string_lossy().into_owned();
            }
        }
        String::from("unknown")
    }

    fn collect_sysctl(&self) -> SysctlState {
        let runtime = sysctl::read_runtime(&self.host);
        let persistent = sysctl::load_persistent(&self.host);
        let ipv6_enabled = runtime.get(IPV6_DISABLE_KEY).map(String::as_str) != Some("1");

        SysctlState {
            runtime,
            persistent,
            ipv6_enabled,
        }
    }

    fn collect_mounts(&self) -> MountState {
        let runtime = match self.host.read_plain(PROC_MOUNTS) {
            Ok(content) => mounts::parse_proc_mounts(&content),
            Err(e) => {
                warn!("Cannot read {}: {}", PROC_MOUNTS, e);
                MountTable::new()
            }
        };
        let fstab = match self.host.read_secure(FSTAB) {
            Ok(content) => mounts::parse_fstab(&content),
            Err(e) => {
                warn!("Cannot read {}: {}", FSTAB, e);
                MountTable::new()
            }
        };
        debug!("Mounts: {} live, {} in fstab", runtime.len(), fstab.len());

        MountState { runtime, fstab }
    }

    fn collect_kernel(
        &self,
        platform: &dyn PlatformAdapter,
        kernel_release: Option<&str>,
    ) -> KernelState {
        let loaded = match self.host.read_plain(PROC_MODULES) {
            Ok(content) => modules::parse_proc_modules(&content),
            Err(e) => {
                warn!("Cannot read {}: {}", PROC_MODULES, e);
                BTreeSet::new()
            }
        };
        let blacklisted = modules::load_blacklist(&self.host, &platform.modprobe_dirs());

        let mut available = match kernel_release {
            Some(release) => modules::load_available(&self.host, release),
            None => {
                warn!("Kernel release unknown; module inventory limited to loaded modules");
                BTreeSet::new()
            }
        };
        available.extend(loaded.iter().cloned());

        debug!(
            "Kernel modules: {} loaded, {} blacklisted, {} available",
            loaded.len(),
            blacklisted.len(),
            available.len()
        );

        KernelState {
            loaded,
            blacklisted,
            available,
        }
    }

    fn collect_pam(
        &self,
        platform: &dyn PlatformAdapter,
    ) -> BTreeMap<String, SourceResult<Vec<PamEntry>>> {
        let parser = PamParser::new(&self.host).with_max_depth(self.config.limits.max_include_depth);

        platform
            .pam_stack_files()
            .iter()
            .map(|name| {
                let path = join_host(PAM_DIR, name);
                let parsed = parser.parse(&path).map_err(|e| {
                    debug!("PAM stack {} unavailable: {}", path, e);
                    SourceError::new(&path, &e)
                });
                (path, parsed)
            })
            .collect()
    }
}

fn source_failure(path: &str, err: &Error) -> SourceError {
    match err {
        Error::FileNotFound { .. } => debug!("{} not present", path),
        _ => warn!("Cannot parse {}: {}", path, err),
    }
    SourceError::new(path, err)
}
