//! Platform adapters: package manager and service manager queries per OS family
//!
//! Parsing and evaluation are shared across distributions; only the pieces
//! that differ (package tool, PAM stack file names, module config dirs)
//! live behind [`PlatformAdapter`].

use crate::exec::{CommandOutput, CommandRunner};
use hostaudit_core::{Error, Result};
use hostaudit_parsers::modules::MODPROBE_DIRS;
use hostaudit_parsers::{HostRoot, OsRelease};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Debian,
    RedHat,
}

impl PlatformFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformFamily::Debian => "debian",
            PlatformFamily::RedHat => "redhat",
        }
    }

    /// Family from os-release `ID` / `ID_LIKE`, Debian when unrecognized
    pub fn detect(release: &OsRelease) -> Self {
        for id in release.lineage() {
            match id {
                "debian" | "ubuntu" => return PlatformFamily::Debian,
                "rhel" | "centos" | "fedora" | "amzn" | "rocky" | "almalinux" => {
                    return PlatformFamily::RedHat
                }
                _ => {}
            }
        }
        PlatformFamily::Debian
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlatformFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "debian" | "ubuntu" => Ok(PlatformFamily::Debian),
            "redhat" | "rhel" => Ok(PlatformFamily::RedHat),
            other => Err(Error::InvalidConfig {
                key: "host.platform".into(),
                message: format!("unknown platform family '{}'", other),
            }),
        }
    }
}

/// Package installation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    Installed,
    NotInstalled,
}

impl PackageState {
    /// State from `dpkg-query -W --showformat=${Status}`
    ///
    /// Only an explicit not-installed answer counts as absent; anything else
    /// the tool says (partial states, database errors) is an error.
    pub fn from_dpkg(name: &str, output: &CommandOutput) -> Result<Self> {
        let status = output.stdout_trimmed();
        match status.split_whitespace().nth(2) {
            Some("installed") => return Ok(PackageState::Installed),
            Some("not-installed") | Some("config-files") => return Ok(PackageState::NotInstalled),
            _ => {}
        }
        if status.is_empty() && output.stderr.contains("no packages found") {
            return Ok(PackageState::NotInstalled);
        }
        Err(Error::CommandFailed {
            command: format!("dpkg-query -W {}", name),
            message: failure_message(output, status),
        })
    }

    /// State from `rpm -q`
    pub fn from_rpm(name: &str, output: &CommandOutput) -> Result<Self> {
        if output.stdout.contains("is not installed") {
            return Ok(PackageState::NotInstalled);
        }
        if output.success() && !output.stdout_trimmed().is_empty() {
            return Ok(PackageState::Installed);
        }
        Err(Error::CommandFailed {
            command: format!("rpm -q {}", name),
            message: failure_message(output, output.stdout_trimmed()),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageState::Installed => "installed",
            PackageState::NotInstalled => "not installed",
        }
    }
}

/// Unit file state as reported by `systemctl is-enabled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceEnablement {
    Enabled,
    EnabledRuntime,
    Static,
    Indirect,
    Alias,
    Generated,
    Disabled,
    Masked,
    NotFound,
    Other(String),
}

impl ServiceEnablement {
    pub fn parse(output: &CommandOutput) -> Self {
        match output.stdout_trimmed().lines().next().unwrap_or("").trim() {
            "enabled" => ServiceEnablement::Enabled,
            "enabled-runtime" => ServiceEnablement::EnabledRuntime,
            "static" => ServiceEnablement::Static,
            "indirect" => ServiceEnablement::Indirect,
            "alias" => ServiceEnablement::Alias,
            "generated" => ServiceEnablement::Generated,
            "disabled" => ServiceEnablement::Disabled,
            "masked" | "masked-runtime" => ServiceEnablement::Masked,
            "not-found" => ServiceEnablement::NotFound,
            "" if output.stderr.contains("No such file")
                || output.stderr.contains("not found")
                || output.stderr.contains("not-found") =>
            {
                ServiceEnablement::NotFound
            }
            other => ServiceEnablement::Other(other.to_string()),
        }
    }

    /// Unit will start at boot (directly or through another unit)
    pub fn is_enabled(&self) -> bool {
        matches!(
            self,
            ServiceEnablement::Enabled
                | ServiceEnablement::EnabledRuntime
                | ServiceEnablement::Static
                | ServiceEnablement::Indirect
                | ServiceEnablement::Alias
                | ServiceEnablement::Generated
        )
    }

    /// Unit cannot start at boot
    pub fn is_disabled(&self) -> bool {
        matches!(
            self,
            ServiceEnablement::Disabled | ServiceEnablement::Masked | ServiceEnablement::NotFound
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            ServiceEnablement::Enabled => "enabled",
            ServiceEnablement::EnabledRuntime => "enabled-runtime",
            ServiceEnablement::Static => "static",
            ServiceEnablement::Indirect => "indirect",
            ServiceEnablement::Alias => "alias",
            ServiceEnablement::Generated => "generated",
            ServiceEnablement::Disabled => "disabled",
            ServiceEnablement::Masked => "masked",
            ServiceEnablement::NotFound => "not-found",
            ServiceEnablement::Other(s) => s,
        }
    }
}

/// Runtime state as reported by `systemctl is-active`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceActivity {
    Active,
    Inactive,
    Failed,
    Other(String),
}

impl ServiceActivity {
    /// State from `systemctl is-active`, which prints a state whenever it
    /// reaches the service manager
    pub fn parse(output: &CommandOutput) -> Result<Self> {
        let state = match output.stdout_trimmed() {
            "" => {
                return Err(Error::CommandFailed {
                    command: "systemctl is-active".into(),
                    message: failure_message(output, ""),
                })
            }
            "active" | "reloading" | "activating" => ServiceActivity::Active,
            "inactive" | "deactivating" | "unknown" => ServiceActivity::Inactive,
            "failed" => ServiceActivity::Failed,
            other => ServiceActivity::Other(other.to_string()),
        };
        Ok(state)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ServiceActivity::Active)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ServiceActivity::Active => "active",
            ServiceActivity::Inactive => "inactive",
            ServiceActivity::Failed => "failed",
            ServiceActivity::Other(s) => s,
        }
    }
}

fn failure_message(output: &CommandOutput, stdout: &str) -> String {
    let stderr = output.stderr.trim();
    let code = output
        .code
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, false) => format!("exit {}: {}", code, stderr),
        (false, true) => format!("exit {}: unexpected output '{}'", code, stdout),
        (true, true) => format!("exit {}: no output", code),
    }
}

/// OS-specific capabilities the snapshot and evaluators rely on
pub trait PlatformAdapter: Send + Sync + fmt::Debug {
    fn family(&self) -> PlatformFamily;

    /// Query the package database
    fn package_state(&self, name: &str) -> Result<PackageState>;

    /// `systemctl is-enabled`
    fn service_enablement(&self, name: &str) -> Result<ServiceEnablement>;

    /// `systemctl is-active`
    fn service_activity(&self, name: &str) -> Result<ServiceActivity>;

    /// PAM service files parsed up front
    fn pam_stack_files(&self) -> &'static [&'static str];

    /// Directories holding modprobe configuration
    fn modprobe_dirs(&self) -> Vec<String> {
        MODPROBE_DIRS.iter().map(|d| d.to_string()).collect()
    }
}

const DEBIAN_PAM_FILES: &[&str] = &[
    "common-auth",
    "common-account",
    "common-password",
    "common-session",
    "common-session-noninteractive",
    "login",
    "sshd",
    "su",
    "sudo",
];

const REDHAT_PAM_FILES: &[&str] = &["system-auth", "password-auth", "login", "sshd", "su", "sudo"];

/// `systemctl` queries shared by every family
#[derive(Debug, Clone)]
struct Systemd {
    runner: CommandRunner,
    root: Option<String>,
}

impl Systemd {
    fn new(host: &HostRoot, timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(timeout),
            root: root_arg(host),
        }
    }

    fn is_enabled(&self, unit: &str) -> Result<ServiceEnablement> {
        let mut args = Vec::new();
        if let Some(root) = &self.root {
            args.push(format!("--root={}", root));
        }
        args.push("is-enabled".to_string());
        args.push(unit.to_string());

        let output = self.runner.run("systemctl", &args)?;
        let state = ServiceEnablement::parse(&output);
        debug!("systemctl is-enabled {} -> {}", unit, state.as_str());
        Ok(state)
    }

    fn is_active(&self, unit: &str) -> Result<ServiceActivity> {
        // Runtime state only exists on the live system
        if let Some(root) = &self.root {
            return Err(Error::CommandFailed {
                command: format!("systemctl is-active {}", unit),
                message: format!("runtime state unavailable for host root {}", root),
            });
        }
        let output = self.runner.run("systemctl", &["is-active", unit])?;
        let state = ServiceActivity::parse(&output)?;
        debug!("systemctl is-active {} -> {}", unit, state.as_str());
        Ok(state)
    }
}

fn root_arg(host: &HostRoot) -> Option<String> {
    (!host.is_system()).then(|| host.root().display().to_string())
}

/// Debian and Ubuntu: dpkg + systemd
#[derive(Debug, Clone)]
pub struct DebianPlatform {
    packages: CommandRunner,
    admin_dir: Option<String>,
    systemd: Systemd,
}

impl DebianPlatform {
    pub fn new(host: &HostRoot, package_timeout: Duration, service_timeout: Duration) -> Self {
        Self {
            packages: CommandRunner::new(package_timeout),
            admin_dir: root_arg(host)
                .map(|_| host.resolve("/var/lib/dpkg").display().to_string()),
            systemd: Systemd::new(host, service_timeout),
        }
    }
}

impl PlatformAdapter for DebianPlatform {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::Debian
    }

    fn package_state(&self, name: &str) -> Result<PackageState> {
        let mut args = Vec::new();
        if let Some(dir) = &self.admin_dir {
            args.push(format!("--admindir={}", dir));
        }
        args.extend(["-W", "--showformat=${Status}", name].map(String::from));

        let output = self.packages.run("dpkg-query", &args)?;
        PackageState::from_dpkg(name, &output)
    }

    fn service_enablement(&self, name: &str) -> Result<ServiceEnablement> {
        self.systemd.is_enabled(name)
    }

    fn service_activity(&self, name: &str) -> Result<ServiceActivity> {
        self.systemd.is_active(name)
    }

    fn pam_stack_files(&self) -> &'static [&'static str] {
        DEBIAN_PAM_FILES
    }
}

/// RHEL family: rpm + systemd
#[derive(Debug, Clone)]
pub struct RedHatPlatform {
    packages: CommandRunner,
    root: Option<String>,
    systemd: Systemd,
}

impl RedHatPlatform {
    pub fn new(host: &HostRoot, package_timeout: Duration, service_timeout: Duration) -> Self {
        Self {
            packages: CommandRunner::new(package_timeout),
            root: root_arg(host),
            systemd: Systemd::new(host, service_timeout),
        }
    }
}

impl PlatformAdapter for RedHatPlatform {
    fn family(&self) -> PlatformFamily {
        PlatformFamily::RedHat
    }

    fn package_state(&self, name: &str) -> Result<PackageState> {
        let mut args = Vec::new();
        if let Some(root) = &self.root {
            args.push("--root".to_string());
            args.push(root.clone());
        }
        args.push("-q".to_string());
        args.push(name.to_string());

        let output = self.packages.run("rpm", &args)?;
        PackageState::from_rpm(name, &output)
    }

    fn service_enablement(&self, name: &str) -> Result<ServiceEnablement> {
        self.systemd.is_enabled(name)
    }

    fn service_activity(&self, name: &str) -> Result<ServiceActivity> {
        self.systemd.is_active(name)
    }

    fn pam_stack_files(&self) -> &'static [&'static str] {
        REDHAT_PAM_FILES
    }
}

/// Adapter for a platform family
pub fn adapter_for(
    family: PlatformFamily,
    host: &HostRoot,
    package_timeout: Duration,
    service_timeout: Duration,
) -> Arc<dyn PlatformAdapter> {
    match family {
        PlatformFamily::Debian => Arc::new(DebianPlatform::new(host, package_timeout, service_timeout)),
        PlatformFamily::RedHat => Arc::new(RedHatPlatform::new(host, package_timeout, service_timeout)),
    }
}
