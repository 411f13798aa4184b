//! Configuration management for hostaudit

use hostaudit_core::{Error, ReductionPolicy, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Which host is audited and how it is identified
    #[serde(default)]
    pub host: HostConfig,

    /// Subprocess timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Read and recursion limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Sysctl evaluation settings
    #[serde(default)]
    pub sysctl: SysctlConfig,

    /// Status reduction policy
    #[serde(default)]
    pub reduction: ReductionConfig,

    /// Rule selection
    #[serde(default)]
    pub audit: AuditRunConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AuditConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder
    pub fn builder() -> AuditConfigBuilder {
        AuditConfigBuilder::new()
    }

    /// Merge with environment variables (HOSTAUDIT_ prefix)
    pub fn merge_env(self) -> Self {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Merge overrides from any key lookup; `merge_env` uses the process environment
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Host
        if let Some(val) = lookup("HOSTAUDIT_ROOT") {
            self.host.root = PathBuf::from(val);
        }
        if let Some(val) = lookup("HOSTAUDIT_PLATFORM") {
            self.host.platform = Some(val);
        }
        if let Some(val) = lookup("HOSTAUDIT_KERNEL_RELEASE") {
            self.host.kernel_release = Some(val);
        }

        // Timeouts
        if let Some(n) = lookup("HOSTAUDIT_SERVICE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.timeouts.service_query_secs = n;
        }
        if let Some(n) = lookup("HOSTAUDIT_PACKAGE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.timeouts.package_query_secs = n;
        }
        if let Some(n) = lookup("HOSTAUDIT_COMMAND_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.timeouts.command_secs = n;
        }

        // Reduction and selection
        if let Some(policy) = lookup("HOSTAUDIT_REDUCTION_POLICY").and_then(|v| v.parse().ok()) {
            self.reduction.default_policy = policy;
        }
        if let Some(level) = lookup("HOSTAUDIT_MAX_PROFILE_LEVEL").and_then(|v| v.parse().ok()) {
            self.audit.max_profile_level = Some(level);
        }

        // Logging
        if let Some(val) = lookup("HOSTAUDIT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("HOSTAUDIT_LOG_FORMAT") {
            self.logging.format = val;
        }

        self
    }

    /// Reject values the auditor cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(platform) = &self.host.platform {
            if !matches!(platform.as_str(), "debian" | "redhat") {
                return Err(Error::InvalidConfig {
                    key: "host.platform".into(),
                    message: format!("expected 'debian' or 'redhat', got '{}'", platform),
                });
            }
        }

        for (key, value) in [
            ("timeouts.service_query_secs", self.timeouts.service_query_secs),
            ("timeouts.package_query_secs", self.timeouts.package_query_secs),
            ("timeouts.command_secs", self.timeouts.command_secs),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig {
                    key: key.into(),
                    message: "timeout must be greater than zero".into(),
                });
            }
        }

        if self.limits.max_include_depth == 0 {
            return Err(Error::InvalidConfig {
                key: "limits.max_include_depth".into(),
                message: "must be greater than zero".into(),
            });
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json" | "compact") {
            return Err(Error::InvalidConfig {
                key: "logging.format".into(),
                message: format!("unknown format '{}'", self.logging.format),
            });
        }

        Ok(())
    }

    /// Reduction policy for a rule kind
    pub fn policy_for(&self, kind: &str) -> ReductionPolicy {
        self.reduction
            .overrides
            .get(kind)
            .copied()
            .unwrap_or(self.reduction.default_policy)
    }
}

/// Host selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Filesystem prefix every host path is resolved under
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Force a platform family (debian, redhat) instead of detecting it
    pub platform: Option<String>,

    /// Kernel release used for /lib/modules lookups
    pub kernel_release: Option<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            platform: None,
            kernel_release: None,
        }
    }
}

/// Subprocess timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_query_timeout")]
    pub service_query_secs: u64,

    #[serde(default = "default_query_timeout")]
    pub package_query_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,
}

fn default_query_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

impl TimeoutConfig {
    pub fn service_query(&self) -> Duration {
        Duration::from_secs(self.service_query_secs)
    }

    pub fn package_query(&self) -> Duration {
        Duration::from_secs(self.package_query_secs)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            service_query_secs: 10,
            package_query_secs: 10,
            command_secs: 30,
        }
    }
}

/// Read and recursion limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest file a content rule will read
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Deepest include chain for PAM, sshd and sudoers
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Evidence snippet length
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_max_include_depth() -> usize {
    16
}

fn default_snippet_chars() -> usize {
    100
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_include_depth: default_max_include_depth(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

/// Sysctl evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysctlConfig {
    /// Parameter/value pairs accepted as secure out-of-box kernel defaults
    #[serde(default = "default_safe_defaults")]
    pub safe_defaults: BTreeMap<String, String>,
}

fn default_safe_defaults() -> BTreeMap<String, String> {
    BTreeMap::from([("net.ipv4.tcp_syncookies".to_string(), "1".to_string())])
}

impl Default for SysctlConfig {
    fn default() -> Self {
        Self {
            safe_defaults: default_safe_defaults(),
        }
    }
}

/// Status reduction settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReductionConfig {
    #[serde(default)]
    pub default_policy: ReductionPolicy,

    /// Per rule kind overrides
    #[serde(default)]
    pub overrides: BTreeMap<String, ReductionPolicy>,
}

/// Rule selection for a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditRunConfig {
    /// Skip rules above this profile level
    pub max_profile_level: Option<u8>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("pretty")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Builder for constructing AuditConfig
pub struct AuditConfigBuilder {
    config: AuditConfig,
}

impl AuditConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AuditConfig::default(),
        }
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.host.root = root.into();
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.config.host.platform = Some(platform.into());
        self
    }

    pub fn kernel_release(mut self, release: impl Into<String>) -> Self {
        self.config.host.kernel_release = Some(release.into());
        self
    }

    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeouts.command_secs = secs;
        self
    }

    pub fn reduction_policy(mut self, policy: ReductionPolicy) -> Self {
        self.config.reduction.default_policy = policy;
        self
    }

    pub fn kind_policy(mut self, kind: impl Into<String>, policy: ReductionPolicy) -> Self {
        self.config.reduction.overrides.insert(kind.into(), policy);
        self
    }

    pub fn max_profile_level(mut self, level: u8) -> Self {
        self.config.audit.max_profile_level = Some(level);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> AuditConfig {
        self.config
    }
}

impl Default for AuditConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
