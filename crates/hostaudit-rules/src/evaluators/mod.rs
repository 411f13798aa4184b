//! Rule evaluators, one per check family
//!
//! Every evaluator reads the shared [`Snapshot`] and returns an [`Outcome`].
//! Evaluators never mutate state and never fail: read errors, timeouts and
//! bad input all become ERROR outcomes scoped to the rule being evaluated.

mod command;
mod file_content;
mod file_exists;
mod file_perm;
mod kernel;
mod manual;
mod mount;
mod package;
mod pam;
mod service;
mod ssh;
mod sudo;
mod sysctl;

pub use command::{CommandEvaluator, CommandLine, ALLOWED_COMMANDS};
pub use file_content::FileContentEvaluator;
pub use file_exists::FileExistsEvaluator;
pub use file_perm::FilePermissionsEvaluator;
pub use kernel::KernelModuleEvaluator;
pub use manual::ManualEvaluator;
pub use mount::{MountOptionEvaluator, MountPointEvaluator};
pub use package::PackageEvaluator;
pub use pam::PamEvaluator;
pub use service::ServiceEvaluator;
pub use ssh::SshEvaluator;
pub use sudo::SudoEvaluator;
pub use sysctl::SysctlEvaluator;

use crate::check::{Check, Family};
use hostaudit_common::AuditConfig;
use hostaudit_core::{ErrorKind, Evidence, Outcome};
use hostaudit_snapshot::Snapshot;

/// Everything an evaluator may read
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub snapshot: &'a Snapshot,
    pub config: &'a AuditConfig,
    pub rule_id: &'a str,
}

impl<'a> EvalContext<'a> {
    pub fn new(snapshot: &'a Snapshot, config: &'a AuditConfig, rule_id: &'a str) -> Self {
        Self {
            snapshot,
            config,
            rule_id,
        }
    }
}

/// Trait implemented by every check family
pub trait Evaluator: Send + Sync {
    /// Family of checks this evaluator accepts
    fn family(&self) -> Family;

    /// Evaluate one normalized check against the snapshot
    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome;
}

/// ERROR outcome for a check routed to the wrong evaluator
pub(crate) fn mismatch(expected: Family, check: &Check) -> Outcome {
    Outcome::error(
        format!(
            "{} check routed to the {} evaluator",
            check.family(),
            expected
        ),
        ErrorKind::Internal,
        Evidence::validation("dispatch", check.family().as_str()),
    )
}

#[cfg(test)]
pub(crate) mod testing {
    use hostaudit_common::AuditConfig;
    use hostaudit_core::{Error, Result};
    use hostaudit_snapshot::{
        PackageState, PlatformAdapter, PlatformFamily, ServiceActivity, ServiceEnablement,
        Snapshot, SnapshotBuilder,
    };
    use std::collections::{HashMap, HashSet};
    use std::fs;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Platform adapter answering from fixed tables
    #[derive(Debug, Default, Clone)]
    pub struct MockPlatform {
        pub packages: HashMap<String, PackageState>,
        pub services: HashMap<String, ServiceEnablement>,
        pub active: HashSet<String>,
        /// Units whose queries time out
        pub hanging: HashSet<String>,
    }

    impl MockPlatform {
        pub fn package(mut self, name: &str, state: PackageState) -> Self {
            self.packages.insert(name.to_string(), state);
            self
        }

        pub fn service(mut self, unit: &str, state: ServiceEnablement) -> Self {
            self.services.insert(unit.to_string(), state);
            self
        }

        pub fn running(mut self, unit: &str) -> Self {
            self.active.insert(unit.to_string());
            self
        }

        pub fn hanging(mut self, name: &str) -> Self {
            self.hanging.insert(name.to_string());
            self
        }

        fn check_hang(&self, name: &str, tool: &str) -> Result<()> {
            if self.hanging.contains(name) {
                return Err(Error::CommandTimeout {
                    command: format!("{} {}", tool, name),
                    seconds: 10,
                });
            }
            Ok(())
        }
    }

    impl PlatformAdapter for MockPlatform {
        fn family(&self) -> PlatformFamily {
            PlatformFamily::Debian
        }

        fn package_state(&self, name: &str) -> Result<PackageState> {
            self.check_hang(name, "dpkg-query")?;
            Ok(self
                .packages
                .get(name)
                .copied()
                .unwrap_or(PackageState::NotInstalled))
        }

        fn service_enablement(&self, name: &str) -> Result<ServiceEnablement> {
            self.check_hang(name, "systemctl")?;
            Ok(self
                .services
                .get(name)
                .cloned()
                .unwrap_or(ServiceEnablement::NotFound))
        }

        fn service_activity(&self, name: &str) -> Result<ServiceActivity> {
            self.check_hang(name, "systemctl")?;
            if self.active.contains(name) {
                Ok(ServiceActivity::Active)
            } else {
                Ok(ServiceActivity::Inactive)
            }
        }

        fn pam_stack_files(&self) -> &'static [&'static str] {
            &["common-auth", "common-password"]
        }
    }

    /// Temporary host root populated file by file
    pub struct Fixture {
        pub dir: TempDir,
        pub platform: MockPlatform,
    }

    impl Fixture {
        pub fn new() -> Self {
            let fixture = Self {
                dir: TempDir::new().unwrap(),
                platform: MockPlatform::default(),
            };
            fixture.write("/etc/os-release", "NAME=\"Ubuntu\"\nVERSION_ID=\"24.04\"\nID=ubuntu\n");
            fixture.write("/proc/sys/kernel/osrelease", "6.8.0-test\n");
            fixture
        }

        pub fn local(&self, path: &str) -> PathBuf {
            self.dir.path().join(path.trim_start_matches('/'))
        }

        pub fn write(&self, path: &str, content: &str) -> &Self {
            let local = self.local(path);
            fs::create_dir_all(local.parent().unwrap()).unwrap();
            fs::write(local, content).unwrap();
            self
        }

        pub fn write_mode(&self, path: &str, content: &str, mode: u32) -> &Self {
            self.write(path, content);
            fs::set_permissions(self.local(path), fs::Permissions::from_mode(mode)).unwrap();
            self
        }

        pub fn mkdir(&self, path: &str) -> &Self {
            fs::create_dir_all(self.local(path)).unwrap();
            self
        }

        /// Host-level symlink `path -> target`
        pub fn link(&self, target: &str, path: &str) -> &Self {
            let local = self.local(path);
            fs::create_dir_all(local.parent().unwrap()).unwrap();
            symlink(self.local(target), local).unwrap();
            self
        }

        pub fn config(&self) -> AuditConfig {
            AuditConfig::builder().root(self.dir.path()).build()
        }

        pub fn snapshot(&self) -> Snapshot {
            self.snapshot_with(&self.config())
        }

        pub fn snapshot_with(&self, config: &AuditConfig) -> Snapshot {
            SnapshotBuilder::new(config)
                .with_platform(Arc::new(self.platform.clone()))
                .build()
        }
    }
}
