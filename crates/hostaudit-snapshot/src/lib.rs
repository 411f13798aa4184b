//! hostaudit Snapshot - Point-in-time host state for one audit run
//!
//! This crate provides:
//! - `SnapshotBuilder`: runs every parser once and records failures per source
//! - `Snapshot`: the immutable value every rule evaluator reads
//! - `PlatformAdapter`: package and service queries for Debian and RedHat families
//! - `CommandRunner`: subprocess execution with a hard timeout
//!
//! # Example
//!
//! ```no_run
//! use hostaudit_common::AuditConfig;
//! use hostaudit_snapshot::SnapshotBuilder;
//!
//! let config = AuditConfig::default().merge_env();
//! let snapshot = SnapshotBuilder::new(&config).build();
//! println!("{} runs {} {}", snapshot.meta.hostname, snapshot.meta.os_name, snapshot.meta.os_version);
//! ```

pub mod exec;
pub mod platform;
pub mod snapshot;

pub use exec::{CommandOutput, CommandRunner};
pub use platform::{
    adapter_for, DebianPlatform, PackageState, PlatformAdapter, PlatformFamily, RedHatPlatform,
    ServiceActivity, ServiceEnablement,
};
pub use snapshot::{
    KernelState, Meta, ModuleInfo, MountState, Snapshot, SnapshotBuilder, SourceError,
    SourceResult, SysctlState,
};
