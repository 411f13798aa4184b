//! hostaudit Parsers - Host configuration format parsers
//!
//! Every parser reads through [`HostRoot`], which re-roots host paths under a
//! configurable prefix and refuses to follow symlinks:
//! - PAM service stacks with `@include` / `substack` inlining
//! - sshd_config with `Include` expansion and `Match` truncation
//! - sudoers `Defaults` with `#includedir` expansion
//! - sysctl config files and the live `/proc/sys` tree
//! - `/proc/mounts` and `/etc/fstab`
//! - modprobe deny rules and the on-disk module inventory
//! - os-release and the account database
//!
//! # Example
//!
//! ```no_run
//! use hostaudit_parsers::{pam, HostRoot, PamParser};
//!
//! let host = HostRoot::system();
//! let entries = PamParser::new(&host).parse("/etc/pam.d/common-password")?;
//! if let Some((_, minlen)) = pam::find_parameter(&entries, "password", "pam_pwquality", "minlen") {
//!     println!("minlen = {}", minlen);
//! }
//! # Ok::<(), hostaudit_core::Error>(())
//! ```

pub mod accounts;
pub mod host;
pub mod modules;
pub mod mounts;
pub mod os_release;
pub mod pam;
pub mod sshd;
pub mod sudoers;
pub mod sysctl;

pub use accounts::Accounts;
pub use host::{host_parent, join_host, HostRoot};
pub use mounts::{MountInfo, MountTable};
pub use os_release::OsRelease;
pub use pam::{PamEntry, PamParser};
pub use sshd::{SshdConfig, SshdParser, SshdValue, ValueOrigin};
pub use sudoers::{SudoDefault, SudoDefaults, SudoersParser};
pub use sysctl::PersistedValue;
