//! hostaudit Common - Shared configuration and logging
//!
//! This crate provides the ambient pieces every hostaudit crate shares.

pub mod config;
pub mod logging;

pub use config::{
    AuditConfig, AuditConfigBuilder, AuditRunConfig, HostConfig, LimitsConfig, LoggingConfig,
    ReductionConfig, SysctlConfig, TimeoutConfig,
};
pub use logging::{init_logging, init_logging_with_config, try_init_logging_with_config, LogConfig, LogFormat};
