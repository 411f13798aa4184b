//! Evaluator registry - rule kind strings mapped to evaluators

use crate::check::Family;
use crate::evaluators::{
    CommandEvaluator, Evaluator, FileContentEvaluator, FileExistsEvaluator,
    FilePermissionsEvaluator, KernelModuleEvaluator, ManualEvaluator, MountOptionEvaluator,
    MountPointEvaluator, PackageEvaluator, PamEvaluator, ServiceEvaluator, SshEvaluator,
    SudoEvaluator, SysctlEvaluator,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of evaluators indexed by rule kind
///
/// Several kind strings may share one evaluator instance.
pub struct EvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// Registry with every built-in kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_all(
            &["SysctlParameter", "KernelParameter", "MultiKernelParameter"],
            Arc::new(SysctlEvaluator),
        );
        registry.register("KernelModule", Arc::new(KernelModuleEvaluator));
        registry.register("MountOption", Arc::new(MountOptionEvaluator));
        registry.register("MountPoint", Arc::new(MountPointEvaluator));
        registry.register_all(
            &["ServiceStatus", "Service", "ServiceNotInUse"],
            Arc::new(ServiceEvaluator),
        );
        registry.register_all(
            &[
                "PackageInstalled",
                "Package",
                "MultiPackage",
                "PackageNotInstalled",
            ],
            Arc::new(PackageEvaluator),
        );
        registry.register_all(
            &[
                "FilePermissions",
                "FilePermission",
                "SSHPrivateKeys",
                "SSHPublicKeys",
                "LogFilePermissions",
            ],
            Arc::new(FilePermissionsEvaluator),
        );
        registry.register_all(
            &[
                "FileContent",
                "ConfigFile",
                "ShadowedPasswords",
                "EmptyPasswords",
            ],
            Arc::new(FileContentEvaluator),
        );
        registry.register("FileExists", Arc::new(FileExistsEvaluator));
        registry.register_all(&["SSHConfig", "SSHDConfig"], Arc::new(SshEvaluator));
        registry.register("PAMConfig", Arc::new(PamEvaluator));
        registry.register("SudoConfig", Arc::new(SudoEvaluator));
        registry.register_all(
            &[
                "CommandOutputEmpty",
                "DuplicateUIDs",
                "DuplicateGIDs",
                "DuplicateUsernames",
                "DuplicateGroupnames",
            ],
            Arc::new(CommandEvaluator),
        );
        registry.register("Manual", Arc::new(ManualEvaluator));
        registry
    }

    /// Register an evaluator for a kind, replacing any previous one
    pub fn register(&mut self, kind: impl Into<String>, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(kind.into(), evaluator);
    }

    /// Register one evaluator under several kinds
    pub fn register_all(&mut self, kinds: &[&str], evaluator: Arc<dyn Evaluator>) {
        for kind in kinds {
            self.register(*kind, Arc::clone(&evaluator));
        }
    }

    /// Get the evaluator for a kind
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(kind).cloned()
    }

    /// Family handled for a kind
    pub fn family(&self, kind: &str) -> Option<Family> {
        self.evaluators.get(kind).map(|e| e.family())
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.evaluators.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.evaluators.contains_key(kind)
    }

    /// Get number of registered kinds
    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
