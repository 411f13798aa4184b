use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{Evidence, EvidenceMethod, Outcome};
use hostaudit_parsers::modules::PROC_MODULES;
use hostaudit_snapshot::ModuleInfo;

/// Kernel modules that must not be loadable
pub struct KernelModuleEvaluator;

impl Evaluator for KernelModuleEvaluator {
    fn family(&self) -> Family {
        Family::KernelModule
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::KernelModule { module } = check else {
            return mismatch(self.family(), check);
        };
        let info = ctx.snapshot.kernel.module_info(module);
        let tree = match &ctx.snapshot.meta.kernel_release {
            Some(release) => format!("/lib/modules/{}/kernel", release),
            None => String::from("/lib/modules"),
        };
        classify(module, info, &tree)
    }
}

fn classify(module: &str, info: ModuleInfo, tree: &str) -> Outcome {
    let snippet = format!(
        "loaded={} blacklisted={} exists={}",
        info.loaded, info.blacklisted, info.exists
    );

    if info.loaded {
        return Outcome::fail(
            "loaded",
            Evidence::new(EvidenceMethod::System, PROC_MODULES, snippet),
        )
        .with_description(format!("Module {} is currently loaded", module));
    }
    if info.blacklisted {
        return Outcome::pass(
            "blacklisted",
            Evidence::new(EvidenceMethod::System, "/etc/modprobe.d", snippet),
        )
        .with_description(format!("Module {} is blacklisted and inactive", module));
    }
    if !info.exists {
        return Outcome::pass(
            "not present in kernel",
            Evidence::new(EvidenceMethod::System, tree, snippet),
        )
        .with_description(format!("Module {} is not built for this kernel", module));
    }
    Outcome::fail(
        "exists but not blacklisted",
        Evidence::new(EvidenceMethod::System, tree, snippet),
    )
    .with_description(format!("Module {} is available and not blocked", module))
}
