use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{Error, Evidence, Outcome};

pub struct FileExistsEvaluator;

impl Evaluator for FileExistsEvaluator {
    fn family(&self) -> Family {
        Family::FileExists
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::FileExists { path } = check else {
            return mismatch(self.family(), check);
        };

        match ctx.snapshot.host().lstat(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                Outcome::fail("Symlink not allowed", Evidence::file(path.clone(), "symlink"))
                    .with_description(format!("Symlink rejected: {}", path))
            }
            Ok(meta) if meta.is_file() => Outcome::pass(
                format!("{} exists", path),
                Evidence::file(path.clone(), format!("{} bytes", meta.len())),
            ),
            Ok(_) => Outcome::fail(
                format!("{} is not a regular file", path),
                Evidence::file(path.clone(), "not a regular file"),
            ),
            Err(Error::FileNotFound { .. }) => Outcome::fail(
                format!("{} does not exist", path),
                Evidence::file(path.clone(), "not found"),
            ),
            Err(e) => Outcome::from_error(&e, path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::Fixture;
    use hostaudit_core::Verdict;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exists_missing_symlink() {
        let fixture = Fixture::new();
        fixture
            .write("/etc/security/opasswd", "")
            .link("/etc/security/opasswd", "/etc/security/opasswd.old")
            .mkdir("/etc/cron.d");
        let snapshot = fixture.snapshot();
        let config = fixture.config();
        let ctx = EvalContext::new(&snapshot, &config, "5.4.1");

        let eval = |path: &str| {
            FileExistsEvaluator.evaluate(
                &Check::FileExists {
                    path: path.to_string(),
                },
                &ctx,
            )
        };

        assert_eq!(eval("/etc/security/opasswd").verdict, Verdict::Pass);
        assert_eq!(eval("/etc/security/opasswd.old").verdict, Verdict::Fail);
        assert_eq!(eval("/etc/cron.allow").verdict, Verdict::Fail);
        assert_eq!(eval("/etc/cron.d").verdict, Verdict::Fail);
    }
}
