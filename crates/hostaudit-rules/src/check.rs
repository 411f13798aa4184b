//! Typed rule checks, one variant per evaluator family

use crate::schema::RawRule;
use hostaudit_core::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Which evaluator handles a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Family {
    Sysctl,
    KernelModule,
    MountOption,
    MountPoint,
    Service,
    Package,
    FilePermissions,
    FileContent,
    FileExists,
    Ssh,
    Pam,
    Sudo,
    Command,
    Manual,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Sysctl => "sysctl",
            Family::KernelModule => "kernel_module",
            Family::MountOption => "mount_option",
            Family::MountPoint => "mount_point",
            Family::Service => "service",
            Family::Package => "package",
            Family::FilePermissions => "file_permissions",
            Family::FileContent => "file_content",
            Family::FileExists => "file_exists",
            Family::Ssh => "ssh",
            Family::Pam => "pam",
            Family::Sudo => "sudo",
            Family::Command => "command",
            Family::Manual => "manual",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Desired service state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceExpectation {
    Enabled,
    Disabled,
    Masked,
    Active,
    Inactive,
}

impl ServiceExpectation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceExpectation::Enabled => "enabled",
            ServiceExpectation::Disabled => "disabled",
            ServiceExpectation::Masked => "masked",
            ServiceExpectation::Active => "active",
            ServiceExpectation::Inactive => "inactive",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "enabled" | "enable" | "running" => Some(ServiceExpectation::Enabled),
            "disabled" | "disable" | "not_in_use" | "not-in-use" => {
                Some(ServiceExpectation::Disabled)
            }
            "masked" => Some(ServiceExpectation::Masked),
            "active" => Some(ServiceExpectation::Active),
            "inactive" | "stopped" => Some(ServiceExpectation::Inactive),
            _ => None,
        }
    }
}

/// How a file mode is compared to the expected mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModeComparison {
    /// Octal mode numerically lower than or equal to the expected mode
    AtMost,
    Exact,
}

/// A normalized, validated check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Check {
    Sysctl {
        parameter: String,
        expected: String,
    },
    /// Module must not be loadable
    KernelModule {
        module: String,
    },
    MountOption {
        point: String,
        option: String,
    },
    /// Mount point must be a separate partition
    MountPoint {
        point: String,
    },
    Service {
        name: String,
        expected: ServiceExpectation,
    },
    Package {
        name: String,
        installed: bool,
    },
    FilePermissions {
        path: String,
        mode: Option<u32>,
        owner: Option<String>,
        group: Option<String>,
        comparison: ModeComparison,
        optional: bool,
    },
    FileContent {
        paths: Vec<String>,
        pattern: String,
        present: bool,
    },
    FileExists {
        path: String,
    },
    Ssh {
        parameter: String,
        expected: String,
    },
    Pam {
        file: String,
        pam_type: String,
        module: String,
        parameter: String,
        expected: String,
    },
    Sudo {
        parameter: String,
        expected: String,
    },
    Command {
        command: String,
        /// Built-in command whose paths are re-rooted under the host root
        builtin: bool,
    },
    Manual {
        reason: String,
    },
}

impl Check {
    pub fn family(&self) -> Family {
        match self {
            Check::Sysctl { .. } => Family::Sysctl,
            Check::KernelModule { .. } => Family::KernelModule,
            Check::MountOption { .. } => Family::MountOption,
            Check::MountPoint { .. } => Family::MountPoint,
            Check::Service { .. } => Family::Service,
            Check::Package { .. } => Family::Package,
            Check::FilePermissions { .. } => Family::FilePermissions,
            Check::FileContent { .. } => Family::FileContent,
            Check::FileExists { .. } => Family::FileExists,
            Check::Ssh { .. } => Family::Ssh,
            Check::Pam { .. } => Family::Pam,
            Check::Sudo { .. } => Family::Sudo,
            Check::Command { .. } => Family::Command,
            Check::Manual { .. } => Family::Manual,
        }
    }
}

/// Built-in `/etc/passwd` check: every password field is exactly `x`
pub const SHADOWED_PASSWORDS_PATTERN: &str = r"^[^:]+:(?:[^x:][^:]*|x[^:]+)?:";
/// Built-in `/etc/shadow` check: no empty password field
pub const EMPTY_PASSWORDS_PATTERN: &str = r"^[^:]+::";

/// Default command for the duplicate account kinds
pub fn default_command(kind: &str) -> Option<&'static str> {
    match kind {
        "DuplicateUIDs" => Some("cut -d: -f3 /etc/passwd | sort | uniq -d"),
        "DuplicateGIDs" => Some("cut -d: -f3 /etc/group | sort | uniq -d"),
        "DuplicateUsernames" => Some("cut -d: -f1 /etc/passwd | sort | uniq -d"),
        "DuplicateGroupnames" => Some("cut -d: -f1 /etc/group | sort | uniq -d"),
        _ => None,
    }
}

/// Metadata carried from the raw rule into the result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleMeta {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub section: Option<String>,
    pub profile_level: Option<u8>,
    pub cis_reference: Option<String>,
    pub description: Option<String>,
    pub remediation: Option<String>,
}

impl RuleMeta {
    pub fn from_raw(raw: &RawRule) -> Self {
        Self {
            id: raw.id.clone(),
            title: raw.title.clone(),
            kind: raw.kind.clone(),
            section: raw.section.clone(),
            profile_level: raw.profile_level(),
            cis_reference: raw.cis_reference.clone(),
            description: raw.description.clone(),
            remediation: raw.remediation.clone(),
        }
    }
}

/// Build the typed check for `family` from a raw rule
///
/// Missing or malformed fields are reported by name.
pub fn normalize(raw: &RawRule, family: Family) -> Result<Check> {
    let fields = raw.fields();
    let req = Required { rule_id: &raw.id };
    let kind = raw.kind.as_str();

    let check = match family {
        Family::Sysctl => Check::Sysctl {
            parameter: req.get("parameter", &fields.parameter)?,
            expected: req.get("expected_value", &fields.expected)?,
        },

        Family::KernelModule => {
            let module = req.get("module_name", &fields.module)?;
            match fields.expected.as_deref() {
                None | Some("not_available") | Some("disabled") | Some("not_loaded") => {}
                Some(other) => return Err(req.invalid("expected", other)),
            }
            Check::KernelModule { module }
        }

        Family::MountOption => Check::MountOption {
            point: req.get("mount_point", &fields.point)?,
            option: req.get("required_option", &fields.option)?,
        },

        Family::MountPoint => {
            let point = req.get("mount_point", &fields.point)?;
            match fields.expected.as_deref() {
                None | Some("separate_partition") | Some("mounted") => {}
                Some(other) => return Err(req.invalid("expected", other)),
            }
            Check::MountPoint { point }
        }

        Family::Service => {
            let name = req.get("service_name", &fields.name)?;
            let expected = match (kind, fields.expected.as_deref()) {
                ("ServiceNotInUse", None) => ServiceExpectation::Disabled,
                (_, None) => return Err(req.missing("expected_status")),
                (_, Some(value)) => ServiceExpectation::parse(value)
                    .ok_or_else(|| req.invalid("expected_status", value))?,
            };
            Check::Service { name, expected }
        }

        Family::Package => {
            let name = req.get("package_name", &fields.name)?;
            let default = if kind == "PackageNotInstalled" {
                "not_installed"
            } else {
                "installed"
            };
            let installed = match fields
                .expected
                .as_deref()
                .unwrap_or(default)
                .to_lowercase()
                .as_str()
            {
                "installed" | "present" | "true" => true,
                "not_installed" | "not-installed" | "absent" | "removed" | "false" => false,
                other => return Err(req.invalid("expected_status", other)),
            };
            Check::Package { name, installed }
        }

        Family::FilePermissions => {
            let path = req.get("file_path", &fields.path)?;
            let mode = match fields.permissions.as_deref() {
                Some(text) => Some(parse_mode(text).ok_or_else(|| req.invalid("permissions", text))?),
                None => None,
            };
            if mode.is_none() && fields.owner.is_none() && fields.group.is_none() {
                return Err(req.missing("expected_permissions"));
            }
            let comparison = match fields.comparison.as_deref() {
                None | Some("at_most") | Some("restrictive") | Some("max") => ModeComparison::AtMost,
                Some("exact") | Some("equal") => ModeComparison::Exact,
                Some(other) => return Err(req.invalid("comparison", other)),
            };
            Check::FilePermissions {
                path,
                mode,
                owner: fields.owner.clone(),
                group: fields.group.clone(),
                comparison,
                optional: fields.optional,
            }
        }

        Family::FileContent => match kind {
            "ShadowedPasswords" => Check::FileContent {
                paths: vec![fields.path.clone().unwrap_or_else(|| "/etc/passwd".into())],
                pattern: SHADOWED_PASSWORDS_PATTERN.into(),
                present: false,
            },
            "EmptyPasswords" => Check::FileContent {
                paths: vec![fields.path.clone().unwrap_or_else(|| "/etc/shadow".into())],
                pattern: EMPTY_PASSWORDS_PATTERN.into(),
                present: false,
            },
            _ => {
                let path = req.get("file_path", &fields.path)?;
                let pattern = req.get("pattern", &fields.pattern)?;
                let present = match fields.expected.as_deref() {
                    None | Some("found") | Some("present") | Some("match") => true,
                    Some("not_found") | Some("absent") | Some("no_match") => false,
                    Some(other) => return Err(req.invalid("expected_result", other)),
                };
                Check::FileContent {
                    paths: split_paths(&path),
                    pattern,
                    present,
                }
            }
        },

        Family::FileExists => Check::FileExists {
            path: req.get("file_path", &fields.path)?,
        },

        Family::Ssh => Check::Ssh {
            parameter: req.get("parameter", &fields.parameter)?,
            expected: req.get("expected_value", &fields.expected)?,
        },

        Family::Pam => Check::Pam {
            file: req.get("file_path", &fields.file)?,
            pam_type: fields.pam_type.clone().unwrap_or_default(),
            module: req.get("module_name", &fields.module)?,
            parameter: req.get("parameter", &fields.parameter)?,
            expected: req.get("expected_value", &fields.expected)?,
        },

        Family::Sudo => Check::Sudo {
            parameter: req.get("parameter", &fields.parameter)?,
            expected: req.get("expected_value", &fields.expected)?,
        },

        Family::Command => match (fields.command.clone(), default_command(kind)) {
            (Some(command), _) => Check::Command {
                command,
                builtin: false,
            },
            (None, Some(command)) => Check::Command {
                command: command.to_string(),
                builtin: true,
            },
            (None, None) => return Err(req.missing("audit_command")),
        },

        Family::Manual => Check::Manual {
            reason: String::from("Manual verification required"),
        },
    };

    Ok(check)
}

struct Required<'a> {
    rule_id: &'a str,
}

impl Required<'_> {
    fn get(&self, name: &str, value: &Option<String>) -> Result<String> {
        value.clone().ok_or_else(|| self.missing(name))
    }

    fn missing(&self, field: &str) -> Error {
        Error::MissingField {
            rule_id: self.rule_id.to_string(),
            field: field.to_string(),
        }
    }

    fn invalid(&self, field: &str, value: &str) -> Error {
        Error::InvalidFieldValue {
            rule_id: self.rule_id.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Octal mode text (`644`, `0644`, `0o600`)
pub fn parse_mode(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text.strip_prefix("0o").unwrap_or(text);
    if digits.is_empty() || digits.len() > 5 {
        return None;
    }
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o7777)
}

/// Multiple targets separated by whitespace or commas
fn split_paths(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawRule {
        RawRule::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_field_named() {
        let rule = raw(json!({"id": "3.3.1", "type": "SysctlParameter", "parameter_name": "net.ipv4.ip_forward"}));
        match normalize(&rule, Family::Sysctl) {
            Err(Error::MissingField { rule_id, field }) => {
                assert_eq!(rule_id, "3.3.1");
                assert_eq!(field, "expected_value");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_service_not_in_use_defaults_disabled() {
        let rule = raw(json!({"id": "2.1.1", "type": "ServiceNotInUse", "service_names": ["autofs"]}));
        assert_eq!(
            normalize(&rule, Family::Service).unwrap(),
            Check::Service {
                name: "autofs".into(),
                expected: ServiceExpectation::Disabled
            }
        );

        let rule = raw(json!({"id": "2.1.2", "type": "ServiceStatus", "service_name": "chrony"}));
        assert!(normalize(&rule, Family::Service).is_err());
    }

    #[test]
    fn test_package_defaults_by_kind() {
        let rule = raw(json!({"id": "p", "type": "PackageNotInstalled", "package": "nis"}));
        assert_eq!(
            normalize(&rule, Family::Package).unwrap(),
            Check::Package {
                name: "nis".into(),
                installed: false
            }
        );
        let rule = raw(json!({"id": "p", "type": "PackageInstalled", "package_name": "aide"}));
        assert_eq!(
            normalize(&rule, Family::Package).unwrap(),
            Check::Package {
                name: "aide".into(),
                installed: true
            }
        );
    }

    #[test]
    fn test_file_permissions_fields() {
        let rule = raw(json!({"id": "7.1.1", "type": "FilePermissions", "file_path": "/etc/passwd", "expected_permissions": "0644", "expected_owner": "root"}));
        match normalize(&rule, Family::FilePermissions).unwrap() {
            Check::FilePermissions {
                mode, comparison, ..
            } => {
                assert_eq!(mode, Some(0o644));
                assert_eq!(comparison, ModeComparison::AtMost);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let bad = raw(json!({"id": "x", "type": "FilePermissions", "file_path": "/etc/passwd", "expected_permissions": "rw-r--r--"}));
        assert!(matches!(
            normalize(&bad, Family::FilePermissions),
            Err(Error::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_presets() {
        let rule = raw(json!({"id": "7.2.1", "type": "ShadowedPasswords"}));
        match normalize(&rule, Family::FileContent).unwrap() {
            Check::FileContent { paths, present, .. } => {
                assert_eq!(paths, vec!["/etc/passwd".to_string()]);
                assert!(!present);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let rule = raw(json!({"id": "7.2.5", "type": "DuplicateUIDs"}));
        assert_eq!(
            normalize(&rule, Family::Command).unwrap(),
            Check::Command {
                command: "cut -d: -f3 /etc/passwd | sort | uniq -d".into(),
                builtin: true
            }
        );
    }

    #[test]
    fn test_multiple_content_paths() {
        let rule = raw(json!({"id": "c", "type": "FileContent", "file_path": "/etc/a.conf, /etc/b.conf", "pattern": "^x", "expected_result": "not_found"}));
        match normalize(&rule, Family::FileContent).unwrap() {
            Check::FileContent { paths, present, .. } => {
                assert_eq!(paths.len(), 2);
                assert!(!present);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644"), Some(0o644));
        assert_eq!(parse_mode("0o600"), Some(0o600));
        assert_eq!(parse_mode("1777"), Some(0o1777));
        assert_eq!(parse_mode("0999"), None);
        assert_eq!(parse_mode(""), None);
    }
}
