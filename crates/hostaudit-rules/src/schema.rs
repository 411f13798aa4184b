//! Rule records as they arrive from rule catalogs
//!
//! Catalogs use two shapes: the legacy flat record with many alternate
//! spellings for the same field, and the typed record with a nested
//! `check` object. [`RawRule::fields`] folds both into one [`RuleFields`].

use hostaudit_core::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One rule exactly as deserialized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRule {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    /// Missing means automated unless the kind is `Manual`
    #[serde(default)]
    pub automated: Option<bool>,
    #[serde(default)]
    pub cis_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remediation: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub parameter_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub parameter: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_value: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_result: Option<String>,
    #[serde(default)]
    pub should_be_installed: Option<bool>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub module_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mount_point: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub required_option: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub service_name: Option<String>,
    #[serde(default)]
    pub service_names: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub package_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub package: Option<String>,
    #[serde(default)]
    pub package_names: Vec<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub file_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub passwd_file: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub shadow_file: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub log_directory: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_permissions: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_file_permissions: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_owner: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected_group: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pattern: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pam_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comparison: Option<String>,
    #[serde(default)]
    pub optional: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub audit_command: Option<String>,

    /// Typed form; its fields win over flat ones
    #[serde(default)]
    pub check: Option<CheckBlock>,
}

/// Nested `check` object of the typed rule form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckBlock {
    #[serde(default, deserialize_with = "lenient_string")]
    pub parameter: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub expected: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pam_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub module: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub permissions: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub group: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pattern: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub point: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub option: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub command: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comparison: Option<String>,
    #[serde(default)]
    pub optional: Option<bool>,
}

/// Canonical field values after alias resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFields {
    pub parameter: Option<String>,
    pub expected: Option<String>,
    pub module: Option<String>,
    pub point: Option<String>,
    pub option: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub file: Option<String>,
    pub pam_type: Option<String>,
    pub permissions: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub pattern: Option<String>,
    pub command: Option<String>,
    pub comparison: Option<String>,
    pub optional: bool,
}

impl RawRule {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Rule is evaluated automatically (kind `Manual` never is)
    pub fn is_automated(&self) -> bool {
        self.automated.unwrap_or(true) && self.kind != "Manual"
    }

    /// Numeric profile level (`Level 1`, `Level2`, `L1` -> 1)
    pub fn profile_level(&self) -> Option<u8> {
        let profile = self.profile.as_deref()?;
        let digits: String = profile
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }

    /// Resolve every alias spelling into one canonical field set
    ///
    /// Empty strings count as missing. Nested `check` values win.
    pub fn fields(&self) -> RuleFields {
        let empty = CheckBlock::default();
        let check = self.check.as_ref().unwrap_or(&empty);

        let installed = self.should_be_installed.map(|b| {
            if b {
                String::from("installed")
            } else {
                String::from("not_installed")
            }
        });

        RuleFields {
            parameter: first(&[&check.parameter, &self.parameter_name, &self.parameter]),
            expected: first(&[
                &check.expected,
                &self.expected_value,
                &self.expected_status,
                &self.expected_state,
                &self.expected_result,
                &installed,
            ]),
            module: first(&[&check.module, &self.module_name]),
            point: first(&[&check.point, &self.mount_point]),
            option: first(&[&check.option, &self.required_option]),
            name: first(&[
                &check.name,
                &self.service_name,
                &self.service_names.first().cloned(),
                &self.package_name,
                &self.package,
                &self.package_names.first().cloned(),
            ]),
            path: first(&[
                &check.path,
                &self.file_path,
                &self.passwd_file,
                &self.shadow_file,
                &self.log_directory,
            ]),
            file: first(&[&check.file, &self.file_path]),
            pam_type: first(&[&check.pam_type, &self.pam_type]),
            permissions: first(&[
                &check.permissions,
                &self.expected_permissions,
                &self.expected_file_permissions,
            ]),
            owner: first(&[&check.owner, &self.expected_owner]),
            group: first(&[&check.group, &self.expected_group]),
            pattern: first(&[&check.pattern, &self.pattern]),
            command: first(&[&check.command, &self.audit_command]),
            comparison: first(&[&check.comparison, &self.comparison]),
            optional: check.optional.or(self.optional).unwrap_or(false),
        }
    }
}

fn first(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}

/// Accept strings, numbers and booleans for text fields (`"expected_value": 0`)
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_legacy_aliases() {
        let rule = RawRule::from_value(json!({
            "id": "1.1.1.1",
            "title": "Ensure telnet client is not installed",
            "type": "PackageNotInstalled",
            "profile": "Level 1",
            "package_names": ["telnet", "inetutils-telnet"],
            "should_be_installed": false
        }))
        .unwrap();

        let fields = rule.fields();
        assert_eq!(fields.name.as_deref(), Some("telnet"));
        assert_eq!(fields.expected.as_deref(), Some("not_installed"));
        assert_eq!(rule.profile_level(), Some(1));
        assert!(rule.is_automated());
    }

    #[test]
    fn test_parameter_spellings() {
        let a = RawRule::from_value(json!({"id": "a", "type": "SysctlParameter", "parameter_name": "net.ipv4.ip_forward", "expected_value": 0})).unwrap();
        let b = RawRule::from_value(json!({"id": "b", "type": "SysctlParameter", "parameter": "net.ipv4.ip_forward", "expected_value": "0"})).unwrap();
        assert_eq!(a.fields(), b.fields());
        assert_eq!(a.fields().expected.as_deref(), Some("0"));
    }

    #[test]
    fn test_nested_check_wins() {
        let rule = RawRule::from_value(json!({
            "id": "5.3.3.2.2",
            "type": "PAMConfig",
            "automated": true,
            "file_path": "/etc/pam.d/common-auth",
            "module_name": "pam_faillock",
            "check": {
                "file": "common-password",
                "pam_type": "password",
                "module": "pam_pwquality",
                "parameter": "minlen",
                "expected": 14
            }
        }))
        .unwrap();

        let fields = rule.fields();
        assert_eq!(fields.file.as_deref(), Some("common-password"));
        assert_eq!(fields.module.as_deref(), Some("pam_pwquality"));
        assert_eq!(fields.expected.as_deref(), Some("14"));
        assert_eq!(fields.pam_type.as_deref(), Some("password"));
    }

    #[test]
    fn test_empty_strings_are_missing() {
        let rule = RawRule::from_value(json!({"id": "x", "type": "Service", "service_name": "", "service_names": ["rsync"]})).unwrap();
        assert_eq!(rule.fields().name.as_deref(), Some("rsync"));
    }

    #[test]
    fn test_manual_and_unautomated() {
        let manual = RawRule::from_value(json!({"id": "m", "type": "Manual"})).unwrap();
        assert!(!manual.is_automated());

        let off = RawRule::from_value(json!({"id": "o", "type": "FileExists", "automated": false, "profile": "Level2"})).unwrap();
        assert!(!off.is_automated());
        assert_eq!(off.profile_level(), Some(2));
    }

    #[test]
    fn test_bad_field_type_rejected() {
        assert!(RawRule::from_value(json!({"id": "x", "pattern": ["a"]})).is_err());
    }
}
