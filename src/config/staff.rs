//! Staff directory configuration

use serde::{Deserialize, Serialize};

/// One `[[staff]]` entry
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StaffConfig {
    /// Opaque id stored on nodes as the assignee
    pub id: String,

    pub name: String,

    /// Job role, e.g. "site supervisor"
    pub role: Option<String>,

    /// Inactive staff stay in config but cannot be assigned
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl StaffConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_config_minimal() {
        let staff: StaffConfig = toml::from_str(
            r#"
            id = "s-1"
            name = "Dana Reyes"
        "#,
        )
        .unwrap();
        assert_eq!(staff.id, "s-1");
        assert!(staff.active);
        assert!(staff.role.is_none());
    }

    #[test]
    fn test_staff_config_rejects_unknown_fields() {
        let result: Result<StaffConfig, _> = toml::from_str(
            r#"
            id = "s-1"
            name = "Dana Reyes"
            email = "dana@example.com"
        "#,
        );
        assert!(result.is_err());
    }
}
