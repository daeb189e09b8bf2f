//! Staff directory - the read-only source of assignable people

use crate::config::StaffConfig;
use serde::Serialize;

/// Assignee reference as the engine sees it
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Assignable {
    pub id: String,
    pub name: String,
}

/// Read-only staff lookup
pub trait StaffDirectory: Send + Sync {
    fn list_assignable(&self) -> Vec<Assignable>;

    fn is_assignable(&self, id: &str) -> bool {
        self.list_assignable().iter().any(|a| a.id == id)
    }
}

/// Directory backed by `[[staff]]` config entries
#[derive(Debug, Clone, Default)]
pub struct ConfigStaffDirectory {
    staff: Vec<StaffConfig>,
}

impl ConfigStaffDirectory {
    pub fn new(staff: Vec<StaffConfig>) -> Self {
        Self { staff }
    }

    /// Every configured entry, including inactive ones
    pub fn all(&self) -> &[StaffConfig] {
        &self.staff
    }
}

impl StaffDirectory for ConfigStaffDirectory {
    fn list_assignable(&self) -> Vec<Assignable> {
        self.staff
            .iter()
            .filter(|s| s.active)
            .map(|s| Assignable {
                id: s.id.clone(),
                name: s.name.clone(),
            })
            .collect()
    }

    fn is_assignable(&self, id: &str) -> bool {
        self.staff.iter().any(|s| s.active && s.id == id)
    }
}
