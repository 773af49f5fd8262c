use serde::{Deserialize, Serialize};
use std::fmt;

/// Decides whether the current user may change the board
pub trait Permissions: Send + Sync {
    fn can_edit_board(&self) -> bool;
}

/// Application role of the user looking at the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Developer,
    Tester,
}

impl Role {
    /// Managers watch the board; they do not drag tickets
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Manager)
    }

    /// Path segment of the role-scoped API
    pub fn api_scope(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Developer => "developer",
            Self::Tester => "tester",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_scope())
    }
}

impl Permissions for Role {
    fn can_edit_board(&self) -> bool {
        !self.is_read_only()
    }
}

/// Grants editing unconditionally
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Permissions for AllowAll {
    fn can_edit_board(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_is_read_only() {
        assert!(!Role::Manager.can_edit_board());
        assert!(Role::Developer.can_edit_board());
        assert!(Role::Tester.can_edit_board());
        assert!(AllowAll.can_edit_board());
    }

    #[test]
    fn test_role_serde() {
        let role: Role = serde_json::from_str("\"developer\"").unwrap();
        assert_eq!(role, Role::Developer);
        assert_eq!(role.to_string(), "developer");
    }
}
