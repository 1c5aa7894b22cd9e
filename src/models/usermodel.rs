// src/models/usermodel.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Agent,
    Supervisor,
    Manager,
    Admin,
    System,
}

impl UserRole {
    pub fn is_staff(&self) -> bool {
        !matches!(self, UserRole::Customer)
    }
}

/// The authenticated caller of an operation, already scoped to one tenant.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Actor {
    pub user_id: String,
    pub tenant_id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl Actor {
    pub const SYSTEM_ID: &'static str = "system";

    /// Synthetic actor used for automatic operations.
    pub fn system(tenant_id: &str) -> Self {
        Actor {
            user_id: Self::SYSTEM_ID.to_string(),
            tenant_id: tenant_id.to_string(),
            name: "System".to_string(),
            email: String::new(),
            role: UserRole::System,
        }
    }

    pub fn is_agent(&self) -> bool {
        self.role.is_staff()
    }
}
