//! User Profile Model

use super::role::Role;
use serde::{Deserialize, Serialize};

/// Label shown when no role could be loaded
pub const NO_ROLE_LABEL: &str = "Sin rol";

fn default_active() -> bool {
    true
}

/// Profile row joined with its role (`profiles` table, `role:roles(*)`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Same as the auth identity
    pub id: String,
    pub display_name: String,
    pub username: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Role reference (String ID)
    #[serde(default)]
    pub role_id: Option<String>,
    /// Joined role row
    #[serde(default)]
    pub role: Option<Role>,
}

impl UserProfile {
    pub fn has_permission(&self, module: &str, action: &str) -> bool {
        self.role
            .as_ref()
            .is_some_and(|role| role.allows(module, action))
    }

    pub fn role_label(&self) -> &str {
        self.role
            .as_ref()
            .map(|role| role.name.as_str())
            .unwrap_or(NO_ROLE_LABEL)
    }
}

/// Update profile payload (admin only)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.role_id.is_none() && self.active.is_none()
    }
}
