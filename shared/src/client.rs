//! Client-related types shared between the backend and the client
//!
//! Request/response bodies of the backend's auth API and RPC endpoints.

use crate::session::{AuthUser, Session};
use serde::{Deserialize, Serialize};

// =============================================================================
// Auth API DTOs
// =============================================================================

/// `POST /auth/v1/token?grant_type=password`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordGrantRequest {
    pub email: String,
    pub password: String,
}

/// `POST /auth/v1/token?grant_type=refresh_token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshGrantRequest {
    pub refresh_token: String,
}

/// Token response of both grants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Unix timestamp (seconds); derived from `expires_in` when absent
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    /// Convert into a session, anchoring `expires_in` at `now` (unix seconds)
    pub fn into_session(self, now: i64) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Some(self.expires_at.unwrap_or(now + self.expires_in)),
            user: self.user,
        }
    }
}

/// Error body returned by the backend
///
/// The auth API and the table API use different field names for the same data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, alias = "error")]
    pub code: Option<String>,
    #[serde(default, alias = "msg", alias = "error_description")]
    pub message: Option<String>,
}

// =============================================================================
// RPC DTOs
// =============================================================================

/// `POST /rest/v1/rpc/get_email_by_username`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameLookup {
    pub p_username: String,
}

/// `POST /rest/v1/rpc/admin_set_password`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPasswordRequest {
    pub p_user_id: String,
    pub p_password: String,
}

/// `PATCH /rest/v1/roles?id=eq.{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermissionsUpdate {
    pub permissions: crate::models::PermissionSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_into_session() {
        let resp: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": { "id": "u1", "email": "ana@tienda.test" }
        }))
        .unwrap();

        let session = resp.into_session(1_000);
        assert_eq!(session.expires_at, Some(4_600));
        assert_eq!(session.user_id(), "u1");
    }

    #[test]
    fn test_error_body_aliases() {
        let auth: ApiErrorBody = serde_json::from_value(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        }))
        .unwrap();
        assert_eq!(auth.code.as_deref(), Some("invalid_grant"));
        assert_eq!(auth.message.as_deref(), Some("Invalid login credentials"));

        let rest: ApiErrorBody =
            serde_json::from_value(json!({ "code": "PGRST116", "message": "not found" })).unwrap();
        assert_eq!(rest.code.as_deref(), Some("PGRST116"));
    }
}
