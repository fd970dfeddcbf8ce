//! In-memory backend state

use crate::config::Config;
use shared::permissions::{self, ROLE_ADMIN, ROLE_SELLER, ROLE_STOCK};
use shared::{ProfileUpdate, Role, UserProfile};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Login credentials of a registered user
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password: String,
}

/// Tables of the emulated backend
#[derive(Debug, Default)]
pub struct Store {
    users: Vec<UserRecord>,
    profiles: HashMap<String, UserProfile>,
    roles: HashMap<String, Role>,
    /// refresh token -> user id
    refresh_tokens: HashMap<String, String>,
}

impl Store {
    /// Seeded with the three role templates, an administrator and a seller
    pub fn seeded() -> Self {
        let mut store = Self::default();
        for name in [ROLE_ADMIN, ROLE_SELLER, ROLE_STOCK] {
            store.insert_role(Role::new(
                new_id(),
                name,
                permissions::default_permissions(name),
            ));
        }

        let admin_role = store.role_id_by_name(ROLE_ADMIN);
        let seller_role = store.role_id_by_name(ROLE_SELLER);
        store.insert_user("admin@inventario.local", "admin", "admin123", "Administrador", admin_role);
        store.insert_user("vendedor@inventario.local", "vendedor", "vendedor123", "Vendedor", seller_role);
        store
    }

    pub fn insert_role(&mut self, role: Role) {
        self.roles.insert(role.id.clone(), role);
    }

    /// Register a login and its profile, returning the user id
    pub fn insert_user(
        &mut self,
        email: &str,
        username: &str,
        password: &str,
        display_name: &str,
        role_id: Option<String>,
    ) -> String {
        let id = new_id();
        self.users.push(UserRecord {
            id: id.clone(),
            email: email.to_string(),
            password: password.to_string(),
        });
        self.profiles.insert(
            id.clone(),
            UserProfile {
                id: id.clone(),
                display_name: display_name.to_string(),
                username: username.to_string(),
                active: true,
                role_id,
                role: None,
            },
        );
        id
    }

    pub fn role_id_by_name(&self, name: &str) -> Option<String> {
        self.roles
            .values()
            .find(|r| r.name == name)
            .map(|r| r.id.clone())
    }

    pub fn user_by_id(&self, user_id: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn authenticate(&self, email: &str, password: &str) -> Option<&UserRecord> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email) && u.password == password)
    }

    pub fn email_for_username(&self, username: &str) -> Option<String> {
        let profile = self.profiles.values().find(|p| p.username == username)?;
        self.user_by_id(&profile.id).map(|u| u.email.clone())
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.profiles.get(user_id).is_some_and(|p| p.active)
    }

    /// Profile row with its role joined in
    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        let mut profile = self.profiles.get(user_id)?.clone();
        profile.role = profile
            .role_id
            .as_ref()
            .and_then(|id| self.roles.get(id))
            .cloned();
        Some(profile)
    }

    pub fn has_permission(&self, user_id: &str, module: &str, action: &str) -> bool {
        self.profile(user_id)
            .is_some_and(|p| p.has_permission(module, action))
    }

    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.roles.get(role_id)
    }

    pub fn role_mut(&mut self, role_id: &str) -> Option<&mut Role> {
        self.roles.get_mut(role_id)
    }

    /// Apply a partial update; `None` when the profile does not exist
    pub fn update_profile(&mut self, user_id: &str, update: &ProfileUpdate) -> Option<UserProfile> {
        let profile = self.profiles.get_mut(user_id)?;
        if let Some(name) = &update.display_name {
            profile.display_name = name.clone();
        }
        if let Some(role_id) = &update.role_id {
            profile.role_id = Some(role_id.clone());
        }
        if let Some(active) = update.active {
            profile.active = active;
        }
        self.profile(user_id)
    }

    pub fn set_password(&mut self, user_id: &str, password: &str) -> bool {
        match self.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.password = password.to_string();
                true
            }
            None => false,
        }
    }

    pub fn issue_refresh_token(&mut self, user_id: &str) -> String {
        let token = new_id();
        self.refresh_tokens.insert(token.clone(), user_id.to_string());
        token
    }

    /// Consume a refresh token; each one is single-use
    pub fn take_refresh_token(&mut self, token: &str) -> Option<String> {
        self.refresh_tokens.remove(token)
    }

    pub fn revoke_refresh_tokens(&mut self, user_id: &str) {
        self.refresh_tokens.retain(|_, owner| owner != user_id);
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub store: RwLock<Store>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Store::seeded())
    }

    pub fn with_store(config: Config, store: Store) -> Self {
        Self {
            config,
            store: RwLock::new(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::permissions::{USUARIOS, VENTAS, VIEW};

    #[test]
    fn test_seeded_logins() {
        let store = Store::seeded();
        let admin = store.authenticate("admin@inventario.local", "admin123").unwrap();
        assert!(store.has_permission(&admin.id, USUARIOS, VIEW));

        assert_eq!(
            store.email_for_username("vendedor").as_deref(),
            Some("vendedor@inventario.local")
        );
        assert!(store.authenticate("admin@inventario.local", "wrong").is_none());
    }

    #[test]
    fn test_seller_permissions() {
        let store = Store::seeded();
        let seller = store.authenticate("vendedor@inventario.local", "vendedor123").unwrap();
        assert!(store.has_permission(&seller.id, VENTAS, VIEW));
        assert!(!store.has_permission(&seller.id, USUARIOS, VIEW));
        assert_eq!(store.profile(&seller.id).unwrap().role_label(), ROLE_SELLER);
    }

    #[test]
    fn test_refresh_tokens_are_single_use() {
        let mut store = Store::seeded();
        let token = store.issue_refresh_token("u1");
        assert_eq!(store.take_refresh_token(&token).as_deref(), Some("u1"));
        assert!(store.take_refresh_token(&token).is_none());
    }
}
