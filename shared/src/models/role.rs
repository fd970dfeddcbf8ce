//! Role Model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key of the "everything granted" sentinel: `{"all": true}`
pub const ALL_SENTINEL: &str = "all";

/// Role entity (RBAC 角色)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON permission object, e.g. `{"all": true}` or `{"ventas": ["view", "create"]}`
    #[serde(default)]
    pub permissions: PermissionSet,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            permissions,
        }
    }

    /// Whether this role carries the "all granted" sentinel
    pub fn grants_all(&self) -> bool {
        matches!(self.permissions, PermissionSet::All)
    }

    pub fn allows(&self, module: &str, action: &str) -> bool {
        self.permissions.allows(module, action)
    }
}

/// Grant for a single module
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleGrant {
    /// `true` grants every action of the module, `false` none
    Whole(bool),
    /// Only the listed actions are granted
    Actions(Vec<String>),
    /// Any other JSON value; grants nothing
    Unrecognized(Value),
}

impl ModuleGrant {
    pub fn actions<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Actions(actions.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, action: &str) -> bool {
        match self {
            Self::Whole(granted) => *granted,
            Self::Actions(actions) => actions.iter().any(|a| a == action),
            Self::Unrecognized(_) => false,
        }
    }
}

impl From<Value> for ModuleGrant {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(granted) => Self::Whole(granted),
            Value::Array(items) => Self::Actions(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => Self::Unrecognized(other),
        }
    }
}

impl From<ModuleGrant> for Value {
    fn from(grant: ModuleGrant) -> Self {
        match grant {
            ModuleGrant::Whole(granted) => Value::Bool(granted),
            ModuleGrant::Actions(actions) => {
                Value::Array(actions.into_iter().map(Value::String).collect())
            }
            ModuleGrant::Unrecognized(value) => value,
        }
    }
}

/// Permission set of a role
///
/// Stored as a JSON object. The object is read in exactly one of two shapes:
/// - `{"all": true}` is the sentinel granting everything (other keys are ignored)
/// - otherwise every key is a module name mapped to a [`ModuleGrant`]
///
/// `null`, a missing column or a non-object value read as an empty set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum PermissionSet {
    All,
    Modules(BTreeMap<String, ModuleGrant>),
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::Modules(BTreeMap::new())
    }

    /// Builder-style helper: add or replace a module grant.
    ///
    /// Has no effect on the `All` sentinel.
    pub fn with_module(mut self, module: impl Into<String>, grant: ModuleGrant) -> Self {
        if let Self::Modules(modules) = &mut self {
            modules.insert(module.into(), grant);
        }
        self
    }

    /// Whether `action` on `module` is granted
    pub fn allows(&self, module: &str, action: &str) -> bool {
        match self {
            Self::All => true,
            Self::Modules(modules) => modules.get(module).is_some_and(|g| g.allows(action)),
        }
    }

}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for PermissionSet {
    fn from(value: Value) -> Self {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Self::empty(),
            other => {
                tracing::warn!(value = %other, "Permission set is not a JSON object, treating as empty");
                return Self::empty();
            }
        };

        if map.get(ALL_SENTINEL) == Some(&Value::Bool(true)) {
            return Self::All;
        }

        Self::Modules(
            map.into_iter()
                .filter(|(module, _)| module != ALL_SENTINEL)
                .map(|(module, grant)| (module, ModuleGrant::from(grant)))
                .collect(),
        )
    }
}

impl From<PermissionSet> for Value {
    fn from(set: PermissionSet) -> Self {
        match set {
            PermissionSet::All => {
                let mut map = serde_json::Map::new();
                map.insert(ALL_SENTINEL.to_string(), Value::Bool(true));
                Value::Object(map)
            }
            PermissionSet::Modules(modules) => Value::Object(
                modules
                    .into_iter()
                    .map(|(module, grant)| (module, Value::from(grant)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> PermissionSet {
        serde_json::from_value(value).expect("permission set should parse")
    }

    #[test]
    fn test_all_sentinel_grants_everything() {
        let set = parse(json!({ "all": true }));
        assert_eq!(set, PermissionSet::All);
        assert!(set.allows("ventas", "delete"));
        assert!(set.allows("anything", "whatever"));
    }

    #[test]
    fn test_all_sentinel_wins_over_module_keys() {
        let set = parse(json!({ "all": true, "ventas": ["view"] }));
        assert!(set.allows("ventas", "delete"));
    }

    #[test]
    fn test_all_false_is_not_a_module() {
        let set = parse(json!({ "all": false, "ventas": true }));
        assert!(!set.allows("all", "view"));
        assert!(set.allows("ventas", "edit"));
    }

    #[test]
    fn test_boolean_module_grant() {
        let set = parse(json!({ "productos": true, "usuarios": false }));
        assert!(set.allows("productos", "view"));
        assert!(set.allows("productos", "delete"));
        assert!(!set.allows("usuarios", "view"));
    }

    #[test]
    fn test_action_list_grant() {
        let set = parse(json!({ "ventas": ["view"] }));
        assert!(set.allows("ventas", "view"));
        assert!(!set.allows("ventas", "edit"));
        assert!(!set.allows("fiados", "view"));
    }

    #[test]
    fn test_unrecognized_grant_denies() {
        let set = parse(json!({ "ventas": "view", "tickets": 1, "fiados": { "view": true } }));
        assert!(!set.allows("ventas", "view"));
        assert!(!set.allows("tickets", "view"));
        assert!(!set.allows("fiados", "view"));
    }

    #[test]
    fn test_null_and_non_object_are_empty() {
        assert_eq!(parse(Value::Null), PermissionSet::empty());
        assert_eq!(parse(json!(["all"])), PermissionSet::empty());
    }

    #[test]
    fn test_role_without_permissions_column() {
        let role: Role = serde_json::from_value(json!({ "id": "r1", "name": "Vacío" })).unwrap();
        assert!(!role.grants_all());
        assert!(!role.allows("ventas", "view"));
    }

    #[test]
    fn test_serialize_shapes() {
        assert_eq!(serde_json::to_value(PermissionSet::All).unwrap(), json!({ "all": true }));

        let set = PermissionSet::empty()
            .with_module("ventas", ModuleGrant::actions(["view", "create"]))
            .with_module("reportes", ModuleGrant::Whole(false));
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            json!({ "reportes": false, "ventas": ["view", "create"] })
        );
    }

}
