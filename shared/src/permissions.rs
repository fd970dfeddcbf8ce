//! Permission Definitions
//!
//! Module/action catalogue for role permission sets.
//!
//! ## Rules
//! - A role either carries the `{"all": true}` sentinel or maps module names to grants
//! - A boolean grant covers every action of the module
//! - A list grant covers only the listed actions
//! - The catalogue is only used to validate role edits; checks never consult it

use crate::models::{ModuleGrant, PermissionSet};

pub const DASHBOARD: &str = "dashboard";
pub const PRODUCTOS: &str = "productos";
pub const CATEGORIAS: &str = "categorias";
pub const PROVEEDORES: &str = "proveedores";
pub const VENTAS: &str = "ventas";
pub const FIADOS: &str = "fiados";
pub const TICKETS: &str = "tickets";
pub const USUARIOS: &str = "usuarios";
pub const ROLES: &str = "roles";
pub const REPORTES: &str = "reportes";

/// Application modules (10)
pub const ALL_MODULES: &[&str] = &[
    DASHBOARD,
    PRODUCTOS,
    CATEGORIAS,
    PROVEEDORES,
    VENTAS,
    FIADOS,
    TICKETS,
    USUARIOS,
    ROLES,
    REPORTES,
];

pub const VIEW: &str = "view";
pub const CREATE: &str = "create";
pub const EDIT: &str = "edit";
pub const DELETE: &str = "delete";
pub const EXPORT: &str = "export";

/// Actions a list grant may name
pub const ALL_ACTIONS: &[&str] = &[VIEW, CREATE, EDIT, DELETE, EXPORT];

pub const ROLE_ADMIN: &str = "Administrador";
pub const ROLE_SELLER: &str = "Vendedor";
pub const ROLE_STOCK: &str = "Almacen";

/// Default permission set for a role template name
pub fn default_permissions(role_name: &str) -> PermissionSet {
    match role_name {
        ROLE_ADMIN => PermissionSet::All,
        ROLE_SELLER => PermissionSet::empty()
            .with_module(DASHBOARD, ModuleGrant::Whole(true))
            .with_module(VENTAS, ModuleGrant::actions([VIEW, CREATE]))
            .with_module(FIADOS, ModuleGrant::actions([VIEW, CREATE]))
            .with_module(TICKETS, ModuleGrant::actions([VIEW, CREATE]))
            .with_module(PRODUCTOS, ModuleGrant::actions([VIEW]))
            .with_module(CATEGORIAS, ModuleGrant::actions([VIEW])),
        ROLE_STOCK => PermissionSet::empty()
            .with_module(DASHBOARD, ModuleGrant::Whole(true))
            .with_module(PRODUCTOS, ModuleGrant::actions([VIEW, CREATE, EDIT]))
            .with_module(CATEGORIAS, ModuleGrant::actions([VIEW, CREATE, EDIT]))
            .with_module(PROVEEDORES, ModuleGrant::actions([VIEW, CREATE, EDIT])),
        _ => PermissionSet::empty(),
    }
}

pub fn is_valid_module(module: &str) -> bool {
    ALL_MODULES.contains(&module)
}

pub fn is_valid_action(action: &str) -> bool {
    ALL_ACTIONS.contains(&action)
}

/// Names in a permission set that fall outside the catalogue
///
/// Returned as `module` or `module:action` strings. Always empty for the sentinel.
pub fn unknown_entries(set: &PermissionSet) -> Vec<String> {
    let PermissionSet::Modules(modules) = set else {
        return Vec::new();
    };

    let mut unknown = Vec::new();
    for (module, grant) in modules {
        if !is_valid_module(module) {
            unknown.push(module.clone());
            continue;
        }
        if let ModuleGrant::Actions(actions) = grant {
            unknown.extend(
                actions
                    .iter()
                    .filter(|a| !is_valid_action(a))
                    .map(|a| format!("{}:{}", module, a)),
            );
        }
    }
    unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_template_is_sentinel() {
        assert_eq!(default_permissions(ROLE_ADMIN), PermissionSet::All);
    }

    #[test]
    fn test_seller_template() {
        let set = default_permissions(ROLE_SELLER);
        assert!(set.allows(VENTAS, CREATE));
        assert!(!set.allows(VENTAS, DELETE));
        assert!(set.allows(DASHBOARD, EXPORT));
        assert!(!set.allows(USUARIOS, VIEW));
        assert!(unknown_entries(&set).is_empty());
    }

    #[test]
    fn test_unknown_template_is_empty() {
        assert_eq!(default_permissions("Invitado"), PermissionSet::empty());
    }

    #[test]
    fn test_unknown_entries() {
        let set = PermissionSet::empty()
            .with_module(VENTAS, ModuleGrant::actions([VIEW, "approve"]))
            .with_module("inventario", ModuleGrant::Whole(true));
        assert_eq!(unknown_entries(&set), vec!["inventario", "ventas:approve"]);
        assert!(unknown_entries(&PermissionSet::All).is_empty());
    }
}
