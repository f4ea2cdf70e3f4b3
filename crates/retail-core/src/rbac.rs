//! # Role-Based Access Control
//!
//! Static permission tables keyed by [`Role`]. The role itself is looked up
//! by the caller (employees table, by session email); users without an
//! employee row get no permissions.
//!
//! ```text
//!               dash  emp_stats  sales  m_sales  inv  m_inv  emps  m_emps  reports
//! Manager        ✓       ✓        ✓       ✓      ✓     ✓      ✓     ✓       ✓
//! Sales                           ✓       ✓      ✓
//! Supplier
//! ```

use serde::{Deserialize, Serialize};

use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewDashboard,
    ViewEmployeeStats,
    ViewSales,
    ManageSales,
    ViewInventory,
    ManageInventory,
    ViewEmployees,
    ManageEmployees,
    ViewReports,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::ViewDashboard,
        Permission::ViewEmployeeStats,
        Permission::ViewSales,
        Permission::ManageSales,
        Permission::ViewInventory,
        Permission::ManageInventory,
        Permission::ViewEmployees,
        Permission::ManageEmployees,
        Permission::ViewReports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewDashboard => "view_dashboard",
            Permission::ViewEmployeeStats => "view_employee_stats",
            Permission::ViewSales => "view_sales",
            Permission::ManageSales => "manage_sales",
            Permission::ViewInventory => "view_inventory",
            Permission::ManageInventory => "manage_inventory",
            Permission::ViewEmployees => "view_employees",
            Permission::ManageEmployees => "manage_employees",
            Permission::ViewReports => "view_reports",
        }
    }
}

const SALES_PERMISSIONS: &[Permission] = &[
    Permission::ViewInventory,
    Permission::ManageSales,
    Permission::ViewSales,
];

/// Permissions granted to a role.
pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Manager => &Permission::ALL,
        Role::Sales => SALES_PERMISSIONS,
        Role::Supplier => &[],
    }
}

/// Checks a possibly unknown role against a permission.
pub fn has_permission(role: Option<Role>, permission: Permission) -> bool {
    role.map_or(false, |role| permissions_for(role).contains(&permission))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_has_everything() {
        for permission in Permission::ALL {
            assert!(has_permission(Some(Role::Manager), permission));
        }
    }

    #[test]
    fn test_sales_table() {
        let granted: Vec<Permission> = Permission::ALL
            .into_iter()
            .filter(|p| has_permission(Some(Role::Sales), *p))
            .collect();
        assert_eq!(
            granted,
            vec![
                Permission::ViewSales,
                Permission::ManageSales,
                Permission::ViewInventory
            ]
        );
    }

    #[test]
    fn test_supplier_and_unknown_get_nothing() {
        for permission in Permission::ALL {
            assert!(!has_permission(Some(Role::Supplier), permission));
            assert!(!has_permission(None, permission));
        }
    }

    #[test]
    fn test_permission_names() {
        let json = serde_json::to_string(&Permission::ViewEmployeeStats).unwrap();
        assert_eq!(json, "\"view_employee_stats\"");
        assert_eq!(Permission::ManageInventory.as_str(), "manage_inventory");
    }
}
