//! Role-based authorization.
//!
//! Every check in the HTTP layer goes through [`is_allowed`], which consults
//! the single [`POLICY`] table below.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Staff roles known to the venue backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Superuser,
    Owner,
    Manager,
    Waiter,
    Cashier,
    Chef,
    Delivery,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Superuser,
        Role::Owner,
        Role::Manager,
        Role::Waiter,
        Role::Cashier,
        Role::Chef,
        Role::Delivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superuser => "SUPERUSER",
            Role::Owner => "OWNER",
            Role::Manager => "MANAGER",
            Role::Waiter => "WAITER",
            Role::Cashier => "CASHIER",
            Role::Chef => "CHEF",
            Role::Delivery => "DELIVERY",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown role '{s}'"))
    }
}

/// Guarded operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CategoryRead,
    CategoryCreate,
    CategoryUpdate,
    CategorySoftDelete,
    CategoryRestore,
    CategoryHardDelete,
    CategoryListDeleted,
    UserManage,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CategoryRead => "category:read",
            Operation::CategoryCreate => "category:create",
            Operation::CategoryUpdate => "category:update",
            Operation::CategorySoftDelete => "category:soft_delete",
            Operation::CategoryRestore => "category:restore",
            Operation::CategoryHardDelete => "category:hard_delete",
            Operation::CategoryListDeleted => "category:list_deleted",
            Operation::UserManage => "user:manage",
        }
    }
}

enum Allowed {
    /// Any authenticated principal.
    Anyone,
    Roles(&'static [Role]),
}

const CATEGORY_EDITORS: &[Role] = &[Role::Superuser, Role::Owner, Role::Manager];

const POLICY: &[(Operation, Allowed)] = &[
    (Operation::CategoryRead, Allowed::Anyone),
    (Operation::CategoryCreate, Allowed::Roles(CATEGORY_EDITORS)),
    (Operation::CategoryUpdate, Allowed::Roles(CATEGORY_EDITORS)),
    (Operation::CategorySoftDelete, Allowed::Roles(CATEGORY_EDITORS)),
    (Operation::CategoryRestore, Allowed::Roles(CATEGORY_EDITORS)),
    (Operation::CategoryHardDelete, Allowed::Roles(CATEGORY_EDITORS)),
    (Operation::CategoryListDeleted, Allowed::Roles(CATEGORY_EDITORS)),
    (Operation::UserManage, Allowed::Roles(&[Role::Superuser, Role::Owner])),
];

/// Check a raw role string against the policy table.
///
/// Unrecognised role strings only pass operations open to anyone.
pub fn is_allowed(operation: Operation, role: &str) -> bool {
    let Some((_, allowed)) = POLICY.iter().find(|(op, _)| *op == operation) else {
        return false;
    };
    match allowed {
        Allowed::Anyone => true,
        Allowed::Roles(roles) => role
            .parse::<Role>()
            .is_ok_and(|role| roles.contains(&role)),
    }
}

/// Every operation the given role may perform, for display in `/auth/me`.
pub fn operations_for(role: &str) -> Vec<&'static str> {
    POLICY
        .iter()
        .filter(|(op, _)| is_allowed(*op, role))
        .map(|(op, _)| op.as_str())
        .collect()
}
