//! Static role to permission table.

use std::collections::{BTreeMap, BTreeSet};

use kernel_primitives::{Permission, Role, UserIdentity};

/// Immutable mapping from role to its default permission set.
///
/// Higher roles list every permission of the roles beneath them explicitly;
/// nothing is inherited implicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    entries: BTreeMap<Role, BTreeSet<Permission>>,
}

impl RoleTable {
    /// Builds a table from explicit entries. Roles without an entry get no
    /// default permissions.
    #[must_use]
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Role, P)>,
        P: IntoIterator<Item = Permission>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(role, permissions)| (role, permissions.into_iter().collect()))
                .collect(),
        }
    }

    /// The standard analyst / engineer / executive / admin table.
    #[must_use]
    pub fn standard() -> Self {
        use Permission::{AdminServers, AdminUsers, ExecuteDecisions, ReadAnalysis, WriteReports};

        Self::new([
            (Role::Analyst, vec![ReadAnalysis]),
            (Role::Engineer, vec![ReadAnalysis, WriteReports]),
            (
                Role::Executive,
                vec![ReadAnalysis, WriteReports, ExecuteDecisions],
            ),
            (
                Role::Admin,
                vec![
                    ReadAnalysis,
                    WriteReports,
                    ExecuteDecisions,
                    AdminServers,
                    AdminUsers,
                ],
            ),
        ])
    }

    /// Returns the default permissions of `role`.
    #[must_use]
    pub fn permissions_for(&self, role: Role) -> BTreeSet<Permission> {
        self.entries.get(&role).cloned().unwrap_or_default()
    }

    /// Returns the role defaults united with the identity's explicit grants.
    #[must_use]
    pub fn effective_permissions(&self, identity: &UserIdentity) -> BTreeSet<Permission> {
        let mut permissions = self.permissions_for(identity.role());
        permissions.extend(identity.granted_permissions().iter().copied());
        permissions
    }

    /// Returns the lowest role, scanning the hierarchy in ascending order,
    /// whose defaults include `permission`.
    #[must_use]
    pub fn minimum_role_for(&self, permission: Permission) -> Option<Role> {
        Role::ASCENDING.into_iter().find(|role| {
            self.entries
                .get(role)
                .is_some_and(|permissions| permissions.contains(&permission))
        })
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::standard()
    }
}
