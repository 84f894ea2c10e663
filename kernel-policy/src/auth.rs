//! Auth middleware: evaluates a caller identity against a tool's required
//! permission.

use std::collections::BTreeSet;

use kernel_primitives::{Permission, Role, UserIdentity};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::roles::RoleTable;
use crate::rules::PermissionRules;

/// Outcome of an authorization check. Produced per call and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    required_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required_permissions: Vec<Permission>,
}

impl AuthResult {
    /// Returns an allow result with no additional context.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            required_role: None,
            required_permissions: Vec::new(),
        }
    }

    /// Returns a deny result naming what would have satisfied the check.
    #[must_use]
    pub fn deny(
        reason: impl Into<String>,
        required_role: Option<Role>,
        required_permissions: Vec<Permission>,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            required_role,
            required_permissions,
        }
    }

    /// Returns true when the call may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Returns the denial reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns the minimum role that would satisfy a denied check.
    #[must_use]
    pub const fn required_role(&self) -> Option<Role> {
        self.required_role
    }

    /// Returns the permissions a denied check was missing.
    #[must_use]
    pub fn required_permissions(&self) -> &[Permission] {
        &self.required_permissions
    }
}

/// Trait implemented by authorization backends.
///
/// Implementations must be pure: the same tool, identity, and configuration
/// always produce the same [`AuthResult`].
pub trait Authorizer: Send + Sync {
    /// Evaluates whether `identity` may invoke `tool_name`.
    fn check(&self, tool_name: &str, identity: &UserIdentity) -> AuthResult;

    /// Returns the permission required to invoke `tool_name`.
    fn required_permission(&self, tool_name: &str) -> Permission;

    /// Returns every permission `identity` holds.
    fn effective_permissions(&self, identity: &UserIdentity) -> BTreeSet<Permission>;
}

/// Role-based authorizer backed by a [`RoleTable`] and [`PermissionRules`].
#[derive(Debug, Clone)]
pub struct RbacAuthorizer {
    enabled: bool,
    roles: RoleTable,
    rules: PermissionRules,
}

impl RbacAuthorizer {
    /// Creates an authorizer. When `enabled` is false every check is allowed.
    #[must_use]
    pub fn new(enabled: bool, roles: RoleTable, rules: PermissionRules) -> Self {
        Self {
            enabled,
            roles,
            rules,
        }
    }

    /// Creates an authorizer with the standard role table and rule chain.
    #[must_use]
    pub fn standard(enabled: bool) -> Self {
        Self::new(enabled, RoleTable::standard(), PermissionRules::standard())
    }

    /// Returns whether enforcement is on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the role table.
    #[must_use]
    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Returns the rule chain.
    #[must_use]
    pub fn rules(&self) -> &PermissionRules {
        &self.rules
    }
}

impl Authorizer for RbacAuthorizer {
    fn check(&self, tool_name: &str, identity: &UserIdentity) -> AuthResult {
        if !self.enabled {
            return AuthResult::allow();
        }

        let required = self.rules.required_permission(tool_name);
        if self.roles.effective_permissions(identity).contains(&required) {
            debug!(tool = tool_name, user_id = identity.user_id(), role = %identity.role(), "auth allow");
            return AuthResult::allow();
        }

        let minimum_role = self.roles.minimum_role_for(required);
        let role_hint = minimum_role.map_or_else(|| "no role".to_owned(), |role| role.to_string());
        let reason = format!(
            "role `{}` lacks permission `{required}` required by tool `{tool_name}`; minimum role: {role_hint}",
            identity.role()
        );
        debug!(tool = tool_name, user_id = identity.user_id(), %reason, "auth deny");
        AuthResult::deny(reason, minimum_role, vec![required])
    }

    fn required_permission(&self, tool_name: &str) -> Permission {
        self.rules.required_permission(tool_name)
    }

    fn effective_permissions(&self, identity: &UserIdentity) -> BTreeSet<Permission> {
        self.roles.effective_permissions(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> UserIdentity {
        UserIdentity::builder("user-1", role).build().unwrap()
    }

    #[test]
    fn analyst_denied_decisions_with_executive_hint() {
        let auth = RbacAuthorizer::standard(true);
        let result = auth.check("decision.make_investment_decision", &identity(Role::Analyst));

        assert!(!result.is_allowed());
        assert_eq!(result.required_role(), Some(Role::Executive));
        assert_eq!(result.required_permissions(), [Permission::ExecuteDecisions]);
        let reason = result.reason().unwrap();
        assert!(reason.contains("execute:decisions"));
        assert!(reason.contains("executive"));
    }

    #[test]
    fn admin_allowed_everywhere() {
        let auth = RbacAuthorizer::standard(true);
        for tool in [
            "decision.make_investment_decision",
            "admin.users.grant",
            "admin.servers.restart",
            "reporter.render",
            "geowiz.parse_las_file",
        ] {
            assert!(auth.check(tool, &identity(Role::Admin)).is_allowed(), "{tool}");
        }
    }

    #[test]
    fn disabled_auth_always_allows() {
        let empty = RoleTable::new(Vec::<(Role, Vec<Permission>)>::new());
        let auth = RbacAuthorizer::new(false, empty, PermissionRules::standard());
        for role in Role::ASCENDING {
            let result = auth.check("admin.users.delete", &identity(role));
            assert_eq!(result, AuthResult::allow());
        }
    }

    #[test]
    fn explicit_grant_satisfies_check() {
        let auth = RbacAuthorizer::standard(true);
        let analyst = UserIdentity::builder("ana", Role::Analyst)
            .grant(Permission::WriteReports)
            .build()
            .unwrap();
        assert!(auth.check("reporter.render", &analyst).is_allowed());
        assert!(!auth.check("reporter.render", &identity(Role::Analyst)).is_allowed());
    }

    #[test]
    fn check_is_deterministic() {
        let auth = RbacAuthorizer::standard(true);
        let engineer = identity(Role::Engineer);
        let first = auth.check("decision.approve", &engineer);
        let second = auth.check("decision.approve", &engineer);
        assert_eq!(first, second);
    }

    #[test]
    fn serializes_camel_case() {
        let result = AuthResult::deny("nope", Some(Role::Admin), vec![Permission::AdminUsers]);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["allowed"], false);
        assert_eq!(value["requiredRole"], "admin");
        assert_eq!(value["requiredPermissions"][0], "admin:users");
    }
}
