//! Caller identity attached to every tool invocation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Error, Permission, Result, Role, SessionId};

/// Identity of the caller for the lifetime of one session.
///
/// Held in memory only. `permissions` carries grants made beyond the role
/// defaults; the role table supplies the rest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    user_id: String,
    session_id: SessionId,
    role: Role,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    permissions: BTreeSet<Permission>,
}

impl UserIdentity {
    /// Starts building an identity for the given user and role.
    #[must_use]
    pub fn builder(user_id: impl Into<String>, role: Role) -> UserIdentityBuilder {
        UserIdentityBuilder {
            user_id: user_id.into(),
            session_id: None,
            role,
            permissions: BTreeSet::new(),
        }
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the assigned role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the explicitly granted permissions.
    #[must_use]
    pub fn granted_permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }
}

/// Builder for [`UserIdentity`].
#[derive(Debug)]
pub struct UserIdentityBuilder {
    user_id: String,
    session_id: Option<SessionId>,
    role: Role,
    permissions: BTreeSet<Permission>,
}

impl UserIdentityBuilder {
    /// Binds the identity to an existing session. A random session is used
    /// otherwise.
    #[must_use]
    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Grants a permission beyond the role defaults.
    #[must_use]
    pub fn grant(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    /// Grants several permissions at once.
    #[must_use]
    pub fn grants<I>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        self.permissions.extend(permissions);
        self
    }

    /// Consumes the builder and returns the identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] when the user id is blank.
    pub fn build(self) -> Result<UserIdentity> {
        if self.user_id.trim().is_empty() {
            return Err(Error::InvalidIdentity {
                reason: "user id cannot be empty".into(),
            });
        }

        Ok(UserIdentity {
            user_id: self.user_id,
            session_id: self.session_id.unwrap_or_default(),
            role: self.role,
            permissions: self.permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_identity_with_grants() {
        let session = SessionId::random();
        let identity = UserIdentity::builder("alice", Role::Analyst)
            .session_id(session)
            .grant(Permission::WriteReports)
            .build()
            .unwrap();

        assert_eq!(identity.user_id(), "alice");
        assert_eq!(identity.session_id(), session);
        assert_eq!(identity.role(), Role::Analyst);
        assert!(identity.granted_permissions().contains(&Permission::WriteReports));
    }

    #[test]
    fn user_id_is_required() {
        let err = UserIdentity::builder("  ", Role::Admin)
            .build()
            .expect_err("blank user id");
        assert!(matches!(err, Error::InvalidIdentity { .. }));
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let identity = UserIdentity::builder("bob", Role::Engineer).build().unwrap();
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["userId"], "bob");
        assert_eq!(value["role"], "engineer");
        assert!(value.get("permissions").is_none());
    }
}
