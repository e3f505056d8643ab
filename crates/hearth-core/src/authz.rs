use uuid::Uuid;

use crate::error::{AccessError, CoreError};
use crate::models::{Membership, PermissionCode};
use crate::repository::MembershipRepository;

/// The group identifier as it may arrive from a request, in every shape the
/// transport layer produces. Resolution precedence is explicit and testable
/// independently of any transport: path `groupId`, then path `id`, then the
/// body field, then the query parameter. First non-empty source wins.
#[derive(Debug, Clone, Default)]
pub struct GroupIdSources {
    pub path_group_id: Option<String>,
    pub path_id: Option<String>,
    pub body_group_id: Option<String>,
    pub query_group_id: Option<String>,
}

impl GroupIdSources {
    pub fn from_path_group_id(value: impl Into<String>) -> Self {
        Self {
            path_group_id: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn from_path_id(value: impl Into<String>) -> Self {
        Self {
            path_id: Some(value.into()),
            ..Default::default()
        }
    }

    /// Applies the precedence order. A present-but-unparseable winner fails
    /// closed as `MissingContext`; nothing falls through to later sources.
    pub fn resolve(&self) -> Result<Uuid, AccessError> {
        let winner = [
            &self.path_group_id,
            &self.path_id,
            &self.body_group_id,
            &self.query_group_id,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .ok_or(AccessError::MissingContext)?;

        Uuid::parse_str(winner).map_err(|_| AccessError::MissingContext)
    }
}

/// AuthorizationGate: wraps group-scoped operations with a fail-closed
/// membership/permission check.
///
/// Checks run in a fixed order: authenticated identity, resolvable group id,
/// existing membership, then the gate-specific requirement. On success the
/// resolved membership is returned so the wrapped operation need not
/// re-resolve. Checks are read-only and impose no lock.
pub struct AuthorizationGate<'a, R: MembershipRepository> {
    members: &'a R,
}

impl<'a, R: MembershipRepository> AuthorizationGate<'a, R> {
    pub fn new(members: &'a R) -> Self {
        Self { members }
    }

    /// Requires the caller's role to grant `required`.
    pub async fn require_permission(
        &self,
        identity: Option<Uuid>,
        sources: &GroupIdSources,
        required: PermissionCode,
    ) -> Result<Membership, CoreError> {
        let membership = self.resolve(identity, sources).await?;
        if !membership.has_permission(required) {
            return Err(AccessError::Forbidden {
                required,
                role: membership.role.name.clone(),
            }
            .into());
        }
        Ok(membership)
    }

    /// Requires the caller to hold the OWNER role. Used for destructive and
    /// ownership-transfer operations; the permission set is not consulted.
    pub async fn require_owner(
        &self,
        identity: Option<Uuid>,
        sources: &GroupIdSources,
    ) -> Result<Membership, CoreError> {
        let membership = self.resolve(identity, sources).await?;
        if !membership.is_owner() {
            return Err(AccessError::Forbidden {
                required: PermissionCode::GroupDelete,
                role: membership.role.name.clone(),
            }
            .into());
        }
        Ok(membership)
    }

    /// Requires only that a membership exists, any role. Used for read-mostly
    /// group endpoints.
    pub async fn require_member(
        &self,
        identity: Option<Uuid>,
        sources: &GroupIdSources,
    ) -> Result<Membership, CoreError> {
        self.resolve(identity, sources).await
    }

    async fn resolve(
        &self,
        identity: Option<Uuid>,
        sources: &GroupIdSources,
    ) -> Result<Membership, CoreError> {
        let user_id = identity.ok_or(AccessError::Unauthenticated)?;
        let group_id = sources.resolve().map_err(CoreError::from)?;
        self.members.resolve_membership(group_id, user_id).await
    }
}
