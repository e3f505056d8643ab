use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AccessError, CoreError};
use crate::models::{GroupMember, Membership, NewMemberData, PermissionCode, Role};
use crate::repository::{is_unique_violation, MembershipRepository, SqliteRepository};

#[async_trait]
impl MembershipRepository for SqliteRepository {
    async fn add_member(&self, data: NewMemberData) -> Result<GroupMember, CoreError> {
        let mut tx = self.pool().begin().await?;

        let group_exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM groups WHERE id = $1")
                .bind(data.group_id)
                .fetch_optional(&mut *tx)
                .await?;
        if group_exists.is_none() {
            return Err(CoreError::NotFound(format!(
                "Group with ID {} not found",
                data.group_id
            )));
        }

        let role = match data.role_id {
            Some(role_id) => {
                let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
                    .bind(role_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| {
                        CoreError::NotFound(format!("Role with ID {} not found", role_id))
                    })?;
                if role.group_id.is_some() && role.group_id != Some(data.group_id) {
                    return Err(CoreError::InvalidInput(
                        "role belongs to a different group".to_string(),
                    ));
                }
                if role.is_owner() {
                    return Err(CoreError::OwnerRoleImmutable);
                }
                role
            }
            None => default_role(&mut tx, data.group_id).await?,
        };

        let member = GroupMember {
            group_id: data.group_id,
            user_id: data.user_id,
            role_id: role.id,
            joined_at: Utc::now(),
        };

        let result = sqlx::query(
            "INSERT INTO group_members (group_id, user_id, role_id, joined_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(member.group_id)
        .bind(member.user_id)
        .bind(member.role_id)
        .bind(member.joined_at)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(CoreError::InvalidInput(
                    "user is already a member of this group".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;

        Ok(member)
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        let (member, role) = member_with_role(&mut tx, group_id, user_id).await?;
        // The owner leaves only via ownership transfer.
        if role.is_owner() {
            return Err(CoreError::OwnerRoleImmutable);
        }

        sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
            .bind(member.group_id)
            .bind(member.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn change_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<GroupMember, CoreError> {
        let mut tx = self.pool().begin().await?;

        let (mut member, current_role) = member_with_role(&mut tx, group_id, user_id).await?;
        if current_role.is_owner() {
            return Err(CoreError::OwnerRoleImmutable);
        }

        let new_role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Role with ID {} not found", role_id)))?;
        if new_role.is_owner() {
            return Err(CoreError::OwnerRoleImmutable);
        }
        if new_role.group_id.is_some() && new_role.group_id != Some(group_id) {
            return Err(CoreError::InvalidInput(
                "role belongs to a different group".to_string(),
            ));
        }

        sqlx::query("UPDATE group_members SET role_id = $1 WHERE group_id = $2 AND user_id = $3")
            .bind(new_role.id)
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        member.role_id = new_role.id;

        tx.commit().await?;
        Ok(member)
    }

    async fn transfer_ownership(
        &self,
        group_id: Uuid,
        new_owner_user_id: Uuid,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        let owner_role: Role = sqlx::query_as(
            "SELECT r.* FROM roles r WHERE r.group_id = $1 AND r.name = 'OWNER'",
        )
        .bind(group_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Group with ID {} not found", group_id)))?;

        let current_owner: GroupMember = sqlx::query_as(
            "SELECT * FROM group_members WHERE group_id = $1 AND role_id = $2",
        )
        .bind(group_id)
        .bind(owner_role.id)
        .fetch_one(&mut *tx)
        .await?;

        if current_owner.user_id == new_owner_user_id {
            return Ok(());
        }

        let new_owner: Option<GroupMember> = sqlx::query_as(
            "SELECT * FROM group_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(new_owner_user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let new_owner = new_owner.ok_or(CoreError::Access(AccessError::NotAMember))?;

        let fallback = default_role(&mut tx, group_id).await?;

        // Both updates commit together so exactly one member holds OWNER at
        // every visible point.
        sqlx::query("UPDATE group_members SET role_id = $1 WHERE group_id = $2 AND user_id = $3")
            .bind(owner_role.id)
            .bind(group_id)
            .bind(new_owner.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE group_members SET role_id = $1 WHERE group_id = $2 AND user_id = $3")
            .bind(fallback.id)
            .bind(group_id)
            .bind(current_owner.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, CoreError> {
        let members = sqlx::query_as::<_, GroupMember>(
            "SELECT * FROM group_members WHERE group_id = $1 ORDER BY joined_at",
        )
        .bind(group_id)
        .fetch_all(self.pool())
        .await?;
        Ok(members)
    }

    async fn resolve_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, CoreError> {
        let member: Option<GroupMember> = sqlx::query_as(
            "SELECT * FROM group_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        let member = member.ok_or(CoreError::Access(AccessError::NotAMember))?;

        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(member.role_id)
            .fetch_one(self.pool())
            .await?;

        let rows: Vec<(PermissionCode,)> = sqlx::query_as(
            "SELECT permission FROM role_permissions WHERE role_id = $1 ORDER BY position",
        )
        .bind(role.id)
        .fetch_all(self.pool())
        .await?;

        Ok(Membership {
            member,
            role,
            permissions: rows.into_iter().map(|(code,)| code).collect(),
        })
    }
}

async fn member_with_role(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<(GroupMember, Role), CoreError> {
    let member: Option<GroupMember> = sqlx::query_as(
        "SELECT * FROM group_members WHERE group_id = $1 AND user_id = $2",
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
    let member = member.ok_or(CoreError::Access(AccessError::NotAMember))?;

    let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
        .bind(member.role_id)
        .fetch_one(&mut **tx)
        .await?;

    Ok((member, role))
}

/// The group-scoped default role, falling back to a shared default. Group
/// bootstrap guarantees one exists for every group created through the API.
async fn default_role(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    group_id: Uuid,
) -> Result<Role, CoreError> {
    let scoped: Option<Role> = sqlx::query_as(
        "SELECT * FROM roles WHERE group_id = $1 AND is_default = 1",
    )
    .bind(group_id)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(role) = scoped {
        return Ok(role);
    }

    let shared: Option<Role> = sqlx::query_as(
        "SELECT * FROM roles WHERE group_id IS NULL AND is_default = 1",
    )
    .fetch_optional(&mut **tx)
    .await?;
    shared.ok_or_else(|| {
        CoreError::NotFound(format!("No default role exists for group {}", group_id))
    })
}
