use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    NewRoleData, PermissionCode, Role, UpdateRoleData, OWNER_ROLE_NAME,
};
use crate::repository::{RoleRepository, SqliteRepository};

#[async_trait]
impl RoleRepository for SqliteRepository {
    async fn create_role(&self, data: NewRoleData) -> Result<Role, CoreError> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput(
                "role name cannot be empty".to_string(),
            ));
        }
        // OWNER exists exactly once per group and only via group bootstrap.
        if name == OWNER_ROLE_NAME {
            return Err(CoreError::OwnerRoleImmutable);
        }

        let now = Utc::now();
        let role = Role {
            id: Uuid::now_v7(),
            group_id: data.group_id,
            name: name.to_string(),
            color: data.color,
            sort_order: data.sort_order,
            is_default: data.is_default,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await?;

        let collision: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM roles WHERE group_id IS $1 AND name = $2")
                .bind(data.group_id)
                .bind(&role.name)
                .fetch_optional(&mut *tx)
                .await?;
        if collision.is_some() {
            return Err(CoreError::DuplicateRoleName(role.name));
        }

        if role.is_default {
            sqlx::query("UPDATE roles SET is_default = 0 WHERE group_id IS $1 AND is_default = 1")
                .bind(data.group_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO roles (id, group_id, name, color, sort_order, is_default, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(role.id)
        .bind(role.group_id)
        .bind(&role.name)
        .bind(&role.color)
        .bind(role.sort_order)
        .bind(role.is_default)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_permissions(&mut tx, role.id, &data.permissions).await?;

        tx.commit().await?;

        Ok(role)
    }

    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, CoreError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(role)
    }

    async fn list_roles(&self, group_id: Option<Uuid>) -> Result<Vec<Role>, CoreError> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT * FROM roles WHERE group_id IS $1 ORDER BY sort_order, name",
        )
        .bind(group_id)
        .fetch_all(self.pool())
        .await?;
        Ok(roles)
    }

    async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<PermissionCode>, CoreError> {
        let rows: Vec<(PermissionCode,)> = sqlx::query_as(
            "SELECT permission FROM role_permissions WHERE role_id = $1 ORDER BY position",
        )
        .bind(role_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(code,)| code).collect())
    }

    async fn update_role(&self, id: Uuid, data: UpdateRoleData) -> Result<Role, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Role with ID {} not found", id)))?;

        if role.is_owner() {
            return Err(CoreError::OwnerRoleImmutable);
        }

        if let Some(name) = data.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CoreError::InvalidInput(
                    "role name cannot be empty".to_string(),
                ));
            }
            if name == OWNER_ROLE_NAME {
                return Err(CoreError::OwnerRoleImmutable);
            }
            let collision: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM roles WHERE group_id IS $1 AND name = $2 AND id != $3",
            )
            .bind(role.group_id)
            .bind(&name)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            if collision.is_some() {
                return Err(CoreError::DuplicateRoleName(name));
            }
            role.name = name;
        }
        if let Some(color) = data.color {
            role.color = color;
        }
        if let Some(sort_order) = data.sort_order {
            role.sort_order = sort_order;
        }
        if let Some(is_default) = data.is_default {
            if is_default && !role.is_default {
                sqlx::query(
                    "UPDATE roles SET is_default = 0 WHERE group_id IS $1 AND is_default = 1",
                )
                .bind(role.group_id)
                .execute(&mut *tx)
                .await?;
            }
            role.is_default = is_default;
        }
        role.updated_at = Utc::now();

        sqlx::query(
            "UPDATE roles SET name = $1, color = $2, sort_order = $3, is_default = $4, updated_at = $5
             WHERE id = $6",
        )
        .bind(&role.name)
        .bind(&role.color)
        .bind(role.sort_order)
        .bind(role.is_default)
        .bind(role.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(permissions) = data.permissions {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_permissions(&mut tx, id, &permissions).await?;
        }

        tx.commit().await?;

        Ok(role)
    }

    async fn delete_role(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Role with ID {} not found", id)))?;

        if role.is_owner() {
            return Err(CoreError::OwnerRoleImmutable);
        }

        let (member_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM group_members WHERE role_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if member_count > 0 {
            return Err(CoreError::RoleInUse(format!(
                "{} member(s) still hold the '{}' role",
                member_count, role.name
            )));
        }
        if role.is_default {
            return Err(CoreError::RoleInUse(format!(
                "'{}' is the default role; designate another default first",
                role.name
            )));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn insert_permissions(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    role_id: Uuid,
    permissions: &[PermissionCode],
) -> Result<(), CoreError> {
    // Duplicates in the input collapse onto the (role_id, permission) key;
    // keep the first position.
    let mut seen = Vec::with_capacity(permissions.len());
    for permission in permissions {
        if seen.contains(permission) {
            continue;
        }
        sqlx::query(
            "INSERT INTO role_permissions (role_id, position, permission) VALUES ($1, $2, $3)",
        )
        .bind(role_id)
        .bind(seen.len() as i64)
        .bind(permission)
        .execute(&mut **tx)
        .await?;
        seen.push(*permission);
    }
    Ok(())
}
