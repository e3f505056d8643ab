use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{
    Group, NewGroupData, PermissionCode, DEFAULT_MEMBER_ROLE_NAME, OWNER_ROLE_NAME,
};
use crate::repository::{GroupRepository, SqliteRepository};

#[async_trait]
impl GroupRepository for SqliteRepository {
    async fn create_group(&self, data: NewGroupData) -> Result<Group, CoreError> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput(
                "group name cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let group = Group {
            id: Uuid::now_v7(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await?;

        sqlx::query("INSERT INTO groups (id, name, created_at, updated_at) VALUES ($1, $2, $3, $4)")
            .bind(group.id)
            .bind(&group.name)
            .bind(group.created_at)
            .bind(group.updated_at)
            .execute(&mut *tx)
            .await?;

        // Bootstrap the two seed roles: OWNER with the full permission set,
        // and the default member role with the read-only subset.
        let owner_role_id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO roles (id, group_id, name, color, sort_order, is_default, created_at, updated_at)
             VALUES ($1, $2, $3, NULL, 0, 0, $4, $4)",
        )
        .bind(owner_role_id)
        .bind(group.id)
        .bind(OWNER_ROLE_NAME)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, permission) in PermissionCode::ALL.iter().enumerate() {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, position, permission) VALUES ($1, $2, $3)",
            )
            .bind(owner_role_id)
            .bind(position as i64)
            .bind(permission)
            .execute(&mut *tx)
            .await?;
        }

        let member_role_id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO roles (id, group_id, name, color, sort_order, is_default, created_at, updated_at)
             VALUES ($1, $2, $3, NULL, 1, 1, $4, $4)",
        )
        .bind(member_role_id)
        .bind(group.id)
        .bind(DEFAULT_MEMBER_ROLE_NAME)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, permission) in PermissionCode::READ_ONLY.iter().enumerate() {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, position, permission) VALUES ($1, $2, $3)",
            )
            .bind(member_role_id)
            .bind(position as i64)
            .bind(permission)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO group_members (group_id, user_id, role_id, joined_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(group.id)
        .bind(data.owner_user_id)
        .bind(owner_role_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(group)
    }

    async fn find_group_by_id(&self, id: Uuid) -> Result<Option<Group>, CoreError> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, CoreError> {
        let groups = sqlx::query_as::<_, Group>("SELECT * FROM groups ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(groups)
    }

    async fn delete_group(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        // Deletion order respects the foreign keys: generated instances and
        // skip dates go before their series, series before their templates.
        sqlx::query(
            "DELETE FROM task_participants WHERE task_id IN (SELECT id FROM tasks WHERE group_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM task_reminders WHERE task_id IN (SELECT id FROM tasks WHERE group_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM skip_dates WHERE series_id IN (
                 SELECT s.id FROM recurring_series s
                 JOIN tasks t ON t.id = s.template_task_id
                 WHERE t.group_id = $1
             )",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tasks WHERE group_id = $1 AND series_id IS NOT NULL")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM recurring_series WHERE template_task_id IN (
                 SELECT id FROM tasks WHERE group_id = $1
             )",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tasks WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM group_members WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM role_permissions WHERE role_id IN (SELECT id FROM roles WHERE group_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM roles WHERE group_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Group with ID {} not found",
                id
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}
