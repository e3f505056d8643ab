use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{GenerationMode, RecurringSeries, UpdateSeriesData};
use crate::repository::{SeriesRepository, SqliteRepository};

#[async_trait]
impl SeriesRepository for SqliteRepository {
    async fn find_series_by_id(&self, id: Uuid) -> Result<Option<RecurringSeries>, CoreError> {
        let series =
            sqlx::query_as::<_, RecurringSeries>("SELECT * FROM recurring_series WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        Ok(series)
    }

    async fn find_series_by_template(
        &self,
        template_task_id: Uuid,
    ) -> Result<Option<RecurringSeries>, CoreError> {
        let series = sqlx::query_as::<_, RecurringSeries>(
            "SELECT * FROM recurring_series WHERE template_task_id = $1",
        )
        .bind(template_task_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(series)
    }

    async fn list_series(&self) -> Result<Vec<RecurringSeries>, CoreError> {
        let series = sqlx::query_as::<_, RecurringSeries>(
            "SELECT * FROM recurring_series ORDER BY created_at",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(series)
    }

    async fn find_active_auto_series(&self) -> Result<Vec<RecurringSeries>, CoreError> {
        let series = sqlx::query_as::<_, RecurringSeries>(
            "SELECT * FROM recurring_series WHERE active = 1 AND generation = $1 ORDER BY created_at",
        )
        .bind(GenerationMode::AutoScheduler)
        .fetch_all(self.pool())
        .await?;
        Ok(series)
    }

    async fn update_series(
        &self,
        id: Uuid,
        data: UpdateSeriesData,
    ) -> Result<RecurringSeries, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut series =
            sqlx::query_as::<_, RecurringSeries>("SELECT * FROM recurring_series WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    CoreError::NotFound(format!("Series with ID {} not found", id))
                })?;

        if let Some(rule) = data.rule {
            rule.validate()?;
            series.rule = sqlx::types::Json(rule);
        }
        if let Some(generation) = data.generation {
            series.generation = generation;
        }
        if let Some(active) = data.active {
            series.active = active;
        }
        series.updated_at = Utc::now();

        // generated_count and last_generated_through are untouched: a rule
        // edit affects future occurrences only, already-materialized tasks
        // stay as they are.
        sqlx::query(
            "UPDATE recurring_series SET rule = $1, generation = $2, active = $3, updated_at = $4
             WHERE id = $5",
        )
        .bind(&series.rule)
        .bind(series.generation)
        .bind(series.active)
        .bind(series.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(series)
    }

    async fn delete_series(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        let (instance_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE series_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if instance_count > 0 {
            return Err(CoreError::InvalidInput(format!(
                "{} generated task(s) still reference this series; deactivate it instead",
                instance_count
            )));
        }

        sqlx::query("DELETE FROM skip_dates WHERE series_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM recurring_series WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Series with ID {} not found",
                id
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}
