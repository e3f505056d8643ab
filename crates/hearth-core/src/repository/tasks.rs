use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::events::DomainEvent;
use crate::models::{
    CompletionResult, GenerationMode, NewTaskData, RecurringSeries, Task, TaskPriority,
    UpdateTaskData,
};
use crate::recurrence::RecurrenceCalculator;
use crate::repository::{
    GenerationRepository, SeriesRepository, SqliteRepository, TaskRepository,
};

#[async_trait]
impl TaskRepository for SqliteRepository {
    async fn add_task(&self, data: NewTaskData, actor: Option<Uuid>) -> Result<Task, CoreError> {
        let title = data.title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidInput(
                "task title cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::now_v7(),
            title: title.to_string(),
            description: data.description,
            scheduled_at: data.scheduled_at,
            due_at: data.due_at,
            priority: data.priority.unwrap_or(TaskPriority::None),
            completed: false,
            completed_at: None,
            user_id: data.user_id,
            group_id: data.group_id,
            category: data.category,
            series_id: None,
            occurrence_date: None,
            created_at: now,
            updated_at: now,
        };

        let series = match data.rule {
            Some(rule) => {
                rule.validate()?;
                let start_date = data
                    .start_date
                    .or_else(|| task.scheduled_at.map(|dt| dt.date_naive()))
                    .unwrap_or_else(|| Utc::now().date_naive());
                Some(RecurringSeries {
                    id: Uuid::now_v7(),
                    template_task_id: task.id,
                    rule: sqlx::types::Json(rule),
                    generation: data.generation.unwrap_or(GenerationMode::AutoScheduler),
                    start_date,
                    active: true,
                    generated_count: 0,
                    last_generated_through: None,
                    created_at: now,
                    updated_at: now,
                })
            }
            None => None,
        };

        let mut tx = self.pool().begin().await?;
        insert_task_tx(&mut tx, &task, &data.participants, &data.reminders).await?;

        if let Some(series) = &series {
            sqlx::query(
                "INSERT INTO recurring_series
                     (id, template_task_id, rule, generation, start_date, active,
                      generated_count, last_generated_through, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(series.id)
            .bind(series.template_task_id)
            .bind(&series.rule)
            .bind(series.generation)
            .bind(series.start_date)
            .bind(series.active)
            .bind(series.generated_count)
            .bind(series.last_generated_through)
            .bind(series.created_at)
            .bind(series.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.events().emit(DomainEvent::TaskCreated {
            actor,
            task: task.clone(),
        });

        // Auto-scheduled series get their initial window materialized
        // immediately; on-demand series wait for an explicit generate call.
        if let Some(series) = &series {
            if series.generation == GenerationMode::AutoScheduler {
                let today = Utc::now().date_naive();
                let horizon = today + chrono::Duration::days(self.generation_config().lookahead_days);
                self.generate_due(series.id, today, horizon).await?;
            }
        }

        Ok(task)
    }

    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(task)
    }

    async fn find_tasks_for_group(&self, group_id: Uuid) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE group_id = $1 ORDER BY scheduled_at, created_at",
        )
        .bind(group_id)
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }

    async fn find_tasks_for_series(&self, series_id: Uuid) -> Result<Vec<Task>, CoreError> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE series_id = $1 ORDER BY occurrence_date",
        )
        .bind(series_id)
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }

    async fn update_task(
        &self,
        id: Uuid,
        data: UpdateTaskData,
        actor: Option<Uuid>,
    ) -> Result<Task, CoreError> {
        let mut tx = self.pool().begin().await?;

        let before = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with ID {} not found", id)))?;

        let mut after = before.clone();
        if let Some(title) = data.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(CoreError::InvalidInput(
                    "task title cannot be empty".to_string(),
                ));
            }
            after.title = title;
        }
        if let Some(description) = data.description {
            after.description = description;
        }
        if let Some(scheduled_at) = data.scheduled_at {
            after.scheduled_at = scheduled_at;
        }
        if let Some(due_at) = data.due_at {
            after.due_at = due_at;
        }
        if let Some(priority) = data.priority {
            after.priority = priority;
        }
        if let Some(category) = data.category {
            after.category = category;
        }
        after.updated_at = Utc::now();

        sqlx::query(
            "UPDATE tasks SET title = $1, description = $2, scheduled_at = $3, due_at = $4,
                 priority = $5, category = $6, updated_at = $7
             WHERE id = $8",
        )
        .bind(&after.title)
        .bind(&after.description)
        .bind(after.scheduled_at)
        .bind(after.due_at)
        .bind(after.priority)
        .bind(&after.category)
        .bind(after.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(remove) = &data.remove_participants {
            for user_id in remove {
                sqlx::query("DELETE FROM task_participants WHERE task_id = $1 AND user_id = $2")
                    .bind(id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        if let Some(add) = &data.add_participants {
            for user_id in add {
                sqlx::query(
                    "INSERT OR IGNORE INTO task_participants (task_id, user_id) VALUES ($1, $2)",
                )
                .bind(id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.events().emit(DomainEvent::TaskUpdated {
            actor,
            before,
            after: after.clone(),
        });

        Ok(after)
    }

    async fn complete_task(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<CompletionResult, CoreError> {
        let mut tx = self.pool().begin().await?;

        let mut task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with ID {} not found", id)))?;

        if task.completed {
            return Err(CoreError::InvalidInput(
                "task is already completed".to_string(),
            ));
        }

        task.completed = true;
        task.completed_at = Some(Utc::now());
        task.updated_at = Utc::now();

        sqlx::query("UPDATE tasks SET completed = 1, completed_at = $1, updated_at = $2 WHERE id = $3")
            .bind(task.completed_at)
            .bind(task.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.events().emit(DomainEvent::TaskCompleted {
            actor,
            task: task.clone(),
        });

        // Completing a generated instance pulls the next occurrence into
        // existence so there is always a visible "next" for the series.
        let Some(series_id) = task.series_id else {
            return Ok(CompletionResult::Single(task));
        };

        let series = self
            .find_series_by_id(series_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Series with ID {} not found", series_id)))?;

        let next_occurrence = if series.active {
            let skips: HashSet<NaiveDate> = self
                .list_skips(series_id)
                .await?
                .into_iter()
                .map(|s| s.date)
                .collect();
            let calculator =
                RecurrenceCalculator::new(series.rule.0.clone(), series.start_date, skips)?;
            let after = task.occurrence_date.unwrap_or_else(|| Utc::now().date_naive());
            calculator.next_occurrence_after(after, series.generated_count as u32)
        } else {
            None
        };

        let next = match next_occurrence {
            Some(date) => {
                let today = Utc::now().date_naive();
                self.generate_due(series_id, today, date.max(today)).await?;
                sqlx::query_as::<_, Task>(
                    "SELECT * FROM tasks WHERE series_id = $1 AND occurrence_date = $2",
                )
                .bind(series_id)
                .bind(date)
                .fetch_optional(self.pool())
                .await?
            }
            None => None,
        };

        Ok(CompletionResult::SeriesInstance {
            completed: task,
            next,
            series_id,
            next_occurrence,
        })
    }

    async fn bulk_complete_tasks(
        &self,
        ids: &[Uuid],
        actor: Option<Uuid>,
    ) -> Result<Vec<Uuid>, CoreError> {
        let now = Utc::now();
        let mut completed = Vec::with_capacity(ids.len());

        let mut tx = self.pool().begin().await?;
        for id in ids {
            let result = sqlx::query(
                "UPDATE tasks SET completed = 1, completed_at = $1, updated_at = $1
                 WHERE id = $2 AND completed = 0",
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                completed.push(*id);
            }
        }
        tx.commit().await?;

        if !completed.is_empty() {
            self.events().emit(DomainEvent::TaskBulkUpdated {
                actor,
                task_ids: completed.clone(),
            });
        }

        Ok(completed)
    }

    async fn delete_task(&self, id: Uuid, actor: Option<Uuid>) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task with ID {} not found", id)))?;

        let template_of: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM recurring_series WHERE template_task_id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((series_id,)) = template_of {
            return Err(CoreError::InvalidInput(format!(
                "task is the template of series {}; delete the series first",
                series_id
            )));
        }

        sqlx::query("DELETE FROM task_participants WHERE task_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM task_reminders WHERE task_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.events().emit(DomainEvent::TaskDeleted { actor, task });

        Ok(())
    }

    async fn task_participants(&self, task_id: Uuid) -> Result<Vec<Uuid>, CoreError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM task_participants WHERE task_id = $1")
                .bind(task_id)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn task_reminders(&self, task_id: Uuid) -> Result<Vec<i64>, CoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT minutes_before FROM task_reminders WHERE task_id = $1 ORDER BY minutes_before",
        )
        .bind(task_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(m,)| m).collect())
    }
}

/// Inserts a task row with its participant and reminder rows inside the
/// caller's transaction. Shared with the generation coordinator.
pub(super) async fn insert_task_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    task: &Task,
    participants: &[Uuid],
    reminders: &[i64],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tasks
             (id, title, description, scheduled_at, due_at, priority, completed, completed_at,
              user_id, group_id, category, series_id, occurrence_date, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.scheduled_at)
    .bind(task.due_at)
    .bind(task.priority)
    .bind(task.completed)
    .bind(task.completed_at)
    .bind(task.user_id)
    .bind(task.group_id)
    .bind(&task.category)
    .bind(task.series_id)
    .bind(task.occurrence_date)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(&mut **tx)
    .await?;

    for user_id in participants {
        sqlx::query("INSERT OR IGNORE INTO task_participants (task_id, user_id) VALUES ($1, $2)")
            .bind(task.id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;
    }
    for minutes in reminders {
        sqlx::query(
            "INSERT OR IGNORE INTO task_reminders (task_id, minutes_before) VALUES ($1, $2)",
        )
        .bind(task.id)
        .bind(minutes)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
