use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::CoreError;
use crate::events::DomainEvent;
use crate::models::{
    GenerationOutcome, GenerationSummary, RecurringSeries, SkipDate, Task,
};
use crate::recurrence::RecurrenceCalculator;
use crate::repository::tasks::insert_task_tx;
use crate::repository::{
    is_unique_violation, GenerationRepository, SeriesRepository, SqliteRepository, TaskRepository,
};

#[async_trait]
impl GenerationRepository for SqliteRepository {
    async fn generate_due(
        &self,
        series_id: Uuid,
        as_of: NaiveDate,
        horizon: NaiveDate,
    ) -> Result<GenerationOutcome, CoreError> {
        if horizon < as_of {
            return Err(CoreError::InvalidInput(format!(
                "generation horizon {} precedes the reference date {}",
                horizon, as_of
            )));
        }

        // Always re-read the series inside the call: the boundary and count
        // may have moved since the caller last saw them.
        let series = self
            .find_series_by_id(series_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Series with ID {} not found", series_id)))?;

        let mut outcome = GenerationOutcome {
            last_generated_through: series.last_generated_through,
            ..Default::default()
        };
        if !series.active {
            return Ok(outcome);
        }

        let template = self
            .find_task_by_id(series.template_task_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "Template task {} for series {} not found",
                    series.template_task_id, series_id
                ))
            })?;
        let participants = self.task_participants(template.id).await?;
        let reminders = self.task_reminders(template.id).await?;

        let skips: HashSet<NaiveDate> = self
            .list_skips(series_id)
            .await?
            .into_iter()
            .map(|s| s.date)
            .collect();

        let calculator =
            RecurrenceCalculator::new(series.rule.0.clone(), series.start_date, skips)?;

        // Window opens just past the high-water mark, so every run picks up
        // exactly where the previous one committed.
        let window_start = match series.last_generated_through {
            Some(boundary) => match boundary.succ_opt() {
                Some(next) => next,
                None => return Ok(outcome),
            },
            None => series.start_date,
        };
        if horizon < window_start {
            return Ok(outcome);
        }

        let due: Vec<NaiveDate> = calculator
            .occurrences_between(window_start, horizon, series.generated_count as u32)
            .take(self.generation_config().max_batch_size)
            .collect();

        for occurrence_date in due {
            match self
                .create_occurrence(&series, &template, &participants, &reminders, occurrence_date)
                .await
            {
                Ok(task_id) => {
                    outcome.created_task_ids.push(task_id);
                    outcome.last_generated_through = Some(occurrence_date);
                    self.events().emit(DomainEvent::RecurringGenerated {
                        series_id,
                        task_id,
                        occurrence_date,
                    });
                }
                Err(CoreError::DuplicateOccurrence) => {
                    // A concurrent run won the race for this date. The task
                    // exists, so only the boundary moves; the winner already
                    // counted it.
                    self.advance_boundary(series_id, occurrence_date).await?;
                    outcome.duplicates_skipped += 1;
                    outcome.last_generated_through =
                        Some(outcome.last_generated_through.map_or(occurrence_date, |d| {
                            d.max(occurrence_date)
                        }));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }

    async fn run_scheduler_sweep(&self, as_of: NaiveDate) -> Result<GenerationSummary, CoreError> {
        let started = Instant::now();
        let horizon = as_of + Duration::days(self.generation_config().lookahead_days);

        let mut summary = GenerationSummary::default();
        for series in self.find_active_auto_series().await? {
            summary.series_processed += 1;
            match self.generate_due(series.id, as_of, horizon).await {
                Ok(outcome) => summary.tasks_created += outcome.created_task_ids.len(),
                Err(e) => summary.errors.push((series.id, e.to_string())),
            }
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;

        Ok(summary)
    }

    async fn skip_occurrence(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        reason: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<(), CoreError> {
        self.find_series_by_id(series_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Series with ID {} not found", series_id)))?;

        // Re-skipping an already-skipped date updates the reason. A task
        // already materialized for this date is left alone.
        sqlx::query(
            "INSERT INTO skip_dates (series_id, date, reason, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT(series_id, date) DO UPDATE SET reason = excluded.reason",
        )
        .bind(series_id)
        .bind(date)
        .bind(&reason)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        self.events().emit(DomainEvent::RecurringSkipped {
            actor,
            series_id,
            date,
            reason,
        });

        Ok(())
    }

    async fn remove_skip(&self, series_id: Uuid, date: NaiveDate) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM skip_dates WHERE series_id = $1 AND date = $2")
            .bind(series_id)
            .bind(date)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "No skip recorded for series {} on {}",
                series_id, date
            )));
        }
        Ok(())
    }

    async fn list_skips(&self, series_id: Uuid) -> Result<Vec<SkipDate>, CoreError> {
        let skips = sqlx::query_as::<_, SkipDate>(
            "SELECT * FROM skip_dates WHERE series_id = $1 ORDER BY date",
        )
        .bind(series_id)
        .fetch_all(self.pool())
        .await?;
        Ok(skips)
    }

    async fn preview_occurrences(
        &self,
        series_id: Uuid,
        from: NaiveDate,
        limit: usize,
    ) -> Result<Vec<NaiveDate>, CoreError> {
        let series = self
            .find_series_by_id(series_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Series with ID {} not found", series_id)))?;

        let skips: HashSet<NaiveDate> = self
            .list_skips(series_id)
            .await?
            .into_iter()
            .map(|s| s.date)
            .collect();

        let calculator =
            RecurrenceCalculator::new(series.rule.0.clone(), series.start_date, skips)?;
        Ok(calculator.upcoming(from, limit, series.generated_count as u32))
    }
}

impl SqliteRepository {
    /// Materializes one occurrence: the instance insert, the count increment
    /// and the boundary advance commit or roll back together.
    async fn create_occurrence(
        &self,
        series: &RecurringSeries,
        template: &Task,
        participants: &[Uuid],
        reminders: &[i64],
        occurrence_date: NaiveDate,
    ) -> Result<Uuid, CoreError> {
        let now = Utc::now();
        let (scheduled_at, due_at) = instance_times(template, occurrence_date);

        let instance = Task {
            id: Uuid::now_v7(),
            title: template.title.clone(),
            description: template.description.clone(),
            scheduled_at: Some(scheduled_at),
            due_at,
            priority: template.priority,
            completed: false,
            completed_at: None,
            user_id: template.user_id,
            group_id: template.group_id,
            category: template.category.clone(),
            series_id: Some(series.id),
            occurrence_date: Some(occurrence_date),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await?;

        match insert_task_tx(&mut tx, &instance, participants, reminders).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => return Err(CoreError::DuplicateOccurrence),
            Err(e) => return Err(e.into()),
        }

        sqlx::query(
            "UPDATE recurring_series
             SET generated_count = generated_count + 1,
                 last_generated_through = MAX(COALESCE(last_generated_through, $1), $1),
                 updated_at = $2
             WHERE id = $3",
        )
        .bind(occurrence_date)
        .bind(now)
        .bind(series.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(instance.id)
    }

    /// Moves the high-water mark forward without touching the count. Used
    /// when another invocation already materialized the occurrence.
    async fn advance_boundary(
        &self,
        series_id: Uuid,
        through: NaiveDate,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE recurring_series
             SET last_generated_through = MAX(COALESCE(last_generated_through, $1), $1),
                 updated_at = $2
             WHERE id = $3",
        )
        .bind(through)
        .bind(Utc::now())
        .bind(series_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

/// Instance timing is copied from the template: the occurrence date with the
/// template's time of day (midnight when unscheduled), and the due time offset
/// by the template's own scheduled-to-due span.
fn instance_times(
    template: &Task,
    occurrence_date: NaiveDate,
) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
    let scheduled_at = match template.scheduled_at {
        Some(dt) => occurrence_date.and_time(dt.time()).and_utc(),
        None => occurrence_date
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc(),
    };
    let due_at = match (template.scheduled_at, template.due_at) {
        (Some(s), Some(d)) => Some(scheduled_at + (d - s)),
        (None, Some(d)) => Some(occurrence_date.and_time(d.time()).and_utc()),
        _ => None,
    };
    (scheduled_at, due_at)
}
