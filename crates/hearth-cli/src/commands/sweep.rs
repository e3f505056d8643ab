use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;

use hearth_core::repository::Repository;

use crate::cli::SweepCommand;
use crate::commands::parse_date;

pub async fn run_sweep<R: Repository>(repository: &R, command: SweepCommand) -> Result<()> {
    let as_of = match &command.as_of {
        Some(raw) => parse_date(raw)?,
        None => Utc::now().date_naive(),
    };

    let summary = repository.run_scheduler_sweep(as_of).await?;

    println!(
        "{} {} series processed, {} task(s) created ({} ms)",
        "Sweep complete:".green().bold(),
        summary.series_processed,
        summary.tasks_created,
        summary.duration_ms
    );

    for (series_id, message) in &summary.errors {
        eprintln!(
            "{} series {}: {}",
            "Warning:".yellow().bold(),
            series_id,
            message
        );
    }

    Ok(())
}
