use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use owo_colors::OwoColorize;

use hearth_core::models::{RecurringSeries, UpdateSeriesData};
use hearth_core::repository::Repository;

use crate::cli::{
    PauseCommand, PreviewCommand, ResumeCommand, SeriesCommand, SeriesGenerateCommand,
    SeriesShowCommand, SeriesSubcommand, SkipCommand, UnskipCommand,
};
use crate::commands::{parse_date, parse_series_id};
use crate::config::Config;
use crate::views::table::{describe_rule, display_occurrences, display_series, display_skips, ViewSeries};

pub async fn series_command<R: Repository>(
    repository: &R,
    command: SeriesCommand,
    config: &Config,
) -> Result<()> {
    match command.command {
        SeriesSubcommand::List => list_command(repository).await,
        SeriesSubcommand::Show(cmd) => show_command(repository, cmd).await,
        SeriesSubcommand::Generate(cmd) => generate_command(repository, cmd, config).await,
    }
}

async fn find_series<R: Repository>(repository: &R, raw_id: &str) -> Result<RecurringSeries> {
    let id = parse_series_id(raw_id)?;
    repository
        .find_series_by_id(id)
        .await?
        .ok_or_else(|| anyhow!("No recurring series found with ID '{}'", id))
}

async fn list_command<R: Repository>(repository: &R) -> Result<()> {
    let series = repository.list_series().await?;

    let mut views = Vec::with_capacity(series.len());
    for item in &series {
        let title = repository
            .find_task_by_id(item.template_task_id)
            .await?
            .map(|t| t.title)
            .unwrap_or_else(|| "(missing template)".to_string());
        views.push(ViewSeries::from_series(item, title));
    }

    display_series(&views);
    Ok(())
}

async fn show_command<R: Repository>(repository: &R, command: SeriesShowCommand) -> Result<()> {
    let series = find_series(repository, &command.id).await?;
    let template = repository
        .find_task_by_id(series.template_task_id)
        .await?
        .ok_or_else(|| anyhow!("Template task not found"))?;

    println!("{}", "Series Information".blue().bold());
    println!("Series ID: {}", series.id.yellow());
    println!(
        "Template: {} ({})",
        template.title.cyan(),
        template.id.yellow()
    );
    println!("Rule: {}", describe_rule(&series.rule.0).green());
    println!("Start date: {}", series.start_date);
    println!(
        "Active: {}",
        if series.active {
            "Yes".green().to_string()
        } else {
            "No (paused)".red().to_string()
        }
    );
    println!("Generated so far: {}", series.generated_count);
    if let Some(boundary) = series.last_generated_through {
        println!("Generated through: {}", boundary);
    }
    println!();

    let skips = repository.list_skips(series.id).await?;
    if !skips.is_empty() {
        println!("{} ({})", "Skipped Dates".yellow().bold(), skips.len());
        display_skips(&skips);
        println!();
    }

    println!("{}", "Next 5 Occurrences".blue().bold());
    let upcoming = repository
        .preview_occurrences(series.id, Utc::now().date_naive(), 5)
        .await?;
    display_occurrences(&upcoming);

    Ok(())
}

async fn generate_command<R: Repository>(
    repository: &R,
    command: SeriesGenerateCommand,
    config: &Config,
) -> Result<()> {
    let series = find_series(repository, &command.id).await?;
    let today = Utc::now().date_naive();
    let through = match &command.through {
        Some(raw) => parse_date(raw)?,
        None => today + Duration::days(config.generation.lookahead_days),
    };

    let outcome = repository.generate_due(series.id, today, through).await?;

    println!(
        "{} {} task(s) created through {}",
        "Generated:".green().bold(),
        outcome.created_task_ids.len(),
        outcome
            .last_generated_through
            .map(|d| d.to_string())
            .unwrap_or_else(|| through.to_string())
    );
    if outcome.duplicates_skipped > 0 {
        println!(
            "{} occurrence(s) already existed and were skipped",
            outcome.duplicates_skipped
        );
    }

    Ok(())
}

pub async fn preview_command<R: Repository>(
    repository: &R,
    command: PreviewCommand,
) -> Result<()> {
    let series = find_series(repository, &command.id).await?;
    let from = match &command.from {
        Some(raw) => parse_date(raw)?,
        None => Utc::now().date_naive(),
    };

    println!(
        "{} {}",
        "Upcoming occurrences:".blue().bold(),
        describe_rule(&series.rule.0)
    );
    let upcoming = repository
        .preview_occurrences(series.id, from, command.count)
        .await?;
    display_occurrences(&upcoming);

    Ok(())
}

pub async fn skip_command<R: Repository>(repository: &R, command: SkipCommand) -> Result<()> {
    let series = find_series(repository, &command.id).await?;
    let date = parse_date(&command.date)?;

    repository
        .skip_occurrence(series.id, date, command.reason.clone(), None)
        .await?;

    println!(
        "{} {} will be skipped for series {}",
        "Skipped:".green().bold(),
        date,
        series.id
    );
    Ok(())
}

pub async fn unskip_command<R: Repository>(repository: &R, command: UnskipCommand) -> Result<()> {
    let series = find_series(repository, &command.id).await?;
    let date = parse_date(&command.date)?;

    repository.remove_skip(series.id, date).await?;

    println!(
        "{} {} restored for series {}",
        "Unskipped:".green().bold(),
        date,
        series.id
    );
    Ok(())
}

pub async fn pause_command<R: Repository>(repository: &R, command: PauseCommand) -> Result<()> {
    let series = find_series(repository, &command.id).await?;
    repository
        .update_series(
            series.id,
            UpdateSeriesData {
                active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    println!("{} series {}", "Paused:".yellow().bold(), series.id);
    Ok(())
}

pub async fn resume_command<R: Repository>(repository: &R, command: ResumeCommand) -> Result<()> {
    let series = find_series(repository, &command.id).await?;
    repository
        .update_series(
            series.id,
            UpdateSeriesData {
                active: Some(true),
                ..Default::default()
            },
        )
        .await?;
    println!("{} series {}", "Resumed:".green().bold(), series.id);
    Ok(())
}
