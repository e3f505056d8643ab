use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use hearth_core::models::{
    Cadence, EndCondition, GenerationMode, MonthlyAnchor, RecurringSeries, RuleConfig, SkipDate,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ViewSeries {
    pub id: Uuid,
    pub template_title: String,
    pub rule: RuleConfig,
    pub generation: GenerationMode,
    pub active: bool,
    pub start_date: NaiveDate,
    pub generated_count: i64,
    pub last_generated_through: Option<NaiveDate>,
}

impl ViewSeries {
    pub fn from_series(series: &RecurringSeries, template_title: String) -> Self {
        Self {
            id: series.id,
            template_title,
            rule: series.rule.0.clone(),
            generation: series.generation,
            active: series.active,
            start_date: series.start_date,
            generated_count: series.generated_count,
            last_generated_through: series.last_generated_through,
        }
    }
}

pub fn display_series(series: &[ViewSeries]) {
    if series.is_empty() {
        println!("No recurring series found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Task", "Rule", "Mode", "Active", "Start", "Generated", "Through",
    ]);

    for item in series {
        let mut row = Row::new();
        row.add_cell(Cell::new(&item.id.to_string()[..8]));

        let mut title_cell = Cell::new(&item.template_title);
        if !item.active {
            title_cell = title_cell
                .add_attribute(Attribute::CrossedOut)
                .fg(Color::DarkGrey);
        }
        row.add_cell(title_cell);

        row.add_cell(Cell::new(describe_rule(&item.rule)));
        let mode = match item.generation {
            GenerationMode::AutoScheduler => "auto",
            GenerationMode::OnDemand => "on-demand",
        };
        row.add_cell(Cell::new(mode));
        row.add_cell(if item.active {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("paused").fg(Color::Yellow)
        });
        row.add_cell(Cell::new(item.start_date.to_string()));
        row.add_cell(Cell::new(item.generated_count.to_string()));
        row.add_cell(Cell::new(
            item.last_generated_through
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ));

        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_occurrences(dates: &[NaiveDate]) {
    if dates.is_empty() {
        println!("No upcoming occurrences (series may have ended).");
        return;
    }
    for (i, date) in dates.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, date, date.format("%A"));
    }
}

pub fn display_skips(skips: &[SkipDate]) {
    if skips.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec!["Skipped Date", "Reason"]);
    for skip in skips {
        table.add_row(vec![
            Cell::new(skip.date.to_string()),
            Cell::new(skip.reason.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
}

/// Human-readable one-line summary of a recurrence rule.
pub fn describe_rule(rule: &RuleConfig) -> String {
    let every = |unit: &str| {
        if rule.interval == 1 {
            format!("every {}", unit)
        } else {
            format!("every {} {}s", rule.interval, unit)
        }
    };

    let base = match &rule.cadence {
        Cadence::Daily => every("day"),
        Cadence::Weekly { .. } => {
            let days: Vec<String> = rule
                .normalized_days_of_week()
                .iter()
                .map(|d| format!("{:?}", d))
                .collect();
            format!("{} on {}", every("week"), days.join(", "))
        }
        Cadence::Monthly { anchor } => match anchor {
            MonthlyAnchor::DayOfMonth(day) => format!("{} on day {}", every("month"), day),
            MonthlyAnchor::WeekOfMonth { week, weekday } => {
                let nth = match week {
                    1 => "1st".to_string(),
                    2 => "2nd".to_string(),
                    3 => "3rd".to_string(),
                    4 => "4th".to_string(),
                    _ => "last".to_string(),
                };
                format!("{} on the {} {:?}", every("month"), nth, weekday)
            }
        },
        Cadence::Yearly {
            month,
            day_of_month,
        } => format!("{} on {:02}-{:02}", every("year"), month, day_of_month),
    };

    match rule.end {
        EndCondition::Never => base,
        EndCondition::OnDate(date) => format!("{}, until {}", base, date),
        EndCondition::AfterCount(count) => format!("{}, {} times", base, count),
    }
}
