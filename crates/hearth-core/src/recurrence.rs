use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashSet;

use crate::error::CoreError;
use crate::models::{Cadence, EndCondition, MonthlyAnchor, RuleConfig};

/// How far past `after`/`from` the helper methods look before concluding a
/// series has ended. Ten years covers every supported cadence and interval
/// worth previewing.
const LOOKAHEAD_HORIZON_DAYS: i64 = 3650;

/// RecurrenceCalculator: deterministically expands a validated rule into
/// occurrence dates.
///
/// Responsibilities:
/// 1. Validate the rule at construction, so malformed configs never generate
/// 2. Produce lazy, strictly-ascending, duplicate-free occurrence sequences
///    bounded by a window and by the rule's own end condition
/// 3. Subtract explicit skip dates (exact match, consuming no COUNT budget)
/// 4. Stay pure: identical inputs yield identical output, and generation
///    bookkeeping is supplied by the caller, never mutated here
#[derive(Debug, Clone)]
pub struct RecurrenceCalculator {
    rule: RuleConfig,
    series_start: NaiveDate,
    skip_dates: HashSet<NaiveDate>,
}

impl RecurrenceCalculator {
    /// Creates a calculator for one series.
    ///
    /// # Arguments
    /// * `rule` - The recurrence rule; rejected here if malformed
    /// * `series_start` - First eligible date, anchoring interval arithmetic
    /// * `skip_dates` - Exception dates excluded from every sequence
    pub fn new(
        rule: RuleConfig,
        series_start: NaiveDate,
        skip_dates: HashSet<NaiveDate>,
    ) -> Result<Self, CoreError> {
        rule.validate()?;
        Ok(Self {
            rule,
            series_start,
            skip_dates,
        })
    }

    pub fn rule(&self) -> &RuleConfig {
        &self.rule
    }

    pub fn series_start(&self) -> NaiveDate {
        self.series_start
    }

    /// Returns the lazy sequence of occurrence dates inside
    /// `[window_start, window_end]`, both inclusive.
    ///
    /// `already_generated` is the series' occurrence count before this window;
    /// with an `AfterCount` end condition the sequence stops once
    /// `already_generated + emitted` would exceed the configured count.
    pub fn occurrences_between(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
        already_generated: u32,
    ) -> Occurrences<'_> {
        let lower = window_start.max(self.series_start);
        let upper = match self.rule.end {
            // The end date itself is still a valid occurrence.
            EndCondition::OnDate(end_date) => window_end.min(end_date),
            _ => window_end,
        };
        let remaining = match self.rule.end {
            EndCondition::AfterCount(count) => Some(count.saturating_sub(already_generated)),
            _ => None,
        };
        let cursor = Cursor::starting_at(&self.rule, self.series_start, lower);
        Occurrences {
            calc: self,
            cursor,
            lower,
            upper,
            remaining,
            done: upper < lower,
        }
    }

    /// Finds the next occurrence strictly after the given date, or `None` if
    /// the series has ended (by date, by count, or beyond the lookahead
    /// horizon).
    pub fn next_occurrence_after(
        &self,
        after: NaiveDate,
        already_generated: u32,
    ) -> Option<NaiveDate> {
        let from = after.succ_opt()?;
        let horizon = after + Duration::days(LOOKAHEAD_HORIZON_DAYS);
        self.occurrences_between(from, horizon, already_generated)
            .next()
    }

    /// Previews up to `limit` upcoming occurrences starting at `from`.
    pub fn upcoming(
        &self,
        from: NaiveDate,
        limit: usize,
        already_generated: u32,
    ) -> Vec<NaiveDate> {
        let horizon = from + Duration::days(LOOKAHEAD_HORIZON_DAYS);
        self.occurrences_between(from, horizon, already_generated)
            .take(limit)
            .collect()
    }
}

/// Lazy occurrence sequence. Strictly ascending, duplicates impossible by
/// construction, finite once the window or end condition is reached.
pub struct Occurrences<'a> {
    calc: &'a RecurrenceCalculator,
    cursor: Cursor,
    lower: NaiveDate,
    upper: NaiveDate,
    remaining: Option<u32>,
    done: bool,
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.done {
            return None;
        }
        if self.remaining == Some(0) {
            self.done = true;
            return None;
        }
        loop {
            let candidate = match self.cursor.advance(self.upper) {
                Some(date) => date,
                None => {
                    self.done = true;
                    return None;
                }
            };
            if candidate > self.upper {
                self.done = true;
                return None;
            }
            if candidate < self.lower {
                continue;
            }
            // Skips are subtracted before the count cap, so a skipped slot
            // consumes no budget.
            if self.calc.skip_dates.contains(&candidate) {
                continue;
            }
            if let Some(remaining) = &mut self.remaining {
                *remaining -= 1;
            }
            return Some(candidate);
        }
    }
}

/// Per-cadence raw-candidate cursor. Yields every date matching the pattern
/// in ascending order; window and skip filtering happen in `Occurrences`.
#[derive(Debug)]
enum Cursor {
    Daily {
        next: NaiveDate,
        step_days: i64,
    },
    Weekly {
        /// Sunday of the currently eligible week.
        week_start: NaiveDate,
        /// Days-from-Sunday offsets, ascending and deduplicated.
        offsets: Vec<i64>,
        pos: usize,
        step_days: i64,
    },
    Monthly {
        /// year * 12 + month0 of the next eligible month.
        month_index: i32,
        step_months: i32,
        anchor: MonthlyAnchor,
    },
    Yearly {
        year: i32,
        step_years: i32,
        month: u32,
        day_of_month: u32,
    },
}

impl Cursor {
    /// Positions a fresh cursor at the first raw candidate at or after
    /// `lower` would plausibly appear, without scanning from the series
    /// start. Candidates before `lower` may still come out and are filtered
    /// by the iterator; candidates are never lost.
    fn starting_at(rule: &RuleConfig, series_start: NaiveDate, lower: NaiveDate) -> Self {
        match &rule.cadence {
            Cadence::Daily => {
                let step = rule.interval as i64;
                let elapsed = (lower - series_start).num_days();
                let k = if elapsed > 0 {
                    (elapsed + step - 1) / step
                } else {
                    0
                };
                Cursor::Daily {
                    next: series_start + Duration::days(k * step),
                    step_days: step,
                }
            }
            Cadence::Weekly { .. } => {
                let offsets: Vec<i64> = rule
                    .normalized_days_of_week()
                    .iter()
                    .map(|d| d.num_days_from_sunday() as i64)
                    .collect();
                // Week 0 is the Sunday-first week containing the series'
                // first date whose weekday is in the day set.
                let first_match = first_weekly_match(series_start, &offsets);
                let anchor = week_start(first_match);
                let step = rule.interval as i64 * 7;
                let elapsed_weeks = (week_start(lower) - anchor).num_days() / 7;
                let n = if elapsed_weeks > 0 {
                    elapsed_weeks / (rule.interval as i64)
                } else {
                    0
                };
                Cursor::Weekly {
                    week_start: anchor + Duration::days(n * step),
                    offsets,
                    pos: 0,
                    step_days: step,
                }
            }
            Cadence::Monthly { anchor } => {
                let step = rule.interval as i32;
                let start_index = month_index(series_start.year(), series_start.month());
                let lower_index = month_index(lower.year(), lower.month());
                let elapsed = lower_index - start_index;
                let j = if elapsed > 0 { elapsed / step } else { 0 };
                Cursor::Monthly {
                    month_index: start_index + j * step,
                    step_months: step,
                    anchor: *anchor,
                }
            }
            Cadence::Yearly {
                month,
                day_of_month,
            } => {
                let step = rule.interval as i32;
                let elapsed = lower.year() - series_start.year();
                let j = if elapsed > 0 { elapsed / step } else { 0 };
                Cursor::Yearly {
                    year: series_start.year() + j * step,
                    step_years: step,
                    month: *month,
                    day_of_month: *day_of_month,
                }
            }
        }
    }

    /// Produces the next raw candidate, or `None` once candidates can no
    /// longer fall at or before `upper`.
    fn advance(&mut self, upper: NaiveDate) -> Option<NaiveDate> {
        match self {
            Cursor::Daily { next, step_days } => {
                let candidate = *next;
                *next += Duration::days(*step_days);
                Some(candidate)
            }
            Cursor::Weekly {
                week_start,
                offsets,
                pos,
                step_days,
            } => {
                let candidate = *week_start + Duration::days(offsets[*pos]);
                *pos += 1;
                if *pos == offsets.len() {
                    *pos = 0;
                    *week_start += Duration::days(*step_days);
                }
                Some(candidate)
            }
            Cursor::Monthly {
                month_index,
                step_months,
                anchor,
            } => {
                let (year, month) = month_index_parts(*month_index);
                if year > upper.year() {
                    return None;
                }
                *month_index += *step_months;
                let candidate = match anchor {
                    // Clamped, so day 31 in February lands on Feb 28/29.
                    MonthlyAnchor::DayOfMonth(day) => {
                        let day = (*day).min(days_in_month(year, month));
                        NaiveDate::from_ymd_opt(year, month, day).unwrap()
                    }
                    MonthlyAnchor::WeekOfMonth { week, weekday } => {
                        nth_weekday_of_month(year, month, *week, *weekday)
                    }
                };
                Some(candidate)
            }
            Cursor::Yearly {
                year,
                step_years,
                month,
                day_of_month,
            } => {
                // Never clamped: a Feb 29 rule fires only in leap years.
                loop {
                    if *year > upper.year() {
                        return None;
                    }
                    let candidate = NaiveDate::from_ymd_opt(*year, *month, *day_of_month);
                    *year += *step_years;
                    if let Some(date) = candidate {
                        return Some(date);
                    }
                }
            }
        }
    }
}

/// Sunday of the week containing `date` (weeks run Sunday-Saturday).
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// First date at or after `start` whose days-from-Sunday offset is listed.
/// The offset set is non-empty, so a match exists within seven days.
fn first_weekly_match(start: NaiveDate, offsets: &[i64]) -> NaiveDate {
    let mut date = start;
    loop {
        if offsets.contains(&(date.weekday().num_days_from_sunday() as i64)) {
            return date;
        }
        date += Duration::days(1);
    }
}

fn month_index(year: i32, month: u32) -> i32 {
    year * 12 + month as i32 - 1
}

fn month_index_parts(index: i32) -> (i32, u32) {
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
    };
    (next_month - first).num_days() as u32
}

/// Nth `weekday` of the month; week 5, or a week past the month's end, means
/// the last such weekday in the month.
fn nth_weekday_of_month(year: i32, month: u32, week: u32, weekday: Weekday) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let offset = (weekday.num_days_from_sunday() + 7 - first.weekday().num_days_from_sunday()) % 7;
    let first_occurrence = first + Duration::days(offset as i64);
    let candidate = first_occurrence + Duration::days(7 * (week as i64 - 1));
    if candidate.month() == month {
        candidate
    } else {
        let mut last = first_occurrence;
        while (last + Duration::days(7)).month() == month {
            last += Duration::days(7);
        }
        last
    }
}
