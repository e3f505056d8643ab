use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::CoreError;

/// The one role name the engine treats specially: immutable, non-deletable,
/// held by exactly one member per group.
pub const OWNER_ROLE_NAME: &str = "OWNER";

/// Name of the default role seeded by group bootstrap and auto-granted on join.
pub const DEFAULT_MEMBER_ROLE_NAME: &str = "Member";

// ============================================================================
// Recurrence Rules
// ============================================================================

/// Declarative recurrence pattern: a cadence, a step interval, and exactly one
/// end condition. Pure data; generation bookkeeping lives on the series row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Steps between occurrences (days, weeks, months or years depending on
    /// the cadence). Must be positive.
    pub interval: u32,
    #[serde(default)]
    pub end: EndCondition,
    #[serde(flatten)]
    pub cadence: Cadence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCondition {
    #[default]
    Never,
    /// Inclusive: the last valid occurrence is the end date itself.
    OnDate(NaiveDate),
    /// The series produces at most this many occurrences, ever.
    AfterCount(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cadence", rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly {
        /// Non-empty; deduplicated and kept in Sunday-first order.
        days_of_week: Vec<Weekday>,
    },
    Monthly {
        anchor: MonthlyAnchor,
    },
    Yearly {
        month: u32,
        day_of_month: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyAnchor {
    /// 1-31, clamped to the month length at generation time.
    DayOfMonth(u32),
    /// Nth weekday of the month; week 5 means the last occurrence.
    WeekOfMonth { week: u32, weekday: Weekday },
}

impl RuleConfig {
    /// Checks the rule for malformed configuration. Called on every
    /// construction path, so an invalid rule never reaches the calculator.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval == 0 {
            return Err(CoreError::InvalidRule(
                "interval must be a positive integer".to_string(),
            ));
        }
        match &self.cadence {
            Cadence::Daily => {}
            Cadence::Weekly { days_of_week } => {
                if days_of_week.is_empty() {
                    return Err(CoreError::InvalidRule(
                        "weekly rules require at least one day of week".to_string(),
                    ));
                }
            }
            Cadence::Monthly { anchor } => match anchor {
                MonthlyAnchor::DayOfMonth(day) => {
                    if !(1..=31).contains(day) {
                        return Err(CoreError::InvalidRule(format!(
                            "day of month must be 1-31, got {}",
                            day
                        )));
                    }
                }
                MonthlyAnchor::WeekOfMonth { week, .. } => {
                    if !(1..=5).contains(week) {
                        return Err(CoreError::InvalidRule(format!(
                            "week of month must be 1-5, got {}",
                            week
                        )));
                    }
                }
            },
            Cadence::Yearly {
                month,
                day_of_month,
            } => {
                if !(1..=12).contains(month) {
                    return Err(CoreError::InvalidRule(format!(
                        "month must be 1-12, got {}",
                        month
                    )));
                }
                // Day 29 in February is valid and fires only in leap years;
                // days that exist in no year of that month are rejected.
                let max_day = match month {
                    2 => 29,
                    4 | 6 | 9 | 11 => 30,
                    _ => 31,
                };
                if !(1..=max_day).contains(day_of_month) {
                    return Err(CoreError::InvalidRule(format!(
                        "day {} is not valid for month {}",
                        day_of_month, month
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns the weekly day set deduplicated and in Sunday-first order.
    /// Empty for non-weekly cadences.
    pub fn normalized_days_of_week(&self) -> Vec<Weekday> {
        match &self.cadence {
            Cadence::Weekly { days_of_week } => {
                let mut days = days_of_week.clone();
                days.sort_by_key(|d| d.num_days_from_sunday());
                days.dedup();
                days
            }
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Permissions and Roles
// ============================================================================

/// Closed set of capability codes a role can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum PermissionCode {
    #[sqlx(rename = "group:read")]
    #[serde(rename = "group:read")]
    GroupRead,
    #[sqlx(rename = "group:update")]
    #[serde(rename = "group:update")]
    GroupUpdate,
    #[sqlx(rename = "group:delete")]
    #[serde(rename = "group:delete")]
    GroupDelete,
    #[sqlx(rename = "member:invite")]
    #[serde(rename = "member:invite")]
    MemberInvite,
    #[sqlx(rename = "member:remove")]
    #[serde(rename = "member:remove")]
    MemberRemove,
    #[sqlx(rename = "role:manage")]
    #[serde(rename = "role:manage")]
    RoleManage,
    #[sqlx(rename = "schedule:create")]
    #[serde(rename = "schedule:create")]
    ScheduleCreate,
    #[sqlx(rename = "schedule:read")]
    #[serde(rename = "schedule:read")]
    ScheduleRead,
    #[sqlx(rename = "schedule:update")]
    #[serde(rename = "schedule:update")]
    ScheduleUpdate,
    #[sqlx(rename = "schedule:delete")]
    #[serde(rename = "schedule:delete")]
    ScheduleDelete,
}

impl PermissionCode {
    /// Every code, in display order. The OWNER role is granted all of them.
    pub const ALL: [PermissionCode; 10] = [
        PermissionCode::GroupRead,
        PermissionCode::GroupUpdate,
        PermissionCode::GroupDelete,
        PermissionCode::MemberInvite,
        PermissionCode::MemberRemove,
        PermissionCode::RoleManage,
        PermissionCode::ScheduleCreate,
        PermissionCode::ScheduleRead,
        PermissionCode::ScheduleUpdate,
        PermissionCode::ScheduleDelete,
    ];

    /// The read-only subset granted to the default member role at bootstrap.
    pub const READ_ONLY: [PermissionCode; 2] =
        [PermissionCode::GroupRead, PermissionCode::ScheduleRead];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionCode::GroupRead => "group:read",
            PermissionCode::GroupUpdate => "group:update",
            PermissionCode::GroupDelete => "group:delete",
            PermissionCode::MemberInvite => "member:invite",
            PermissionCode::MemberRemove => "member:remove",
            PermissionCode::RoleManage => "role:manage",
            PermissionCode::ScheduleCreate => "schedule:create",
            PermissionCode::ScheduleRead => "schedule:read",
            PermissionCode::ScheduleUpdate => "schedule:update",
            PermissionCode::ScheduleDelete => "schedule:delete",
        }
    }
}

impl std::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid permission code: {0}")]
pub struct ParsePermissionCodeError(String);

impl FromStr for PermissionCode {
    type Err = ParsePermissionCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionCode::ALL
            .iter()
            .find(|code| code.as_str() == s)
            .copied()
            .ok_or_else(|| ParsePermissionCodeError(s.to_string()))
    }
}

/// A named permission bundle, optionally scoped to one group
/// (`group_id = None` means a shared/common role).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub group_id: Option<Uuid>,
    pub name: String,
    pub color: Option<String>,
    pub sort_order: i64,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_owner(&self) -> bool {
        self.name == OWNER_ROLE_NAME
    }
}

/// Join entity between a user and a group. Every member carries exactly one
/// role reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

/// A resolved membership: the member row, their role, and the role's
/// permission-code set verbatim (no inheritance, no union across roles).
#[derive(Debug, Clone)]
pub struct Membership {
    pub member: GroupMember,
    pub role: Role,
    pub permissions: Vec<PermissionCode>,
}

impl Membership {
    pub fn has_permission(&self, code: PermissionCode) -> bool {
        self.permissions.contains(&code)
    }

    pub fn is_owner(&self) -> bool {
        self.role.is_owner()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    None,
    Low,
    Medium,
    High,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid task priority: {0}")]
pub struct ParseTaskPriorityError(String);

impl FromStr for TaskPriority {
    type Err = ParseTaskPriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TaskPriority::None),
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(ParseTaskPriorityError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// Owning user, for personal tasks.
    pub user_id: Option<Uuid>,
    /// Owning group, for group-scoped tasks visible to members with
    /// sufficient permission.
    pub group_id: Option<Uuid>,
    pub category: Option<String>,
    /// Set only on generated instances; templates and plain tasks carry None.
    pub series_id: Option<Uuid>,
    /// The calculator-produced date this instance materializes. Paired with
    /// `series_id` under a uniqueness constraint.
    pub occurrence_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            title: "".to_string(),
            description: None,
            scheduled_at: None,
            due_at: None,
            priority: TaskPriority::None,
            completed: false,
            completed_at: None,
            user_id: None,
            group_id: None,
            category: None,
            series_id: None,
            occurrence_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Recurring Series
// ============================================================================

/// Who drives generation for a series: the periodic scheduler trigger, or
/// explicit on-demand requests only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    AutoScheduler,
    OnDemand,
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid generation mode: {0}")]
pub struct ParseGenerationModeError(String);

impl FromStr for GenerationMode {
    type Err = ParseGenerationModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto_scheduler" | "auto" => Ok(GenerationMode::AutoScheduler),
            "on_demand" | "manual" => Ok(GenerationMode::OnDemand),
            _ => Err(ParseGenerationModeError(s.to_string())),
        }
    }
}

/// A recurring rule plus its generation bookkeeping, distinct from any single
/// materialized task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecurringSeries {
    pub id: Uuid,
    /// The originating task template; instances are copies of it.
    pub template_task_id: Uuid,
    pub rule: sqlx::types::Json<RuleConfig>,
    pub generation: GenerationMode,
    pub start_date: NaiveDate,
    /// Paused series are skipped by the scheduler sweep.
    pub active: bool,
    /// Instances created so far. Never exceeds the rule's count when the end
    /// condition is AfterCount. Owned exclusively by the coordinator.
    pub generated_count: i64,
    /// Generation high-water mark: the latest occurrence date committed.
    pub last_generated_through: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An explicit exception date excluded from generation without altering the
/// underlying rule.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SkipDate {
    pub series_id: Uuid,
    pub date: NaiveDate,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Data Transfer Objects
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NewTaskData {
    pub title: String,
    pub description: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub category: Option<String>,
    pub participants: Vec<Uuid>,
    /// Reminder offsets in minutes before the scheduled time.
    pub reminders: Vec<i64>,
    /// When present, the task becomes the template of a new recurring series.
    pub rule: Option<RuleConfig>,
    /// Generation driver for the new series; defaults to AutoScheduler.
    pub generation: Option<GenerationMode>,
    /// First eligible occurrence date; defaults to the scheduled date or today.
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskData {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub priority: Option<TaskPriority>,
    pub category: Option<Option<String>>,
    pub add_participants: Option<Vec<Uuid>>,
    pub remove_participants: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSeriesData {
    /// Replaces the rule; affects future occurrences only, the high-water
    /// mark is never rewound.
    pub rule: Option<RuleConfig>,
    pub generation: Option<GenerationMode>,
    /// Pause/resume.
    pub active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewGroupData {
    pub name: String,
    pub owner_user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewRoleData {
    pub group_id: Option<Uuid>,
    pub name: String,
    pub color: Option<String>,
    pub sort_order: i64,
    pub is_default: bool,
    pub permissions: Vec<PermissionCode>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRoleData {
    pub name: Option<String>,
    pub color: Option<Option<String>>,
    pub sort_order: Option<i64>,
    pub is_default: Option<bool>,
    pub permissions: Option<Vec<PermissionCode>>,
}

#[derive(Debug, Clone)]
pub struct NewMemberData {
    pub group_id: Uuid,
    pub user_id: Uuid,
    /// When None, the group's default role is auto-granted.
    pub role_id: Option<Uuid>,
}

// ============================================================================
// Generation Results and Configuration
// ============================================================================

#[derive(Debug)]
pub enum CompletionResult {
    Single(Task),
    SeriesInstance {
        completed: Task,
        /// The next occurrence's task, when it fell inside the lookahead
        /// window and was materialized.
        next: Option<Task>,
        series_id: Uuid,
        next_occurrence: Option<NaiveDate>,
    },
}

/// Outcome of one `generate_due` run for a single series.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub created_task_ids: Vec<Uuid>,
    /// Occurrences a concurrent invocation had already materialized.
    pub duplicates_skipped: usize,
    pub last_generated_through: Option<NaiveDate>,
}

/// Aggregate of one scheduler sweep across all active auto-scheduled series.
#[derive(Debug, Clone, Default)]
pub struct GenerationSummary {
    pub series_processed: usize,
    pub tasks_created: usize,
    /// Per-series failures; one bad series does not abort the sweep.
    pub errors: Vec<(Uuid, String)>,
    pub duration_ms: u64,
}

/// Configuration for generation behavior - core version.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// How far ahead of "now" the scheduler sweep materializes, in days.
    pub lookahead_days: i64,
    /// Cap on occurrences created per series per run.
    pub max_batch_size: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            lookahead_days: 30,
            max_batch_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly(days: Vec<Weekday>) -> RuleConfig {
        RuleConfig {
            interval: 1,
            end: EndCondition::Never,
            cadence: Cadence::Weekly { days_of_week: days },
        }
    }

    mod rule_validation_tests {
        use super::*;

        #[test]
        fn test_zero_interval_rejected() {
            let rule = RuleConfig {
                interval: 0,
                end: EndCondition::Never,
                cadence: Cadence::Daily,
            };
            assert!(matches!(rule.validate(), Err(CoreError::InvalidRule(_))));
        }

        #[test]
        fn test_empty_weekly_day_set_rejected() {
            assert!(matches!(
                weekly(vec![]).validate(),
                Err(CoreError::InvalidRule(_))
            ));
        }

        #[test]
        fn test_monthly_day_bounds() {
            let ok = RuleConfig {
                interval: 1,
                end: EndCondition::Never,
                cadence: Cadence::Monthly {
                    anchor: MonthlyAnchor::DayOfMonth(31),
                },
            };
            assert!(ok.validate().is_ok());

            let bad = RuleConfig {
                interval: 1,
                end: EndCondition::Never,
                cadence: Cadence::Monthly {
                    anchor: MonthlyAnchor::DayOfMonth(32),
                },
            };
            assert!(bad.validate().is_err());
        }

        #[test]
        fn test_yearly_feb_29_accepted_feb_30_rejected() {
            let feb_29 = RuleConfig {
                interval: 1,
                end: EndCondition::Never,
                cadence: Cadence::Yearly {
                    month: 2,
                    day_of_month: 29,
                },
            };
            assert!(feb_29.validate().is_ok());

            let feb_30 = RuleConfig {
                interval: 1,
                end: EndCondition::Never,
                cadence: Cadence::Yearly {
                    month: 2,
                    day_of_month: 30,
                },
            };
            assert!(matches!(
                feb_30.validate(),
                Err(CoreError::InvalidRule(_))
            ));
        }

        #[test]
        fn test_week_of_month_bounds() {
            let bad = RuleConfig {
                interval: 1,
                end: EndCondition::Never,
                cadence: Cadence::Monthly {
                    anchor: MonthlyAnchor::WeekOfMonth {
                        week: 6,
                        weekday: Weekday::Mon,
                    },
                },
            };
            assert!(bad.validate().is_err());
        }

        #[test]
        fn test_normalized_days_sorted_sunday_first_and_deduped() {
            let rule = weekly(vec![
                Weekday::Fri,
                Weekday::Sun,
                Weekday::Mon,
                Weekday::Fri,
            ]);
            assert_eq!(
                rule.normalized_days_of_week(),
                vec![Weekday::Sun, Weekday::Mon, Weekday::Fri]
            );
        }
    }

    mod rule_serde_tests {
        use super::*;

        #[test]
        fn test_rule_round_trips_through_json() {
            let rule = RuleConfig {
                interval: 2,
                end: EndCondition::AfterCount(3),
                cadence: Cadence::Weekly {
                    days_of_week: vec![Weekday::Mon],
                },
            };
            let json = serde_json::to_string(&rule).unwrap();
            let back: RuleConfig = serde_json::from_str(&json).unwrap();
            assert_eq!(back, rule);
        }

        #[test]
        fn test_cadence_tag_is_explicit() {
            let rule = RuleConfig {
                interval: 1,
                end: EndCondition::Never,
                cadence: Cadence::Daily,
            };
            let json = serde_json::to_string(&rule).unwrap();
            assert!(json.contains("\"cadence\":\"daily\""));
        }

        #[test]
        fn test_entity_ids_serialize_as_hyphenated_strings() {
            let now = Utc::now();
            let group = Group {
                id: Uuid::now_v7(),
                name: "Serde".to_string(),
                created_at: now,
                updated_at: now,
            };
            let role = Role {
                id: Uuid::now_v7(),
                group_id: Some(group.id),
                name: "Member".to_string(),
                color: None,
                sort_order: 1,
                is_default: true,
                created_at: now,
                updated_at: now,
            };

            // Every entity id goes over the wire in the same shape.
            let group_json: serde_json::Value = serde_json::to_value(&group).unwrap();
            let role_json: serde_json::Value = serde_json::to_value(&role).unwrap();
            assert_eq!(group_json["id"], group.id.to_string());
            assert_eq!(role_json["id"], role.id.to_string());
            assert_eq!(role_json["group_id"], group.id.to_string());
        }
    }

    mod permission_code_tests {
        use super::*;

        #[test]
        fn test_wire_codes_round_trip() {
            for code in PermissionCode::ALL {
                assert_eq!(code.as_str().parse::<PermissionCode>().unwrap(), code);
            }
        }

        #[test]
        fn test_unknown_code_rejected() {
            assert!("group:write".parse::<PermissionCode>().is_err());
        }
    }
}
