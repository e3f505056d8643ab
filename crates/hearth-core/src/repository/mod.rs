use crate::db::DbPool;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::models::{
    CompletionResult, GenerationConfig, GenerationOutcome, GenerationSummary, Group, GroupMember,
    Membership, NewGroupData, NewMemberData, NewRoleData, NewTaskData, PermissionCode,
    RecurringSeries, Role, SkipDate, Task, UpdateRoleData, UpdateSeriesData, UpdateTaskData,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

// Re-export domain modules
pub mod generation;
pub mod groups;
pub mod members;
pub mod roles;
pub mod series;
pub mod tasks;

// Traits are defined in this module and implemented in respective domain modules

/// Domain-specific trait for group operations
#[async_trait]
pub trait GroupRepository {
    /// Creates the group plus its OWNER role, default role, and the owner's
    /// membership in one transaction.
    async fn create_group(&self, data: NewGroupData) -> Result<Group, CoreError>;
    async fn find_group_by_id(&self, id: Uuid) -> Result<Option<Group>, CoreError>;
    async fn list_groups(&self) -> Result<Vec<Group>, CoreError>;
    /// Cascades over the group's roles, memberships, tasks and series.
    async fn delete_group(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for role lifecycle operations
#[async_trait]
pub trait RoleRepository {
    async fn create_role(&self, data: NewRoleData) -> Result<Role, CoreError>;
    async fn find_role_by_id(&self, id: Uuid) -> Result<Option<Role>, CoreError>;
    /// `group_id = None` lists the shared/common roles.
    async fn list_roles(&self, group_id: Option<Uuid>) -> Result<Vec<Role>, CoreError>;
    async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<PermissionCode>, CoreError>;
    async fn update_role(&self, id: Uuid, data: UpdateRoleData) -> Result<Role, CoreError>;
    async fn delete_role(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for membership operations, including the permission
/// resolver the authorization gate runs on
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn add_member(&self, data: NewMemberData) -> Result<GroupMember, CoreError>;
    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), CoreError>;
    async fn change_member_role(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<GroupMember, CoreError>;
    /// Atomically moves the OWNER role to `new_owner_user_id`; the previous
    /// owner receives the group's default role.
    async fn transfer_ownership(
        &self,
        group_id: Uuid,
        new_owner_user_id: Uuid,
    ) -> Result<(), CoreError>;
    async fn list_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, CoreError>;
    /// The permission resolver: the member's role and its permission-code set
    /// verbatim. Fails with `NotAMember` when no row exists for the pair.
    async fn resolve_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Membership, CoreError>;
}

/// Domain-specific trait for task operations
#[async_trait]
pub trait TaskRepository {
    /// Plain task, or, when `data.rule` is set, the template of a new
    /// recurring series created in the same flow.
    async fn add_task(&self, data: NewTaskData, actor: Option<Uuid>) -> Result<Task, CoreError>;
    async fn find_task_by_id(&self, id: Uuid) -> Result<Option<Task>, CoreError>;
    async fn find_tasks_for_group(&self, group_id: Uuid) -> Result<Vec<Task>, CoreError>;
    async fn find_tasks_for_series(&self, series_id: Uuid) -> Result<Vec<Task>, CoreError>;
    async fn update_task(
        &self,
        id: Uuid,
        data: UpdateTaskData,
        actor: Option<Uuid>,
    ) -> Result<Task, CoreError>;
    async fn complete_task(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<CompletionResult, CoreError>;
    async fn bulk_complete_tasks(
        &self,
        ids: &[Uuid],
        actor: Option<Uuid>,
    ) -> Result<Vec<Uuid>, CoreError>;
    async fn delete_task(&self, id: Uuid, actor: Option<Uuid>) -> Result<(), CoreError>;
    async fn task_participants(&self, task_id: Uuid) -> Result<Vec<Uuid>, CoreError>;
    async fn task_reminders(&self, task_id: Uuid) -> Result<Vec<i64>, CoreError>;
}

/// Domain-specific trait for series operations
#[async_trait]
pub trait SeriesRepository {
    async fn find_series_by_id(&self, id: Uuid) -> Result<Option<RecurringSeries>, CoreError>;
    async fn find_series_by_template(
        &self,
        template_task_id: Uuid,
    ) -> Result<Option<RecurringSeries>, CoreError>;
    async fn list_series(&self) -> Result<Vec<RecurringSeries>, CoreError>;
    async fn find_active_auto_series(&self) -> Result<Vec<RecurringSeries>, CoreError>;
    async fn update_series(
        &self,
        id: Uuid,
        data: UpdateSeriesData,
    ) -> Result<RecurringSeries, CoreError>;
    /// Refused while materialized occurrences remain; deactivation is the
    /// retirement path.
    async fn delete_series(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Domain-specific trait for the task generation coordinator
#[async_trait]
pub trait GenerationRepository {
    /// Materializes due occurrences from the series' high-water mark up to
    /// `horizon`, at most one task per (series, occurrence date).
    async fn generate_due(
        &self,
        series_id: Uuid,
        as_of: NaiveDate,
        horizon: NaiveDate,
    ) -> Result<GenerationOutcome, CoreError>;
    /// Generates for every active auto-scheduled series up to the configured
    /// lookahead; one bad series does not abort the sweep.
    async fn run_scheduler_sweep(&self, as_of: NaiveDate) -> Result<GenerationSummary, CoreError>;
    /// Marks the slot intentionally absent for future generation; existing
    /// materialized task rows are untouched.
    async fn skip_occurrence(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        reason: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<(), CoreError>;
    async fn remove_skip(&self, series_id: Uuid, date: NaiveDate) -> Result<(), CoreError>;
    async fn list_skips(&self, series_id: Uuid) -> Result<Vec<SkipDate>, CoreError>;
    async fn preview_occurrences(
        &self,
        series_id: Uuid,
        from: NaiveDate,
        limit: usize,
    ) -> Result<Vec<NaiveDate>, CoreError>;
}

/// Main repository trait that composes all domain traits
#[async_trait]
pub trait Repository:
    GroupRepository
    + RoleRepository
    + MembershipRepository
    + TaskRepository
    + SeriesRepository
    + GenerationRepository
{
    // This trait automatically composes all domain-specific repositories
    // Individual domain operations are defined in their respective traits
}

/// SQLite implementation of the repository pattern
pub struct SqliteRepository {
    pool: DbPool,
    generation: GenerationConfig,
    events: EventBus,
}

impl SqliteRepository {
    pub fn new(pool: DbPool, generation: GenerationConfig, events: EventBus) -> Self {
        Self {
            pool,
            generation,
            events,
        }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get a reference to the generation configuration
    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Get a reference to the event bus for internal use
    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }
}

// The main Repository trait implementation will automatically be available
// when all domain trait implementations are defined
impl Repository for SqliteRepository {}

/// True when the error is the storage uniqueness constraint firing; the
/// generation coordinator treats it as "already generated", not a failure.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}
