use chrono::{Duration, NaiveDate, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use hearth_core::authz::{AuthorizationGate, GroupIdSources};
use hearth_core::db::establish_connection;
use hearth_core::error::{AccessError, CoreError};
use hearth_core::events::EventBus;
use hearth_core::models::*;
use hearth_core::repository::{
    GenerationRepository, GroupRepository, MembershipRepository, RoleRepository,
    SeriesRepository, SqliteRepository, TaskRepository,
};

/// Helper function to create a test database
async fn setup_test_db() -> (SqliteRepository, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("Failed to establish test database connection");

    let repository = SqliteRepository::new(
        pool,
        GenerationConfig::default(),
        EventBus::disconnected(),
    );

    (repository, temp_dir)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn daily_rule(end: EndCondition) -> RuleConfig {
    RuleConfig {
        interval: 1,
        end,
        cadence: Cadence::Daily,
    }
}

/// Helper to create a group with an owner and return both
async fn create_test_group(repo: &SqliteRepository, name: &str) -> (Group, Uuid) {
    let owner = Uuid::now_v7();
    let group = repo
        .create_group(NewGroupData {
            name: name.to_string(),
            owner_user_id: owner,
        })
        .await
        .expect("Failed to create test group");
    (group, owner)
}

/// Helper to create an on-demand recurring series and return its record
async fn create_test_series(
    repo: &SqliteRepository,
    rule: RuleConfig,
    start_date: NaiveDate,
) -> RecurringSeries {
    let template = repo
        .add_task(
            NewTaskData {
                title: "Water the plants".to_string(),
                rule: Some(rule),
                generation: Some(GenerationMode::OnDemand),
                start_date: Some(start_date),
                ..Default::default()
            },
            None,
        )
        .await
        .expect("Failed to create series template");

    repo.find_series_by_template(template.id)
        .await
        .expect("Failed to look up series")
        .expect("Series should exist for template")
}

// ============================================================================
// Group bootstrap and membership
// ============================================================================

#[tokio::test]
async fn test_group_bootstrap_seeds_roles_and_owner_membership() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, owner) = create_test_group(&repo, "The Harrisons").await;

    let roles = repo.list_roles(Some(group.id)).await.unwrap();
    assert_eq!(roles.len(), 2);

    let owner_role = roles.iter().find(|r| r.name == OWNER_ROLE_NAME).unwrap();
    let member_role = roles
        .iter()
        .find(|r| r.name == DEFAULT_MEMBER_ROLE_NAME)
        .unwrap();
    assert!(!owner_role.is_default);
    assert!(member_role.is_default);

    let owner_perms = repo.role_permissions(owner_role.id).await.unwrap();
    assert_eq!(owner_perms.len(), PermissionCode::ALL.len());

    let member_perms = repo.role_permissions(member_role.id).await.unwrap();
    assert_eq!(
        member_perms,
        vec![PermissionCode::GroupRead, PermissionCode::ScheduleRead]
    );

    let membership = repo.resolve_membership(group.id, owner).await.unwrap();
    assert!(membership.is_owner());
    assert!(membership.has_permission(PermissionCode::GroupDelete));
}

#[tokio::test]
async fn test_add_member_gets_default_role_when_none_given() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Defaults").await;

    let user = Uuid::now_v7();
    repo.add_member(NewMemberData {
        group_id: group.id,
        user_id: user,
        role_id: None,
    })
    .await
    .unwrap();

    let membership = repo.resolve_membership(group.id, user).await.unwrap();
    assert_eq!(membership.role.name, DEFAULT_MEMBER_ROLE_NAME);
    assert!(membership.has_permission(PermissionCode::ScheduleRead));
    assert!(!membership.has_permission(PermissionCode::ScheduleCreate));
}

#[tokio::test]
async fn test_adding_member_twice_is_rejected() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Once").await;

    let user = Uuid::now_v7();
    let data = NewMemberData {
        group_id: group.id,
        user_id: user,
        role_id: None,
    };
    repo.add_member(data.clone()).await.unwrap();
    let result = repo.add_member(data).await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_owner_cannot_be_removed_or_demoted() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, owner) = create_test_group(&repo, "Protected").await;

    let result = repo.remove_member(group.id, owner).await;
    assert!(matches!(result, Err(CoreError::OwnerRoleImmutable)));

    let roles = repo.list_roles(Some(group.id)).await.unwrap();
    let member_role = roles.iter().find(|r| r.is_default).unwrap();
    let result = repo.change_member_role(group.id, owner, member_role.id).await;
    assert!(matches!(result, Err(CoreError::OwnerRoleImmutable)));
}

#[tokio::test]
async fn test_ownership_transfer_swaps_roles_atomically() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, old_owner) = create_test_group(&repo, "Handover").await;

    let new_owner = Uuid::now_v7();
    repo.add_member(NewMemberData {
        group_id: group.id,
        user_id: new_owner,
        role_id: None,
    })
    .await
    .unwrap();

    repo.transfer_ownership(group.id, new_owner).await.unwrap();

    let promoted = repo.resolve_membership(group.id, new_owner).await.unwrap();
    assert!(promoted.is_owner());

    let demoted = repo.resolve_membership(group.id, old_owner).await.unwrap();
    assert!(!demoted.is_owner());
    assert_eq!(demoted.role.name, DEFAULT_MEMBER_ROLE_NAME);
}

#[tokio::test]
async fn test_transfer_to_non_member_fails() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Strangers").await;

    let result = repo.transfer_ownership(group.id, Uuid::now_v7()).await;
    assert!(matches!(
        result,
        Err(CoreError::Access(AccessError::NotAMember))
    ));
}

// ============================================================================
// Role lifecycle
// ============================================================================

#[tokio::test]
async fn test_role_lifecycle() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Roles").await;

    let role = repo
        .create_role(NewRoleData {
            group_id: Some(group.id),
            name: "Teen".to_string(),
            color: Some("#10b981".to_string()),
            sort_order: 2,
            is_default: false,
            permissions: vec![
                PermissionCode::GroupRead,
                PermissionCode::ScheduleRead,
                PermissionCode::ScheduleUpdate,
            ],
        })
        .await
        .unwrap();

    let updated = repo
        .update_role(
            role.id,
            UpdateRoleData {
                permissions: Some(vec![PermissionCode::GroupRead]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Teen");
    assert_eq!(
        repo.role_permissions(role.id).await.unwrap(),
        vec![PermissionCode::GroupRead]
    );

    repo.delete_role(role.id).await.unwrap();
    assert!(repo.find_role_by_id(role.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_role_name_in_scope_rejected() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Names").await;

    let data = NewRoleData {
        group_id: Some(group.id),
        name: "Helper".to_string(),
        color: None,
        sort_order: 5,
        is_default: false,
        permissions: vec![PermissionCode::GroupRead],
    };
    repo.create_role(data.clone()).await.unwrap();
    let result = repo.create_role(data).await;
    assert!(matches!(result, Err(CoreError::DuplicateRoleName(_))));
}

#[tokio::test]
async fn test_owner_role_is_immutable() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Immutable").await;

    let roles = repo.list_roles(Some(group.id)).await.unwrap();
    let owner_role = roles.iter().find(|r| r.name == OWNER_ROLE_NAME).unwrap();

    let result = repo
        .update_role(
            owner_role.id,
            UpdateRoleData {
                name: Some("Boss".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(CoreError::OwnerRoleImmutable)));

    let result = repo.delete_role(owner_role.id).await;
    assert!(matches!(result, Err(CoreError::OwnerRoleImmutable)));

    // Nor can a second OWNER be minted.
    let result = repo
        .create_role(NewRoleData {
            group_id: Some(group.id),
            name: OWNER_ROLE_NAME.to_string(),
            color: None,
            sort_order: 9,
            is_default: false,
            permissions: vec![],
        })
        .await;
    assert!(matches!(result, Err(CoreError::OwnerRoleImmutable)));
}

#[tokio::test]
async fn test_role_with_members_cannot_be_deleted() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "InUse").await;

    let role = repo
        .create_role(NewRoleData {
            group_id: Some(group.id),
            name: "Helper".to_string(),
            color: None,
            sort_order: 3,
            is_default: false,
            permissions: vec![PermissionCode::GroupRead],
        })
        .await
        .unwrap();

    repo.add_member(NewMemberData {
        group_id: group.id,
        user_id: Uuid::now_v7(),
        role_id: Some(role.id),
    })
    .await
    .unwrap();

    let result = repo.delete_role(role.id).await;
    assert!(matches!(result, Err(CoreError::RoleInUse(_))));
}

#[tokio::test]
async fn test_default_role_cannot_be_deleted() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Default").await;

    let roles = repo.list_roles(Some(group.id)).await.unwrap();
    let default_role = roles.iter().find(|r| r.is_default).unwrap();
    let result = repo.delete_role(default_role.id).await;
    assert!(matches!(result, Err(CoreError::RoleInUse(_))));
}

// ============================================================================
// Authorization gate
// ============================================================================

#[tokio::test]
async fn test_gate_allows_granted_permission_and_forbids_others() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Gated").await;

    let user = Uuid::now_v7();
    repo.add_member(NewMemberData {
        group_id: group.id,
        user_id: user,
        role_id: None,
    })
    .await
    .unwrap();

    let gate = AuthorizationGate::new(&repo);
    let sources = GroupIdSources::from_path_group_id(group.id.to_string());

    let membership = gate
        .require_permission(Some(user), &sources, PermissionCode::ScheduleRead)
        .await
        .unwrap();
    assert_eq!(membership.member.user_id, user);

    let result = gate
        .require_permission(Some(user), &sources, PermissionCode::ScheduleCreate)
        .await;
    match result {
        Err(CoreError::Access(AccessError::Forbidden { required, role })) => {
            assert_eq!(required, PermissionCode::ScheduleCreate);
            assert_eq!(role, DEFAULT_MEMBER_ROLE_NAME);
        }
        other => panic!("Expected Forbidden, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_gate_fails_closed_without_identity_or_membership() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, _owner) = create_test_group(&repo, "Closed").await;

    let gate = AuthorizationGate::new(&repo);
    let sources = GroupIdSources::from_path_group_id(group.id.to_string());

    let result = gate
        .require_permission(None, &sources, PermissionCode::GroupRead)
        .await;
    assert!(matches!(
        result,
        Err(CoreError::Access(AccessError::Unauthenticated))
    ));

    let result = gate
        .require_permission(Some(Uuid::now_v7()), &sources, PermissionCode::GroupRead)
        .await;
    assert!(matches!(
        result,
        Err(CoreError::Access(AccessError::NotAMember))
    ));

    let result = gate
        .require_permission(
            Some(Uuid::now_v7()),
            &GroupIdSources::default(),
            PermissionCode::GroupRead,
        )
        .await;
    assert!(matches!(
        result,
        Err(CoreError::Access(AccessError::MissingContext))
    ));
}

#[tokio::test]
async fn test_require_owner_rejects_regular_member() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, owner) = create_test_group(&repo, "OwnerOnly").await;

    let user = Uuid::now_v7();
    repo.add_member(NewMemberData {
        group_id: group.id,
        user_id: user,
        role_id: None,
    })
    .await
    .unwrap();

    let gate = AuthorizationGate::new(&repo);
    let sources = GroupIdSources::from_path_id(group.id.to_string());

    assert!(gate.require_owner(Some(owner), &sources).await.is_ok());
    assert!(matches!(
        gate.require_owner(Some(user), &sources).await,
        Err(CoreError::Access(AccessError::Forbidden { .. }))
    ));
}

// ============================================================================
// Recurring generation
// ============================================================================

#[tokio::test]
async fn test_generate_due_is_idempotent() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    let first = repo
        .generate_due(series.id, start, date(2025, 1, 5))
        .await
        .unwrap();
    assert_eq!(first.created_task_ids.len(), 5);
    assert_eq!(first.last_generated_through, Some(date(2025, 1, 5)));

    // The exact same window again: the boundary has moved past it.
    let second = repo
        .generate_due(series.id, start, date(2025, 1, 5))
        .await
        .unwrap();
    assert!(second.created_task_ids.is_empty());
    assert_eq!(second.duplicates_skipped, 0);

    let tasks = repo.find_tasks_for_series(series.id).await.unwrap();
    assert_eq!(tasks.len(), 5);

    let series = repo.find_series_by_id(series.id).await.unwrap().unwrap();
    assert_eq!(series.generated_count, 5);
    assert_eq!(series.last_generated_through, Some(date(2025, 1, 5)));
}

#[tokio::test]
async fn test_boundary_advances_monotonically_across_runs() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    repo.generate_due(series.id, start, date(2025, 1, 3))
        .await
        .unwrap();
    let outcome = repo
        .generate_due(series.id, start, date(2025, 1, 7))
        .await
        .unwrap();
    assert_eq!(outcome.created_task_ids.len(), 4);

    let series = repo.find_series_by_id(series.id).await.unwrap().unwrap();
    assert_eq!(series.last_generated_through, Some(date(2025, 1, 7)));
    assert_eq!(series.generated_count, 7);
}

#[tokio::test]
async fn test_count_capped_series_stops_across_runs() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series =
        create_test_series(&repo, daily_rule(EndCondition::AfterCount(5)), start).await;

    let first = repo
        .generate_due(series.id, start, date(2025, 1, 3))
        .await
        .unwrap();
    assert_eq!(first.created_task_ids.len(), 3);

    // The remaining budget is two, no matter how wide the window.
    let second = repo
        .generate_due(series.id, start, date(2025, 12, 31))
        .await
        .unwrap();
    assert_eq!(second.created_task_ids.len(), 2);

    let third = repo
        .generate_due(series.id, start, date(2026, 12, 31))
        .await
        .unwrap();
    assert!(third.created_task_ids.is_empty());

    let series = repo.find_series_by_id(series.id).await.unwrap().unwrap();
    assert_eq!(series.generated_count, 5);
}

#[tokio::test]
async fn test_skipped_dates_are_excluded_and_consume_no_budget() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series =
        create_test_series(&repo, daily_rule(EndCondition::AfterCount(3)), start).await;

    repo.skip_occurrence(series.id, date(2025, 1, 2), Some("vacation".to_string()), None)
        .await
        .unwrap();

    let outcome = repo
        .generate_due(series.id, start, date(2025, 1, 10))
        .await
        .unwrap();
    assert_eq!(outcome.created_task_ids.len(), 3);

    let dates: Vec<NaiveDate> = repo
        .find_tasks_for_series(series.id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|t| t.occurrence_date)
        .collect();
    // Jan 2 is skipped; the count budget still yields three tasks.
    assert_eq!(dates, vec![date(2025, 1, 1), date(2025, 1, 3), date(2025, 1, 4)]);
}

#[tokio::test]
async fn test_inverted_window_is_invalid() {
    let (repo, _temp_dir) = setup_test_db().await;
    let series =
        create_test_series(&repo, daily_rule(EndCondition::Never), date(2025, 1, 1)).await;

    let result = repo
        .generate_due(series.id, date(2025, 1, 10), date(2025, 1, 5))
        .await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_paused_series_generates_nothing() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    repo.update_series(
        series.id,
        UpdateSeriesData {
            active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let outcome = repo
        .generate_due(series.id, start, date(2025, 1, 10))
        .await
        .unwrap();
    assert!(outcome.created_task_ids.is_empty());

    // Resume picks up from the untouched boundary.
    repo.update_series(
        series.id,
        UpdateSeriesData {
            active: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let outcome = repo
        .generate_due(series.id, start, date(2025, 1, 3))
        .await
        .unwrap();
    assert_eq!(outcome.created_task_ids.len(), 3);
}

#[tokio::test]
async fn test_instances_copy_template_fields() {
    let (repo, _temp_dir) = setup_test_db().await;
    let participant = Uuid::now_v7();
    let template = repo
        .add_task(
            NewTaskData {
                title: "Take out the bins".to_string(),
                description: Some("Grey bin and recycling".to_string()),
                priority: Some(TaskPriority::High),
                category: Some("chores".to_string()),
                participants: vec![participant],
                reminders: vec![30, 10],
                rule: Some(daily_rule(EndCondition::Never)),
                generation: Some(GenerationMode::OnDemand),
                start_date: Some(date(2025, 1, 1)),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let series = repo
        .find_series_by_template(template.id)
        .await
        .unwrap()
        .unwrap();
    repo.generate_due(series.id, date(2025, 1, 1), date(2025, 1, 1))
        .await
        .unwrap();

    let instances = repo.find_tasks_for_series(series.id).await.unwrap();
    assert_eq!(instances.len(), 1);
    let instance = &instances[0];
    assert_eq!(instance.title, template.title);
    assert_eq!(instance.description, template.description);
    assert_eq!(instance.priority, TaskPriority::High);
    assert_eq!(instance.category, template.category);
    assert_eq!(instance.occurrence_date, Some(date(2025, 1, 1)));
    assert!(!instance.completed);

    assert_eq!(
        repo.task_participants(instance.id).await.unwrap(),
        vec![participant]
    );
    assert_eq!(repo.task_reminders(instance.id).await.unwrap(), vec![10, 30]);

    // The template itself is not an instance.
    let template = repo.find_task_by_id(template.id).await.unwrap().unwrap();
    assert_eq!(template.series_id, None);
    assert_eq!(template.occurrence_date, None);
}

#[tokio::test]
async fn test_preview_does_not_materialize() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    let preview = repo
        .preview_occurrences(series.id, start, 4)
        .await
        .unwrap();
    assert_eq!(
        preview,
        vec![
            date(2025, 1, 1),
            date(2025, 1, 2),
            date(2025, 1, 3),
            date(2025, 1, 4)
        ]
    );

    assert!(repo.find_tasks_for_series(series.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scheduler_sweep_covers_active_auto_series_only() {
    let (repo, _temp_dir) = setup_test_db().await;
    let today = Utc::now().date_naive();

    // Auto-scheduled: materialized at creation, sweep finds nothing new.
    repo.add_task(
        NewTaskData {
            title: "Auto chores".to_string(),
            rule: Some(daily_rule(EndCondition::Never)),
            start_date: Some(today),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();

    // On-demand: the sweep must leave it alone.
    let on_demand =
        create_test_series(&repo, daily_rule(EndCondition::Never), today).await;

    let summary = repo.run_scheduler_sweep(today).await.unwrap();
    assert_eq!(summary.series_processed, 1);
    assert_eq!(summary.tasks_created, 0);
    assert!(summary.errors.is_empty());

    assert!(repo
        .find_tasks_for_series(on_demand.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_auto_series_materializes_initial_window_on_creation() {
    let (repo, _temp_dir) = setup_test_db().await;
    let today = Utc::now().date_naive();

    let template = repo
        .add_task(
            NewTaskData {
                title: "Morning run".to_string(),
                rule: Some(daily_rule(EndCondition::Never)),
                start_date: Some(today),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    let series = repo
        .find_series_by_template(template.id)
        .await
        .unwrap()
        .unwrap();
    let instances = repo.find_tasks_for_series(series.id).await.unwrap();
    // Lookahead default is 30 days, inclusive window from today.
    assert_eq!(instances.len(), 31);
}

#[tokio::test]
async fn test_removing_skip_restores_future_generation() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    repo.skip_occurrence(series.id, date(2025, 1, 2), None, None)
        .await
        .unwrap();
    repo.remove_skip(series.id, date(2025, 1, 2)).await.unwrap();

    let outcome = repo
        .generate_due(series.id, start, date(2025, 1, 3))
        .await
        .unwrap();
    assert_eq!(outcome.created_task_ids.len(), 3);
}

// ============================================================================
// Task workflows
// ============================================================================

#[tokio::test]
async fn test_basic_task_crud_workflow() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, owner) = create_test_group(&repo, "CRUD").await;

    let task = repo
        .add_task(
            NewTaskData {
                title: "Buy groceries".to_string(),
                priority: Some(TaskPriority::Medium),
                group_id: Some(group.id),
                user_id: Some(owner),
                ..Default::default()
            },
            Some(owner),
        )
        .await
        .unwrap();
    assert_eq!(task.title, "Buy groceries");
    assert!(!task.completed);

    let updated = repo
        .update_task(
            task.id,
            UpdateTaskData {
                title: Some("Buy groceries and milk".to_string()),
                priority: Some(TaskPriority::High),
                ..Default::default()
            },
            Some(owner),
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Buy groceries and milk");
    assert_eq!(updated.priority, TaskPriority::High);

    let result = repo.complete_task(task.id, Some(owner)).await.unwrap();
    match result {
        CompletionResult::Single(completed) => {
            assert!(completed.completed);
            assert!(completed.completed_at.is_some());
        }
        _ => panic!("Expected single task completion"),
    }

    repo.delete_task(task.id, Some(owner)).await.unwrap();
    assert!(repo.find_task_by_id(task.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_completing_series_instance_chains_next_occurrence() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    repo.generate_due(series.id, start, start).await.unwrap();
    let instances = repo.find_tasks_for_series(series.id).await.unwrap();
    let first = instances.first().unwrap();

    let result = repo.complete_task(first.id, None).await.unwrap();
    match result {
        CompletionResult::SeriesInstance {
            completed,
            next,
            series_id,
            next_occurrence,
        } => {
            assert!(completed.completed);
            assert_eq!(series_id, series.id);
            assert_eq!(next_occurrence, Some(date(2025, 1, 2)));
            let next = next.expect("next occurrence should be materialized");
            assert_eq!(next.occurrence_date, Some(date(2025, 1, 2)));
            assert!(!next.completed);
        }
        _ => panic!("Expected series instance completion"),
    }
}

#[tokio::test]
async fn test_bulk_complete_skips_already_completed() {
    let (repo, _temp_dir) = setup_test_db().await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let task = repo
            .add_task(
                NewTaskData {
                    title: format!("Task {}", i),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        ids.push(task.id);
    }

    repo.complete_task(ids[0], None).await.unwrap();

    let completed = repo.bulk_complete_tasks(&ids, None).await.unwrap();
    assert_eq!(completed, vec![ids[1], ids[2]]);

    for id in &ids {
        assert!(repo.find_task_by_id(*id).await.unwrap().unwrap().completed);
    }
}

#[tokio::test]
async fn test_template_cannot_be_deleted_while_series_exists() {
    let (repo, _temp_dir) = setup_test_db().await;
    let series =
        create_test_series(&repo, daily_rule(EndCondition::Never), date(2025, 1, 1)).await;

    let result = repo.delete_task(series.template_task_id, None).await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_series_with_instances_cannot_be_deleted() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    repo.generate_due(series.id, start, date(2025, 1, 2))
        .await
        .unwrap();

    let result = repo.delete_series(series.id).await;
    assert!(matches!(result, Err(CoreError::InvalidInput(_))));

    for task in repo.find_tasks_for_series(series.id).await.unwrap() {
        repo.delete_task(task.id, None).await.unwrap();
    }
    repo.delete_series(series.id).await.unwrap();
    assert!(repo.find_series_by_id(series.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rule_edit_applies_to_future_occurrences_only() {
    let (repo, _temp_dir) = setup_test_db().await;
    let start = date(2025, 1, 1);
    let series = create_test_series(&repo, daily_rule(EndCondition::Never), start).await;

    repo.generate_due(series.id, start, date(2025, 1, 3))
        .await
        .unwrap();

    // Switch to every-other-day; the boundary does not rewind.
    let updated = repo
        .update_series(
            series.id,
            UpdateSeriesData {
                rule: Some(RuleConfig {
                    interval: 2,
                    end: EndCondition::Never,
                    cadence: Cadence::Daily,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.last_generated_through, Some(date(2025, 1, 3)));

    let outcome = repo
        .generate_due(series.id, start, date(2025, 1, 9))
        .await
        .unwrap();
    let mut new_dates: Vec<NaiveDate> = Vec::new();
    for id in &outcome.created_task_ids {
        let task = repo.find_task_by_id(*id).await.unwrap().unwrap();
        new_dates.push(task.occurrence_date.unwrap());
    }
    new_dates.sort();
    assert_eq!(
        new_dates,
        vec![date(2025, 1, 5), date(2025, 1, 7), date(2025, 1, 9)]
    );
}

#[tokio::test]
async fn test_group_delete_cascades_over_schedule_data() {
    let (repo, _temp_dir) = setup_test_db().await;
    let (group, owner) = create_test_group(&repo, "Cascade").await;

    let template = repo
        .add_task(
            NewTaskData {
                title: "Family dinner".to_string(),
                group_id: Some(group.id),
                rule: Some(daily_rule(EndCondition::Never)),
                generation: Some(GenerationMode::OnDemand),
                start_date: Some(date(2025, 1, 1)),
                ..Default::default()
            },
            Some(owner),
        )
        .await
        .unwrap();
    let series = repo
        .find_series_by_template(template.id)
        .await
        .unwrap()
        .unwrap();
    repo.generate_due(series.id, date(2025, 1, 1), date(2025, 1, 3))
        .await
        .unwrap();

    repo.delete_group(group.id).await.unwrap();

    assert!(repo.find_group_by_id(group.id).await.unwrap().is_none());
    assert!(repo.find_series_by_id(series.id).await.unwrap().is_none());
    assert!(repo.find_task_by_id(template.id).await.unwrap().is_none());
    assert!(repo.find_tasks_for_group(group.id).await.unwrap().is_empty());
    assert!(repo.list_roles(Some(group.id)).await.unwrap().is_empty());
    assert!(repo.list_members(group.id).await.unwrap().is_empty());
}
