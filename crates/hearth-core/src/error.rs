use crate::models::PermissionCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("An occurrence for this date was already generated")]
    DuplicateOccurrence,

    #[error("The owner role cannot be edited, deleted, or reassigned")]
    OwnerRoleImmutable,

    #[error("Role is still in use: {0}")]
    RoleInUse(String),

    #[error("A role named '{0}' already exists in this scope")]
    DuplicateRoleName(String),

    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Typed authorization failures, surfaced verbatim to callers.
///
/// `Forbidden` carries enough for a user-facing message (the required
/// permission and the caller's own resolved role name) and nothing about any
/// other user's role data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("No authenticated user on the request")]
    Unauthenticated,

    #[error("No group identifier could be resolved from the request")]
    MissingContext,

    #[error("User is not a member of this group")]
    NotAMember,

    #[error("Permission '{required}' is required; the '{role}' role does not grant it")]
    Forbidden {
        required: PermissionCode,
        role: String,
    },
}
