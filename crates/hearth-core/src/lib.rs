//! # Hearth Core Library
//!
//! The engine of a family-organization backend: a deterministic
//! recurring-task scheduler and the role/permission authorization gate that
//! fronts every group-scoped mutation.
//!
//! ## Features
//!
//! - **Declarative Recurrence**: daily/weekly/monthly/yearly rules with
//!   interval, end-by-date, end-by-count, and explicit skip dates, expanded
//!   by a pure calculator into lazy occurrence sequences
//! - **Idempotent Generation**: at-most-one task per (series, occurrence
//!   date), enforced by a storage uniqueness constraint so concurrent and
//!   repeated runs are safe across process instances
//! - **Role-Based Authorization**: one role per member, effective permission
//!   sets resolved per group, with a fail-closed gate and a specially
//!   protected OWNER role
//! - **Domain Events**: task and generation events delivered through a
//!   channel to pluggable sinks, decoupled from operation latency
//! - **Type Safety**: compile-time checked models over sqlx/SQLite
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core data structures and transfer objects
//! - [`recurrence`]: The occurrence calculator
//! - [`repository`]: Data access layer with Repository pattern, including
//!   the task generation coordinator
//! - [`authz`]: Group-id source resolution and the authorization gate
//! - [`events`]: Domain event bus, dispatcher, and sinks
//! - [`error`]: Error types with typed authorization failures
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hearth_core::{
//!     db,
//!     events::EventBus,
//!     models::{GenerationConfig, NewGroupData},
//!     repository::{GroupRepository, SqliteRepository},
//! };
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("hearth.db").await?;
//!     let (events, _rx) = EventBus::new();
//!     let repo = SqliteRepository::new(pool, GenerationConfig::default(), events);
//!
//!     let group = repo
//!         .create_group(NewGroupData {
//!             name: "The Harrisons".to_string(),
//!             owner_user_id: Uuid::now_v7(),
//!         })
//!         .await?;
//!     println!("Created group: {}", group.name);
//!
//!     Ok(())
//! }
//! ```

pub mod authz;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod recurrence;
pub mod repository;
