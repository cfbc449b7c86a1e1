//! Storage: the predicate translator and the two interchangeable task/user stores.

pub mod constraint;
pub mod defaults;
pub mod memory;
pub mod naming;
pub mod postgres;
pub mod predicate;
pub mod schema;
pub mod value;

use async_trait::async_trait;
use log::info;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use constraint::{Constraint, DbService, TranslationError};
pub use memory::MemoryStore;
pub use naming::{ColumnResolver, NamingPolicy, Resolution, SnakeCase, Verbatim};
pub use postgres::PostgresStore;
pub use predicate::{BinaryOp, Expr, Operand, Predicate, UnaryOp};
pub use schema::{Field, FieldMeta, Record};
pub use value::{SqlValue, ValueConverter, ValueFormatter};

use crate::auth::EndpointAccess;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{TodoTask, User};

pub(crate) const TASK_NOT_FOUND: &str = "Task not found!";
pub(crate) const TASK_NOT_OWNED: &str = "Task is not owned by the user!";
pub(crate) const USERNAME_TAKEN: &str = "Username is already taken!";

/// Task persistence. Every operation except `get_all` is scoped to the owning user.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Stores `task` for `user_id`, completed now when `completed` is set.
    async fn create(&self, task: TodoTask, user_id: i64, completed: bool)
        -> Result<TodoTask, AppError>;

    /// Seeds the starter tasks every new account receives.
    async fn create_defaults(&self, user_id: i64) -> Result<Vec<TodoTask>, AppError> {
        let mut created = Vec::new();
        for task in defaults::default_tasks() {
            created.push(self.create(task, user_id, false).await?);
        }
        Ok(created)
    }

    async fn get(&self, id: i64, user_id: i64) -> Result<TodoTask, AppError>;

    async fn get_all_owned(&self, user_id: i64) -> Result<Vec<TodoTask>, AppError>;

    /// Every task of every user.
    async fn get_all(&self) -> Result<Vec<TodoTask>, AppError>;

    /// Replaces the client-editable parts of task `id`. The id, owner and creation
    /// time in `task` are ignored.
    async fn update(&self, id: i64, task: TodoTask, user_id: i64) -> Result<TodoTask, AppError>;

    /// Marks the task completed now, or clears its completion.
    async fn toggle_completed(&self, id: i64, user_id: i64) -> Result<TodoTask, AppError>;

    async fn delete(&self, id: i64, user_id: i64) -> Result<(), AppError>;
}

/// Account persistence. Usernames are unique case-insensitively.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: User) -> Result<User, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Users whose access is exactly `access`.
    async fn find_with_access(&self, access: EndpointAccess) -> Result<Vec<User>, AppError>;

    async fn update_access(&self, id: i64, access: EndpointAccess) -> Result<User, AppError>;

    /// Removes the user and every task they own.
    async fn delete(&self, id: i64) -> Result<(), AppError>;
}

/// Which backend `connect` builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    Postgres,
}

impl FromStr for StoreMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreMode::Memory),
            "postgres" => Ok(StoreMode::Postgres),
            other => Err(AppError::InternalServerError(format!(
                "Unknown DB_MODE `{}`, expected memory or postgres",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreMode::Memory => write!(f, "memory"),
            StoreMode::Postgres => write!(f, "postgres"),
        }
    }
}

/// The task and user stores of one backend.
#[derive(Clone)]
pub struct Storage {
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserStore>,
}

impl Storage {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            tasks: store.clone(),
            users: store,
        }
    }
}

/// Builds the backend selected by `config`, creating the schema when it is Postgres.
pub async fn connect(config: &Config) -> Result<Storage, AppError> {
    info!("Using {} storage", config.store_mode);
    match config.store_mode {
        StoreMode::Memory => Ok(Storage::memory()),
        StoreMode::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                AppError::InternalServerError("DATABASE_URL must be set".into())
            })?;
            let store = Arc::new(PostgresStore::connect(url).await?);
            store.migrate().await?;
            Ok(Storage {
                tasks: store.clone(),
                users: store,
            })
        }
    }
}
