//! PostgreSQL storage over an `sqlx` pool.
//!
//! Column lists come from each model's field metadata and every `WHERE` clause is a
//! [`Constraint`] translated in bound mode, so user-supplied values only ever travel
//! as query parameters.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use validator::Validate;

use super::{
    Constraint, DbService, Predicate, Record, SqlValue, TaskStore, TranslationError, UserStore,
    TASK_NOT_FOUND, USERNAME_TAKEN,
};
use crate::auth::EndpointAccess;
use crate::error::AppError;
use crate::models::{TodoTask, User};

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL,
        normalized_username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        access BIGINT NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        priority TEXT CHECK (priority IN ('A', 'B', 'C')),
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        completed_at TIMESTAMPTZ,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE
    )
    "#,
];

const UNIQUE_VIOLATION: &str = "23505";

type PgQueryAs<'q, O> = QueryAs<'q, Postgres, O, PgArguments>;

pub struct PostgresStore {
    pool: PgPool,
    service: DbService,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        info!("Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Uses snake_case columns and the default literal rules.
    pub fn new(pool: PgPool) -> Self {
        Self::with_service(pool, DbService::default())
    }

    pub fn with_service(pool: PgPool, service: DbService) -> Self {
        Self { pool, service }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }

    async fn fetch_all<T>(&self, sql: String, params: Vec<SqlValue>) -> Result<Vec<T>, AppError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        debug!("{}", sql);
        let rows = bind_values(sqlx::query_as::<_, T>(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_optional<T>(
        &self,
        sql: String,
        params: Vec<SqlValue>,
    ) -> Result<Option<T>, AppError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        debug!("{}", sql);
        let row = bind_values(sqlx::query_as::<_, T>(&sql), params)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn select<T>(&self, predicate: Option<Predicate<T>>) -> Result<Vec<T>, AppError>
    where
        T: Record + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let (sql, params) = select_sql(&self.service, predicate.as_ref())?;
        self.fetch_all(sql, params).await
    }

    async fn select_one<T>(&self, predicate: Predicate<T>) -> Result<Option<T>, AppError>
    where
        T: Record + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let (sql, params) = select_sql(&self.service, Some(&predicate))?;
        self.fetch_optional(sql, params).await
    }

    async fn insert<T>(&self, record: &T) -> Result<T, AppError>
    where
        T: Record + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let (sql, params) = insert_sql(&self.service, record)?;
        debug!("{}", sql);
        let row = bind_values(sqlx::query_as::<_, T>(&sql), params)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)?;
        Ok(row)
    }

    /// Deletes the matching rows, returning how many there were.
    async fn delete_where<T: Record>(&self, predicate: Predicate<T>) -> Result<usize, AppError> {
        let constraint = Constraint::bound(&predicate, &self.service)?;
        let (clause, params) = constraint.into_parts();
        let sql = format!("DELETE FROM {} WHERE {} RETURNING 1", T::TABLE, clause);
        let deleted: Vec<(i32,)> = self.fetch_all(sql, params).await?;
        Ok(deleted.len())
    }

    fn owned_task(id: i64, user_id: i64) -> Predicate<TodoTask> {
        TodoTask::ID.eq(id).and(TodoTask::USER_ID.eq(user_id))
    }
}

fn column_list<T: Record>(service: &DbService) -> String {
    service
        .resolver()
        .columns::<T>(false)
        .into_iter()
        .map(|(_, column)| column)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders `value` for a VALUES or SET list: nulls and converted values inline,
/// everything else as the next placeholder.
fn push_value(
    service: &DbService,
    value: SqlValue,
    params: &mut Vec<SqlValue>,
) -> Result<String, TranslationError> {
    if value.is_null() || service.formatter().has_converter(&value) {
        return service.formatter().format(&value);
    }
    params.push(value);
    Ok(format!("${}", params.len()))
}

/// Stored members of `record` that the database does not assign, with their values.
fn writable_values<T: Record>(
    service: &DbService,
    record: &T,
) -> Result<Vec<(String, SqlValue)>, TranslationError> {
    service
        .resolver()
        .columns::<T>(true)
        .into_iter()
        .map(|(meta, column)| {
            record
                .value_of(meta.name)
                .map(|value| (column, value))
                .ok_or(TranslationError::UnknownField {
                    record: std::any::type_name::<T>(),
                    field: meta.name,
                })
        })
        .collect()
}

fn select_sql<T: Record>(
    service: &DbService,
    predicate: Option<&Predicate<T>>,
) -> Result<(String, Vec<SqlValue>), TranslationError> {
    let mut sql = format!("SELECT {} FROM {}", column_list::<T>(service), T::TABLE);
    let mut params = Vec::new();
    if let Some(predicate) = predicate {
        let (clause, bound) = Constraint::bound(predicate, service)?.into_parts();
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
        params = bound;
    }
    sql.push_str(" ORDER BY id");
    Ok((sql, params))
}

fn insert_sql<T: Record>(
    service: &DbService,
    record: &T,
) -> Result<(String, Vec<SqlValue>), TranslationError> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    let mut params = Vec::new();
    for (column, value) in writable_values(service, record)? {
        columns.push(column);
        values.push(push_value(service, value, &mut params)?);
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        T::TABLE,
        columns.join(", "),
        values.join(", "),
        column_list::<T>(service)
    );
    Ok((sql, params))
}

fn update_sql<T: Record>(
    service: &DbService,
    record: &T,
    predicate: &Predicate<T>,
) -> Result<(String, Vec<SqlValue>), TranslationError> {
    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (column, value) in writable_values(service, record)? {
        let rendered = push_value(service, value, &mut params)?;
        assignments.push(format!("{} = {}", column, rendered));
    }

    let (clause, bound) = Constraint::bound_from(predicate, service, params.len() + 1)?.into_parts();
    params.extend(bound);

    let sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        T::TABLE,
        assignments.join(", "),
        clause,
        column_list::<T>(service)
    );
    Ok((sql, params))
}

fn bind_values<'q, O>(mut query: PgQueryAs<'q, O>, params: Vec<SqlValue>) -> PgQueryAs<'q, O> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Float(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Char(v) => query.bind(v.to_string()),
            SqlValue::Enum { name, .. } => query.bind(name),
            SqlValue::Timestamp(v) => query.bind(v),
            SqlValue::Uuid(v) => query.bind(v),
        };
    }
    query
}

fn map_unique_violation(error: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return AppError::BadRequest(USERNAME_TAKEN.into());
        }
    }
    error.into()
}

#[async_trait]
impl TaskStore for PostgresStore {
    async fn create(
        &self,
        mut task: TodoTask,
        user_id: i64,
        completed: bool,
    ) -> Result<TodoTask, AppError> {
        task.validate()?;
        task.user_id = user_id;
        task.completed_at = completed.then(Utc::now);
        self.insert(&task).await
    }

    async fn get(&self, id: i64, user_id: i64) -> Result<TodoTask, AppError> {
        self.select_one(Self::owned_task(id, user_id))
            .await?
            .ok_or_else(|| AppError::NotFound(TASK_NOT_FOUND.into()))
    }

    async fn get_all_owned(&self, user_id: i64) -> Result<Vec<TodoTask>, AppError> {
        self.select(Some(TodoTask::USER_ID.eq(user_id))).await
    }

    async fn get_all(&self) -> Result<Vec<TodoTask>, AppError> {
        self.select(None).await
    }

    async fn update(
        &self,
        id: i64,
        mut task: TodoTask,
        user_id: i64,
    ) -> Result<TodoTask, AppError> {
        task.validate()?;
        task.user_id = user_id;
        let (sql, params) = update_sql(&self.service, &task, &Self::owned_task(id, user_id))?;
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| AppError::NotFound(TASK_NOT_FOUND.into()))
    }

    async fn toggle_completed(&self, id: i64, user_id: i64) -> Result<TodoTask, AppError> {
        let (clause, params) =
            Constraint::bound(&Self::owned_task(id, user_id), &self.service)?.into_parts();
        let sql = format!(
            "UPDATE {table} SET completed_at = \
             CASE WHEN completed_at IS NULL THEN CURRENT_TIMESTAMP ELSE NULL END \
             WHERE {clause} RETURNING {columns}",
            table = TodoTask::TABLE,
            clause = clause,
            columns = column_list::<TodoTask>(&self.service)
        );
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| AppError::NotFound(TASK_NOT_FOUND.into()))
    }

    async fn delete(&self, id: i64, user_id: i64) -> Result<(), AppError> {
        match self.delete_where(Self::owned_task(id, user_id)).await? {
            0 => Err(AppError::NotFound(TASK_NOT_FOUND.into())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create(&self, mut user: User) -> Result<User, AppError> {
        user.normalized_username = User::normalize(&user.username);
        self.insert(&user).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        self.select_one(User::ID.eq(id)).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.select_one(User::NORMALIZED_USERNAME.eq(User::normalize(username)))
            .await
    }

    async fn find_with_access(&self, access: EndpointAccess) -> Result<Vec<User>, AppError> {
        self.select(Some(User::ACCESS.eq(access))).await
    }

    async fn update_access(&self, id: i64, access: EndpointAccess) -> Result<User, AppError> {
        let (clause, mut params) =
            Constraint::bound_from(&User::ID.eq(id), &self.service, 2)?.into_parts();
        params.insert(0, access.into());

        let sql = format!(
            "UPDATE {} SET access = $1 WHERE {} RETURNING {}",
            User::TABLE,
            clause,
            column_list::<User>(&self.service)
        );
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found!".into()))
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        match self.delete_where(User::ID.eq(id)).await? {
            0 => Err(AppError::NotFound("User not found!".into())),
            _ => Ok(()),
        }
    }
}
