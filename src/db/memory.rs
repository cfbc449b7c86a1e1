//! Process-local storage, used when no database is configured and in tests.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use parking_lot::RwLock;
use validator::Validate;

use super::{TaskStore, UserStore, TASK_NOT_FOUND, TASK_NOT_OWNED, USERNAME_TAKEN};
use crate::auth::EndpointAccess;
use crate::error::AppError;
use crate::models::{TodoTask, User};

struct Table<T> {
    rows: Vec<T>,
    last_id: i64,
}

impl<T> Table<T> {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            last_id: 0,
        }
    }
}

/// Tasks and users held in memory behind read-write locks. Ids start at 1.
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<Table<TodoTask>>,
    users: RwLock<Table<User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Index of task `id`, provided `user_id` owns it.
fn owned_index(rows: &[TodoTask], id: i64, user_id: i64) -> Result<usize, AppError> {
    let index = rows
        .iter()
        .position(|task| task.id == id)
        .ok_or_else(|| AppError::NotFound(TASK_NOT_FOUND.into()))?;

    if rows[index].user_id != user_id {
        return Err(AppError::Forbidden(TASK_NOT_OWNED.into()));
    }
    Ok(index)
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(
        &self,
        mut task: TodoTask,
        user_id: i64,
        completed: bool,
    ) -> Result<TodoTask, AppError> {
        task.validate()?;

        let mut tasks = self.tasks.write();
        let now = Utc::now();
        task.id = tasks.next_id();
        task.user_id = user_id;
        task.created_at = now;
        task.completed_at = completed.then_some(now);
        tasks.rows.push(task.clone());

        debug!("Created task {} for user {}", task.id, user_id);
        Ok(task)
    }

    async fn get(&self, id: i64, user_id: i64) -> Result<TodoTask, AppError> {
        let tasks = self.tasks.read();
        let index = owned_index(&tasks.rows, id, user_id)?;
        Ok(tasks.rows[index].clone())
    }

    async fn get_all_owned(&self, user_id: i64) -> Result<Vec<TodoTask>, AppError> {
        Ok(self
            .tasks
            .read()
            .rows
            .iter()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<TodoTask>, AppError> {
        Ok(self.tasks.read().rows.clone())
    }

    async fn update(&self, id: i64, task: TodoTask, user_id: i64) -> Result<TodoTask, AppError> {
        task.validate()?;

        let mut tasks = self.tasks.write();
        let index = owned_index(&tasks.rows, id, user_id)?;
        let stored = &mut tasks.rows[index];
        stored.title = task.title;
        stored.priority = task.priority;
        stored.description = task.description;
        stored.completed_at = task.completed_at;
        Ok(stored.clone())
    }

    async fn toggle_completed(&self, id: i64, user_id: i64) -> Result<TodoTask, AppError> {
        let mut tasks = self.tasks.write();
        let index = owned_index(&tasks.rows, id, user_id)?;
        let stored = &mut tasks.rows[index];
        stored.completed_at = match stored.completed_at {
            Some(_) => None,
            None => Some(Utc::now()),
        };
        Ok(stored.clone())
    }

    async fn delete(&self, id: i64, user_id: i64) -> Result<(), AppError> {
        let mut tasks = self.tasks.write();
        let index = owned_index(&tasks.rows, id, user_id)?;
        tasks.rows.remove(index);
        debug!("Deleted task {} of user {}", id, user_id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, mut user: User) -> Result<User, AppError> {
        let mut users = self.users.write();
        user.normalized_username = User::normalize(&user.username);
        if users
            .rows
            .iter()
            .any(|existing| existing.normalized_username == user.normalized_username)
        {
            return Err(AppError::BadRequest(USERNAME_TAKEN.into()));
        }

        user.id = users.next_id();
        user.token = None;
        users.rows.push(user.clone());
        debug!("Created user {} ({})", user.id, user.username);
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.users.read().rows.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let normalized = User::normalize(username);
        Ok(self
            .users
            .read()
            .rows
            .iter()
            .find(|u| u.normalized_username == normalized)
            .cloned())
    }

    async fn find_with_access(&self, access: EndpointAccess) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .read()
            .rows
            .iter()
            .filter(|u| u.access == access)
            .cloned()
            .collect())
    }

    async fn update_access(&self, id: i64, access: EndpointAccess) -> Result<User, AppError> {
        let mut users = self.users.write();
        let user = users
            .rows
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User not found!".into()))?;
        user.access = access;
        Ok(user.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), AppError> {
        {
            let mut users = self.users.write();
            let index = users
                .rows
                .iter()
                .position(|u| u.id == id)
                .ok_or_else(|| AppError::NotFound("User not found!".into()))?;
            users.rows.remove(index);
        }
        self.tasks.write().rows.retain(|task| task.user_id != id);
        debug!("Deleted user {} and their tasks", id);
        Ok(())
    }
}
