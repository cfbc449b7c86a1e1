use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::db::predicate::{Expr, Operand};
use crate::db::SqlValue;
use crate::record;

/// Priority of a task, `A` being the most pressing.
/// Stored as its letter in a `TEXT` column.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    A,
    B,
    C,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::A => "A",
            Priority::B => "B",
            Priority::C => "C",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown priority `{0}`")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Priority::A),
            "B" => Ok(Priority::B),
            "C" => Ok(Priority::C),
            other => Err(ParsePriorityError(other.to_string())),
        }
    }
}

impl From<Priority> for SqlValue {
    fn from(priority: Priority) -> Self {
        SqlValue::Enum {
            type_name: "Priority",
            name: priority.as_str(),
            ordinal: priority as i64,
        }
    }
}

impl Operand for Priority {
    fn into_expr(self) -> Expr {
        Expr::Constant(self.into())
    }
}

/// A todo item as stored and returned to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct TodoTask {
    /// Assigned by storage; ignored on create and update.
    #[serde(default)]
    pub id: i64,
    #[validate(custom = "not_blank")]
    pub title: String,
    pub priority: Option<Priority>,
    pub description: Option<String>,
    /// Assigned by storage at creation.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Owner. Overwritten with the caller's id on create.
    #[serde(default)]
    pub user_id: i64,
}

record! {
    TodoTask in "tasks" {
        ID: id [default_generated],
        TITLE: title,
        PRIORITY: priority,
        DESCRIPTION: description,
        CREATED_AT: created_at [default_generated],
        COMPLETED_AT: completed_at,
        USER_ID: user_id,
    }
}

fn not_blank(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Title cannot be empty!".into());
        return Err(error);
    }
    Ok(())
}

impl TodoTask {
    /// A task with only the client-supplied parts filled in.
    pub fn new(
        title: impl Into<String>,
        priority: Option<Priority>,
        description: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            priority,
            description,
            created_at: Utc::now(),
            completed_at: None,
            user_id: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

impl<'r> FromRow<'r, PgRow> for TodoTask {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let priority = row
            .try_get::<Option<String>, _>("priority")?
            .map(|text| text.parse::<Priority>())
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "priority".into(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            priority,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Record;

    #[test]
    fn test_task_validation() {
        let valid = TodoTask::new("Buy milk", Some(Priority::B), None);
        assert!(valid.validate().is_ok());

        let blank = TodoTask::new("   ", None, None);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("A".parse::<Priority>().unwrap(), Priority::A);
        assert!("D".parse::<Priority>().is_err());
        assert_eq!(Priority::C.to_string(), "C");
    }

    #[test]
    fn test_record_metadata() {
        assert_eq!(TodoTask::TABLE, "tasks");
        assert!(TodoTask::field_meta("id").unwrap().default_generated);
        assert!(TodoTask::field_meta("created_at").unwrap().default_generated);
        assert!(!TodoTask::field_meta("title").unwrap().default_generated);

        let task = TodoTask::new("Title", Some(Priority::A), None);
        assert_eq!(task.value_of("priority"), Some(Priority::A.into()));
        assert_eq!(task.value_of("description"), Some(SqlValue::Null));
    }

    #[test]
    fn test_task_deserializes_from_client_payload() {
        let task: TodoTask =
            serde_json::from_str(r#"{"title":"Read","priority":"B","description":null,"completed_at":null}"#)
                .unwrap();
        assert_eq!(task.title, "Read");
        assert_eq!(task.priority, Some(Priority::B));
        assert_eq!(task.id, 0);
    }
}
