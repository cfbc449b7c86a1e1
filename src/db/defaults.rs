use crate::models::{Priority, TodoTask};

/// Starter tasks seeded into every new account.
pub fn default_tasks() -> Vec<TodoTask> {
    vec![
        TodoTask::new(
            "I am a task, you can complete me by checking the box",
            Some(Priority::A),
            Some("This is my description".to_string()),
        ),
        TodoTask::new(
            "See my details for by clicking me",
            Some(Priority::B),
            Some("My description can be changed".to_string()),
        ),
    ]
}
