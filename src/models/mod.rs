pub mod task;
pub mod user;

pub use task::{Priority, TodoTask};
pub use user::User;
