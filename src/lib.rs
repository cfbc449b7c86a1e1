#![doc = "The `tasklist` library crate."]
#![doc = ""]
#![doc = "This crate contains the core of a todo-list API: domain models, the two storage"]
#![doc = "backends, the typed-predicate-to-SQL translator they query with, token issuance,"]
#![doc = "the revocation list, and error handling. HTTP adapters call into it."]

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use crate::error::AppError;
