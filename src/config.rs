use chrono::Duration;
use std::env;

use crate::db::StoreMode;
use crate::error::AppError;

/// Credentials of the administrator account created at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_mode: StoreMode,
    /// Required when `store_mode` is `Postgres`.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_lifetime: Duration,
    pub bcrypt_cost: u32,
    pub admin: Option<AdminAccount>,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_mode = match lookup("DB_MODE") {
            Some(mode) => mode.parse::<StoreMode>()?,
            None => StoreMode::Memory,
        };

        let database_url = lookup("DATABASE_URL");
        if store_mode == StoreMode::Postgres && database_url.is_none() {
            return Err(AppError::InternalServerError(
                "DATABASE_URL must be set when DB_MODE is postgres".into(),
            ));
        }

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| AppError::InternalServerError("JWT_SECRET must be set".into()))?;

        let token_lifetime = match lookup("JWT_LIFETIME_MINUTES") {
            Some(minutes) => minutes
                .parse::<i64>()
                .ok()
                .filter(|m| *m > 0)
                .map(Duration::minutes)
                .ok_or_else(|| {
                    AppError::InternalServerError(
                        "JWT_LIFETIME_MINUTES must be a positive number".into(),
                    )
                })?,
            None => Duration::minutes(15),
        };

        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(cost) => cost.parse::<u32>().map_err(|_| {
                AppError::InternalServerError("BCRYPT_COST must be a number".into())
            })?,
            None => bcrypt::DEFAULT_COST,
        };

        let admin = match (lookup("API_ADMIN_USER"), lookup("API_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminAccount { username, password }),
            (None, None) => None,
            _ => {
                return Err(AppError::InternalServerError(
                    "API_ADMIN_USER and API_ADMIN_PASSWORD must be set together".into(),
                ))
            }
        };

        Ok(Self {
            store_mode,
            database_url,
            jwt_secret,
            jwt_issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "tasklist".to_string()),
            jwt_audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "tasklist".to_string()),
            token_lifetime,
            bcrypt_cost,
            admin,
        })
    }
}
