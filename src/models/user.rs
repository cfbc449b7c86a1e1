use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use crate::auth::EndpointAccess;
use crate::record;

/// An account. Returned to clients with its session token filled in after
/// register or login.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub username: String,
    /// Upper-cased username, the key for case-insensitive lookups.
    #[serde(skip)]
    pub normalized_username: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(default)]
    pub access: EndpointAccess,
    /// Only set on responses; never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

record! {
    User in "users" {
        ID: id [default_generated],
        USERNAME: username,
        NORMALIZED_USERNAME: normalized_username,
        PASSWORD_HASH: password_hash,
        ACCESS: access,
        TOKEN: token [ignored],
    }
}

impl User {
    pub fn new(username: impl Into<String>, password_hash: String, access: EndpointAccess) -> Self {
        let username = username.into();
        Self {
            id: 0,
            normalized_username: Self::normalize(&username),
            username,
            password_hash,
            access,
            token: None,
        }
    }

    pub fn normalize(username: &str) -> String {
        username.to_uppercase()
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let access: i64 = row.try_get("access")?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            normalized_username: row.try_get("normalized_username")?,
            password_hash: row.try_get("password_hash")?,
            access: EndpointAccess::from_bits_truncate(access as u32),
            token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Record;

    #[test]
    fn test_new_user_normalizes_username() {
        let user = User::new("Alice_1", "hash".into(), EndpointAccess::TASKS_OWNED);
        assert_eq!(user.normalized_username, "ALICE_1");
        assert!(user.token.is_none());
    }

    #[test]
    fn test_serialization_hides_secrets() {
        let mut user = User::new("alice", "$2b$hash".into(), EndpointAccess::TASKS_OWNED);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("normalized_username").is_none());
        assert!(json.get("token").is_none());
        assert_eq!(json["access"], 1);

        user.token = Some("jwt".into());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["token"], "jwt");
    }

    #[test]
    fn test_token_is_not_stored() {
        assert!(User::field_meta("token").unwrap().ignored);
        assert!(!User::field_meta("password_hash").unwrap().ignored);
    }
}
