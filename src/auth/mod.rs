pub mod access;
pub mod password;
pub mod revoked;
pub mod service;
pub mod token;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

// Re-export necessary items
pub use access::EndpointAccess;
pub use password::{hash_password, verify_password};
pub use revoked::RevokedTokens;
pub use service::AuthService;
pub use token::{Claims, TokenIssuer};

lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Username and password, as submitted to register or log in.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Credentials {
    /// Must be between 3 and 32 characters, alphanumeric, and can include underscores or hyphens.
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    /// At least 6 characters with a digit, a lowercase letter, an uppercase letter
    /// and a symbol.
    #[validate(length(min = 6), custom = "password_strength")]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

fn password_strength(password: &str) -> Result<(), ValidationError> {
    let rules: [(fn(char) -> bool, &str); 4] = [
        (|c: char| c.is_ascii_digit(), "Password must contain a digit"),
        (|c: char| c.is_lowercase(), "Password must contain a lowercase letter"),
        (|c: char| c.is_uppercase(), "Password must contain an uppercase letter"),
        (|c: char| !c.is_alphanumeric(), "Password must contain a non-alphanumeric character"),
    ];

    for (rule, message) in rules {
        if !password.chars().any(rule) {
            let mut error = ValidationError::new("password_strength");
            error.message = Some(message.to_string().into());
            return Err(error);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_credentials_validation() {
        assert!(Credentials::new("test_user-123", "Passw0rd!").validate().is_ok());

        // Contains space and exclamation
        assert!(Credentials::new("test user!", "Passw0rd!").validate().is_err());
        assert!(Credentials::new("tu", "Passw0rd!").validate().is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(Credentials::new("alice", "P0rd!").validate().is_err());
        assert!(Credentials::new("alice", "password1!").validate().is_err());
        assert!(Credentials::new("alice", "PASSWORD1!").validate().is_err());
        assert!(Credentials::new("alice", "Password!").validate().is_err());
        assert!(Credentials::new("alice", "Password1").validate().is_err());
        assert!(Credentials::new("alice", "Password1!").validate().is_ok());
    }
}
