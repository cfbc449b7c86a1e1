//! Registration, login, logout and per-request token checks.

use log::{info, warn};
use std::sync::Arc;
use validator::Validate;

use super::{hash_password, verify_password, Claims, Credentials, EndpointAccess};
use super::{RevokedTokens, TokenIssuer};
use crate::config::AdminAccount;
use crate::db::{Storage, TaskStore, UserStore, USERNAME_TAKEN};
use crate::error::AppError;
use crate::models::User;

const INVALID_LOGIN: &str = "Invalid username or password!";

pub struct AuthService {
    users: Arc<dyn UserStore>,
    tasks: Arc<dyn TaskStore>,
    issuer: TokenIssuer,
    revoked: RevokedTokens,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        storage: &Storage,
        issuer: TokenIssuer,
        revoked: RevokedTokens,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users: storage.users.clone(),
            tasks: storage.tasks.clone(),
            issuer,
            revoked,
            bcrypt_cost,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn revoked(&self) -> &RevokedTokens {
        &self.revoked
    }

    /// Creates an account with access to its own tasks, seeds its starter tasks and
    /// signs it in.
    pub async fn register(&self, credentials: Credentials) -> Result<User, AppError> {
        credentials.validate()?;
        if self
            .users
            .find_by_username(&credentials.username)
            .await?
            .is_some()
        {
            return Err(AppError::BadRequest(USERNAME_TAKEN.into()));
        }

        let password_hash = hash_password(&credentials.password, self.bcrypt_cost)?;
        let user = self
            .users
            .create(User::new(
                credentials.username,
                password_hash,
                EndpointAccess::TASKS_OWNED,
            ))
            .await?;
        self.tasks.create_defaults(user.id).await?;
        info!("Registered user {} ({})", user.id, user.username);

        self.sign_in(user)
    }

    /// Checks the password and returns the user with a fresh token.
    pub async fn login(&self, credentials: Credentials) -> Result<User, AppError> {
        let user = self
            .users
            .find_by_username(&credentials.username)
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_LOGIN.into()))?;

        if !verify_password(&credentials.password, &user.password_hash)? {
            warn!("Failed login for {}", user.username);
            return Err(AppError::Unauthorized(INVALID_LOGIN.into()));
        }

        self.sign_in(user)
    }

    /// Revokes `token` until it would have expired anyway.
    pub fn logout(&self, token: &str) -> Result<(), AppError> {
        let claims = self.authorize(token, EndpointAccess::NONE)?;
        self.revoked.revoke(claims.jti, claims.expires_at());
        info!("User {} logged out", claims.sub);
        Ok(())
    }

    /// Validates `token` for a request needing `required` access.
    ///
    /// Fails with `Unauthorized` when the token does not verify, belongs to another
    /// session or has been revoked, and with `Forbidden` when it lacks `required`.
    pub fn authorize(&self, token: &str, required: EndpointAccess) -> Result<Claims, AppError> {
        let claims = self.issuer.verify(token)?;

        if claims.sid != self.issuer.session_id() {
            return Err(AppError::Unauthorized("Invalid identity session Id!".into()));
        }
        if self.revoked.contains(&claims.jti) {
            return Err(AppError::Unauthorized("Invalid identity token!".into()));
        }
        if !claims.access.contains(required) {
            return Err(AppError::Forbidden(format!(
                "Access {} required, token grants {}",
                required, claims.access
            )));
        }
        Ok(claims)
    }

    /// Makes sure an account with every access flag exists, creating `admin` if none
    /// does. A plain account already holding the admin's username is replaced.
    pub async fn ensure_admin(&self, admin: &AdminAccount) -> Result<User, AppError> {
        let all = EndpointAccess::all();
        if let Some(existing) = self.users.find_with_access(all).await?.into_iter().next() {
            return Ok(existing);
        }

        if let Some(stale) = self.users.find_by_username(&admin.username).await? {
            warn!("Replacing account {} with the administrator", stale.username);
            self.users.delete(stale.id).await?;
        }

        let password_hash = hash_password(&admin.password, self.bcrypt_cost)?;
        let user = self
            .users
            .create(User::new(admin.username.clone(), password_hash, all))
            .await?;
        info!("Created administrator account {}", user.username);
        Ok(user)
    }

    fn sign_in(&self, mut user: User) -> Result<User, AppError> {
        let (token, _) = self.issuer.issue(&user)?;
        user.token = Some(token);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio::runtime::Handle;

    fn service() -> AuthService {
        AuthService::new(
            &Storage::memory(),
            TokenIssuer::new("secret", "tasklist", "tasklist", Duration::minutes(15)),
            RevokedTokens::start(Handle::current()),
            4,
        )
    }

    #[tokio::test]
    async fn test_register_signs_in_and_seeds_tasks() {
        let service = service();
        let user = service
            .register(Credentials::new("alice", "Passw0rd!"))
            .await
            .unwrap();

        let token = user.token.clone().unwrap();
        let claims = service.authorize(&token, EndpointAccess::TASKS_OWNED).unwrap();
        assert_eq!(claims.uid, user.id);
        assert_eq!(service.tasks.get_all_owned(user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_register_rejects_taken_username() {
        let service = service();
        service
            .register(Credentials::new("alice", "Passw0rd!"))
            .await
            .unwrap();

        let again = service.register(Credentials::new("ALICE", "Passw0rd!")).await;
        assert_eq!(again, Err(AppError::BadRequest(USERNAME_TAKEN.into())));
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let service = service();
        service
            .register(Credentials::new("alice", "Passw0rd!"))
            .await
            .unwrap();

        let result = service.login(Credentials::new("alice", "Wr0ng!pass")).await;
        assert_eq!(result, Err(AppError::Unauthorized(INVALID_LOGIN.into())));

        let unknown = service.login(Credentials::new("bob", "Passw0rd!")).await;
        assert_eq!(unknown, Err(AppError::Unauthorized(INVALID_LOGIN.into())));
    }

    #[tokio::test]
    async fn test_access_is_enforced() {
        let service = service();
        let user = service
            .register(Credentials::new("alice", "Passw0rd!"))
            .await
            .unwrap();
        let token = user.token.unwrap();

        assert!(matches!(
            service.authorize(&token, EndpointAccess::TASKS_ALL),
            Err(AppError::Forbidden(_))
        ));
    }
}
