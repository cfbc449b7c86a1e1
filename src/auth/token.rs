use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EndpointAccess;
use crate::config::Config;
use crate::error::AppError;
use crate::models::User;

/// Represents the claims encoded within a JWT (JSON Web Token).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject of the token: the username.
    pub sub: String,
    /// The user's id.
    pub uid: i64,
    /// Session of the issuing process. Tokens from an earlier process run are rejected.
    pub sid: Uuid,
    /// Access flags granted at issue time.
    pub access: EndpointAccess,
    /// Unique token id, the key of the revocation list.
    pub jti: Uuid,
    pub iss: String,
    pub aud: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Signs and verifies HS256 session tokens.
///
/// Each issuer draws a fresh session id, so tokens only verify against the issuer
/// (and therefore the process) that produced them.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: Duration,
    session_id: Uuid,
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: &str, audience: &str, lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            lifetime,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            config.token_lifetime,
        )
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Generates a token for `user`, returning it with the claims it carries.
    ///
    /// Returns `AppError::InternalServerError` if token encoding fails.
    pub fn issue(&self, user: &User) -> Result<(String, Claims), AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.username.clone(),
            uid: user.id,
            sid: self.session_id,
            access: user.access,
            jti: Uuid::new_v4(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))?;
        Ok((token, claims))
    }

    /// Verifies a JWT string and decodes its claims.
    ///
    /// Checks the signature, expiry, issuer and audience. Returns `AppError::Unauthorized`
    /// if the token is malformed, its signature is invalid, or it has expired.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {:?}", e.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test_secret", "tasklist", "tasklist", Duration::minutes(15))
    }

    fn user() -> User {
        let mut user = User::new("alice", "hash".into(), EndpointAccess::TASKS_OWNED);
        user.id = 3;
        user
    }

    #[test]
    fn test_token_generation_and_verification() {
        let issuer = issuer();
        let (token, issued) = issuer.issue(&user()).unwrap();
        let claims = issuer.verify(&token).unwrap();

        assert_eq!(claims, issued);
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.uid, 3);
        assert_eq!(claims.sid, issuer.session_id());
        assert_eq!(claims.access, EndpointAccess::TASKS_OWNED);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_token_expiration() {
        let issuer = issuer();
        let (_, mut claims) = issuer.issue(&user()).unwrap();
        claims.exp = (Utc::now() - Duration::hours(2)).timestamp();
        let expired_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("test_secret".as_bytes()),
        )
        .unwrap();

        match issuer.verify(&expired_token) {
            Err(AppError::Unauthorized(msg)) => assert!(msg.contains("ExpiredSignature")),
            other => panic!("Token should have been invalid due to expiration: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_token_signature() {
        let (token, _) = issuer().issue(&user()).unwrap();
        let other = TokenIssuer::new("a_completely_different_secret", "tasklist", "tasklist", Duration::minutes(15));

        match other.verify(&token) {
            Err(AppError::Unauthorized(msg)) => assert!(msg.contains("InvalidSignature")),
            other => panic!("Token should have been invalid due to signature mismatch: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_audience_is_rejected() {
        let (token, _) = issuer().issue(&user()).unwrap();
        let other = TokenIssuer::new("test_secret", "tasklist", "someone-else", Duration::minutes(15));
        assert!(matches!(other.verify(&token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_expires_at_matches_exp() {
        let (_, claims) = issuer().issue(&user()).unwrap();
        assert_eq!(claims.expires_at().timestamp(), claims.exp);
    }
}
