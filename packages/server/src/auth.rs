use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token expiry out of range")]
    ExpiryOutOfRange,
}

/// JWT Claims structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Username
    pub uid: i64,    // User ID
    pub exp: usize,  // Expiration timestamp
}

/// Resolves a bearer token to the user it was issued for.
pub trait Authenticator: Send + Sync {
    fn user_id(&self, token: &str) -> Result<i64, AuthError>;
}

/// HMAC-signed JWTs sharing one secret with the issuing service.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a new JWT token for a user.
    pub fn sign(&self, user_id: i64, username: &str, ttl: Duration) -> Result<String, AuthError> {
        let expiration = Utc::now()
            .checked_add_signed(ttl)
            .ok_or(AuthError::ExpiryOutOfRange)?
            .timestamp();

        let claims = Claims {
            sub: username.to_owned(),
            uid: user_id,
            exp: expiration as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify and decode a JWT token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

impl Authenticator for JwtAuthenticator {
    fn user_id(&self, token: &str) -> Result<i64, AuthError> {
        self.verify(token).map(|claims| claims.uid)
    }
}
