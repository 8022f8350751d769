use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Claims, User};
use crate::store::UserStore;

/// Resolves an opaque credential to the user it belongs to
#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<User>;
}

/// JWT Authentication Service
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            expiry_seconds: config.jwt_expiry_seconds,
        }
    }

    /// Generate an access token for a username
    pub fn generate_token(&self, username: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let exp = now + self.expiry_seconds as i64;

        let claims = Claims {
            sub: username.to_string(),
            iat: now,
            exp,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a JWT token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    pub fn expiry_seconds(&self) -> u64 {
        self.expiry_seconds
    }
}

/// Token → claims → registered user
#[derive(Clone)]
pub struct JwtAuthResolver {
    auth: Arc<AuthService>,
    users: Arc<dyn UserStore>,
}

impl JwtAuthResolver {
    pub fn new(auth: Arc<AuthService>, users: Arc<dyn UserStore>) -> Self {
        Self { auth, users }
    }
}

#[async_trait]
impl AuthResolver for JwtAuthResolver {
    async fn resolve(&self, credential: &str) -> Result<User> {
        let claims = self.auth.validate_token(credential)?;

        self.users
            .get_user_by_username(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))
    }
}
