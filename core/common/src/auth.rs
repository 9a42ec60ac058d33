// core/common/src/auth.rs
// JWT verification at the interface boundary. Token issuance lives in the
// identity service; here we only decode and extract the acting user.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ServiceError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Missing authorization header")]
    MissingAuth,
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,
    pub iat: usize,
}

#[derive(Clone)]
pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn create_token(&self, user_id: Uuid, ttl_hours: u64) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + (ttl_hours * 3600) as usize,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

/// Extractor for the authenticated user id from a Bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub Uuid);

impl FromRequest for AuthedUser {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_user(req))
    }
}

fn extract_user(req: &HttpRequest) -> Result<AuthedUser, ServiceError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::Unauthorized)?;
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or(ServiceError::Unauthorized)?;
    let manager = req
        .app_data::<web::Data<JwtManager>>()
        .ok_or_else(|| ServiceError::Internal("JWT manager not configured".to_string()))?;
    let claims = manager.verify_token(token)?;
    let user_id =
        Uuid::parse_str(&claims.sub).map_err(|_| ServiceError::Unauthorized)?;
    Ok(AuthedUser(user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let manager = JwtManager::new("test-secret".to_string());
        let user_id = Uuid::new_v4();
        let token = manager.create_token(user_id, 24).unwrap();
        let claims = manager.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = JwtManager::new("secret-a".to_string());
        let other = JwtManager::new("secret-b".to_string());
        let token = manager.create_token(Uuid::new_v4(), 24).unwrap();
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let manager = JwtManager::new("test-secret".to_string());
        assert!(manager.verify_token("not.a.token").is_err());
    }
}
