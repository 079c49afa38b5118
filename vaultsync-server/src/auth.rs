//! Auth gate: accounts, session tokens and the bearer-token middleware.
//!
//! Tokens are `base64url(claims) "." base64url(HMAC-SHA256(secret, claims))`.
//! The identity a handler sees always comes from a verified token.

use crate::error::{ServerError, ServiceError};
use crate::storage::models::StoredUser;
use crate::storage::{users, ServerStorage};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Caller identity resolved from a token, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub device_id: Uuid,
}

/// Body of register and login.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
    pub master_hash: String,
    pub device_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    user_id: Uuid,
    device_id: Uuid,
    issued_at: i64,
    expires_at: i64,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Arc<[u8]>,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            secret: Arc::from(secret),
            ttl_secs,
        }
    }

    /// Issuer with a random key; its tokens die with the process.
    pub fn ephemeral(ttl_secs: i64) -> Self {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self::new(&secret, ttl_secs)
    }

    pub fn issue(&self, identity: Identity) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id: identity.user_id,
            device_id: identity.device_id,
            issued_at: now,
            expires_at: now + self.ttl_secs,
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let signature = self.mac(&payload)?.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Resolve a token to the identity it was issued for.
    pub fn verify(&self, token: &str) -> Result<Identity, ServerError> {
        let invalid = || ServerError::Unauthorized("Invalid token".to_string());

        let (payload_b64, signature_b64) = token.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| invalid())?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| invalid())?;

        self.mac(&payload)?
            .verify_slice(&signature)
            .map_err(|_| invalid())?;

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid())?;
        if claims.expires_at <= Utc::now().timestamp() {
            return Err(ServerError::Unauthorized("Token expired".to_string()));
        }

        Ok(Identity {
            user_id: claims.user_id,
            device_id: claims.device_id,
        })
    }

    fn mac(&self, payload: &[u8]) -> Result<HmacSha256, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        mac.update(payload);
        Ok(mac)
    }
}

/// Account creation and credential checks.
#[derive(Clone)]
pub struct AuthService {
    storage: ServerStorage,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(storage: ServerStorage, tokens: TokenIssuer) -> Self {
        Self { storage, tokens }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Register a new account. Fails with `ConflictSaveUser` if the login is taken.
    pub fn create_user(&self, req: &AuthRequest) -> Result<Identity, ServiceError> {
        validate_login(req)?;

        let user = StoredUser {
            id: Uuid::new_v4(),
            login: req.login.clone(),
            password_hash: hash_credential(&req.password)?,
            master_hash: hash_credential(&req.master_hash)?,
            created_at: Utc::now().timestamp(),
        };

        let conn = self.storage.conn()?;
        if !users::insert(&conn, &user)? {
            return Err(ServiceError::ConflictSaveUser);
        }

        tracing::info!("Registered user {}", user.id);
        Ok(Identity {
            user_id: user.id,
            device_id: req.device_id,
        })
    }

    /// Check both credentials. Any mismatch, or an unknown login, is `WrongAuthData`.
    pub fn authenticate(&self, req: &AuthRequest) -> Result<Identity, ServiceError> {
        validate_login(req)?;

        let user = {
            let conn = self.storage.conn()?;
            users::find_by_login(&conn, &req.login)?
        }
        .ok_or(ServiceError::WrongAuthData)?;

        let password_ok = verify_credential(&req.password, &user.password_hash)?;
        let master_ok = verify_credential(&req.master_hash, &user.master_hash)?;
        if !(password_ok && master_ok) {
            tracing::info!("Failed login for user {}", user.id);
            return Err(ServiceError::WrongAuthData);
        }

        Ok(Identity {
            user_id: user.id,
            device_id: req.device_id,
        })
    }

    pub fn issue_token(&self, identity: Identity) -> Result<String, ServiceError> {
        self.tokens.issue(identity)
    }
}

/// Structural checks on a register/login body.
pub fn validate_login(req: &AuthRequest) -> Result<(), ServiceError> {
    let login_len = req.login.chars().count();
    if !(3..=60).contains(&login_len) {
        return Err(ServiceError::Validation(
            "login must be 3 to 60 characters".to_string(),
        ));
    }
    if req.password.chars().count() < 3 {
        return Err(ServiceError::Validation(
            "password must be at least 3 characters".to_string(),
        ));
    }
    if req.master_hash.chars().count() < 3 {
        return Err(ServiceError::Validation(
            "master hash must be at least 3 characters".to_string(),
        ));
    }
    if req.device_id.is_nil() {
        return Err(ServiceError::Validation("device id is required".to_string()));
    }
    Ok(())
}

fn hash_credential(value: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(value.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Internal(format!("Hashing failed: {}", e)))
}

fn verify_credential(value: &str, phc: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| ServiceError::Internal(format!("Stored hash unreadable: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(value.as_bytes(), &parsed)
        .is_ok())
}

/// Auth middleware: resolves the bearer token into an [`Identity`].
pub async fn auth_middleware(
    State(tokens): State<TokenIssuer>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("Missing Authorization header".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServerError::Unauthorized("Invalid auth scheme".to_string()))?
        .trim()
        .to_string();

    let identity = tokens.verify(&token)?;
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
