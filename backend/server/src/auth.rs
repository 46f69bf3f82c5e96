//! # Identity & Session
//!
//! Email/password credentials and bearer-token sessions.
//!
//! ## Collections
//! - `credentials/{uid}`: email, salted SHA-256 password hash, verification state
//! - `sessions/{token}`: uid the token was issued to
//!
//! ## Throttling
//! Five failed sign-ins within a minute lock the credential until the window
//! passes. A successful sign-in clears the counter.
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
};
use bank::store::{Database, FieldUpdate, StoreError, new_id};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore, thread_rng};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{error::AppError, state::State, utils::is_valid_email};

pub const CREDENTIALS: &str = "credentials";
pub const SESSIONS: &str = "sessions";

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_FAILED_ATTEMPTS: u32 = 5;
const FAILED_ATTEMPT_WINDOW_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("This email is already registered.")]
    EmailAlreadyInUse,
    #[error("Invalid email address.")]
    InvalidEmail,
    #[error("Password is too weak.")]
    WeakPassword,
    #[error("No account found with this email.")]
    UserNotFound,
    #[error("Incorrect password.")]
    WrongPassword,
    #[error("Too many attempts. Please try again later.")]
    TooManyRequests,
    #[error("This account has been disabled.")]
    UserDisabled,
    #[error("Invalid verification code.")]
    InvalidVerificationCode,
    #[error("Failed to register. Try again.")]
    SignUpFailed,
    #[error("Failed to log in. Try again.")]
    SignInFailed,
}

impl AuthError {
    /// Stable identifier sent alongside the message in the `x-auth-code`
    /// header, so clients can branch without matching on text.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthError::InvalidEmail => "auth/invalid-email",
            AuthError::WeakPassword => "auth/weak-password",
            AuthError::UserNotFound => "auth/user-not-found",
            AuthError::WrongPassword => "auth/wrong-password",
            AuthError::TooManyRequests => "auth/too-many-requests",
            AuthError::UserDisabled => "auth/user-disabled",
            AuthError::InvalidVerificationCode => "auth/invalid-verification-code",
            AuthError::SignUpFailed | AuthError::SignInFailed => "auth/internal-error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailAlreadyInUse => StatusCode::CONFLICT,
            AuthError::InvalidEmail
            | AuthError::WeakPassword
            | AuthError::InvalidVerificationCode => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::WrongPassword => StatusCode::UNAUTHORIZED,
            AuthError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AuthError::UserDisabled => StatusCode::FORBIDDEN,
            AuthError::SignUpFailed | AuthError::SignInFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credential {
    email: String,
    password_hash: String,
    salt: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    verification_code: Option<String>,
    #[serde(default)]
    failed_attempts: u32,
    #[serde(default)]
    last_failed_at: Option<DateTime<Utc>>,
}

impl Credential {
    fn throttled(&self, now: DateTime<Utc>) -> bool {
        self.failed_attempts >= MAX_FAILED_ATTEMPTS
            && self
                .last_failed_at
                .is_some_and(|at| now - at < Duration::seconds(FAILED_ATTEMPT_WINDOW_SECS))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    uid: String,
    created_at: DateTime<Utc>,
}

/// The signed-in user as routes see it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
}

/// A freshly issued session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub uid: String,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn new_salt() -> String {
    let mut salt = [0u8; 16];
    thread_rng().fill_bytes(&mut salt);
    hex::encode(salt)
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AuthService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn find_credential(&self, email: &str) -> Result<Option<(String, Credential)>, StoreError> {
        let mut found = self
            .db
            .find::<Credential>(CREDENTIALS, "email", &json!(email))
            .await?;

        Ok(found.pop())
    }

    pub async fn email_in_use(&self, email: &str) -> Result<bool, AuthError> {
        self.find_credential(&normalize(email))
            .await
            .map(|found| found.is_some())
            .map_err(|e| {
                error!("Credential lookup failed: {e}");
                AuthError::SignUpFailed
            })
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SessionToken, AuthError> {
        let email = normalize(email);

        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }
        if self.email_in_use(&email).await? {
            return Err(AuthError::EmailAlreadyInUse);
        }

        let salt = new_salt();
        let credential = Credential {
            email: email.clone(),
            password_hash: hash_password(&salt, password),
            salt,
            email_verified: false,
            disabled: false,
            verification_code: None,
            failed_attempts: 0,
            last_failed_at: None,
        };

        let uid = new_id();
        let internal = |e: StoreError| {
            error!("Sign up for {email} failed: {e}");
            AuthError::SignUpFailed
        };

        self.db.set(CREDENTIALS, &uid, &credential).await.map_err(internal)?;
        let token = self.create_session(&uid).await.map_err(internal)?;

        info!("Registered {email}");
        Ok(SessionToken { uid, token })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionToken, AuthError> {
        let email = normalize(email);
        let internal = |e: StoreError| {
            error!("Sign in for {email} failed: {e}");
            AuthError::SignInFailed
        };

        let (uid, credential) = self
            .find_credential(&email)
            .await
            .map_err(internal)?
            .ok_or(AuthError::UserNotFound)?;

        if credential.disabled {
            return Err(AuthError::UserDisabled);
        }

        let now = Utc::now();
        if credential.throttled(now) {
            warn!("Sign in throttled for {email}");
            return Err(AuthError::TooManyRequests);
        }

        let computed = hash_password(&credential.salt, password);
        let matches: bool = computed
            .as_bytes()
            .ct_eq(credential.password_hash.as_bytes())
            .into();

        if !matches {
            // A stale window starts over at one.
            let expired = credential
                .last_failed_at
                .is_none_or(|at| now - at >= Duration::seconds(FAILED_ATTEMPT_WINDOW_SECS));
            let attempt = if expired {
                FieldUpdate::set("failedAttempts", json!(1))
            } else {
                FieldUpdate::increment("failedAttempts", 1)
            };

            self.db
                .update(
                    CREDENTIALS,
                    &uid,
                    &[attempt, FieldUpdate::set("lastFailedAt", json!(now))],
                )
                .await
                .map_err(internal)?;

            return Err(AuthError::WrongPassword);
        }

        if credential.failed_attempts > 0 {
            self.db
                .update(
                    CREDENTIALS,
                    &uid,
                    &[
                        FieldUpdate::set("failedAttempts", json!(0)),
                        FieldUpdate::set("lastFailedAt", Value::Null),
                    ],
                )
                .await
                .map_err(internal)?;
        }

        let token = self.create_session(&uid).await.map_err(internal)?;

        info!("Signed in {email}");
        Ok(SessionToken { uid, token })
    }

    async fn create_session(&self, uid: &str) -> Result<String, StoreError> {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            uid: uid.to_string(),
            created_at: Utc::now(),
        };

        self.db.set(SESSIONS, &token, &session).await?;
        Ok(token)
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), StoreError> {
        self.db.delete(SESSIONS, token).await?;
        Ok(())
    }

    pub async fn current_user(&self, token: &str) -> Result<Option<CurrentUser>, StoreError> {
        let Some(session) = self.db.get::<Session>(SESSIONS, token).await? else {
            return Ok(None);
        };
        let Some(credential) = self.db.get::<Credential>(CREDENTIALS, &session.uid).await? else {
            return Ok(None);
        };

        Ok(Some(CurrentUser {
            uid: session.uid,
            email: credential.email,
            email_verified: credential.email_verified,
        }))
    }

    pub async fn send_email_verification(&self, uid: &str) -> Result<(), AppError> {
        let credential = self
            .db
            .get::<Credential>(CREDENTIALS, uid)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let code = format!("{:06}", thread_rng().gen_range(0..1_000_000));
        self.db
            .update(
                CREDENTIALS,
                uid,
                &[FieldUpdate::set("verificationCode", json!(code))],
            )
            .await?;

        info!("Sent verification email to {}", credential.email);
        debug!("Verification code for {}: {code}", credential.email);
        Ok(())
    }

    pub async fn verify_email(&self, uid: &str, code: &str) -> Result<(), AppError> {
        let credential = self
            .db
            .get::<Credential>(CREDENTIALS, uid)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let matches = credential
            .verification_code
            .as_deref()
            .is_some_and(|expected| bool::from(expected.as_bytes().ct_eq(code.trim().as_bytes())));
        if !matches {
            return Err(AuthError::InvalidVerificationCode.into());
        }

        self.db
            .update(
                CREDENTIALS,
                uid,
                &[
                    FieldUpdate::set("emailVerified", json!(true)),
                    FieldUpdate::set("verificationCode", Value::Null),
                ],
            )
            .await?;

        info!("Verified {}", credential.email);
        Ok(())
    }

    #[cfg(test)]
    async fn verification_code(&self, uid: &str) -> Option<String> {
        self.db
            .get::<Credential>(CREDENTIALS, uid)
            .await
            .ok()
            .flatten()
            .and_then(|credential| credential.verification_code)
    }
}

/// Session extractor. Reads `Authorization: Bearer <token>`.
#[derive(Clone, Debug)]
pub struct SignedIn {
    pub user: CurrentUser,
    pub token: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequestParts<Arc<State>> for SignedIn {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<State>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthenticated)?.to_string();

        let user = state
            .auth
            .current_user(&token)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(SignedIn { user, token })
    }
}
