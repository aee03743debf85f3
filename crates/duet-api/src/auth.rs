use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use duet_db::Database;
use duet_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest};
use duet_types::models::User;

use crate::avatars::AvatarStore;
use crate::error::{ApiError, ApiResult};

/// Session lifetime, for both the token `exp` and the cookie Max-Age.
pub const SESSION_DAYS: i64 = 7;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub auth: AuthConfig,
    pub avatars: Arc<dyn AvatarStore>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_name: String,
    /// Mark the session cookie `Secure` (production only).
    pub secure_cookies: bool,
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    validate_full_name(&full_name)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    let task_state = state.clone();
    let user = tokio::task::spawn_blocking(move || -> ApiResult<User> {
        if task_state.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("email"));
        }
        let password_hash = hash_password(&req.password)?;
        Ok(task_state.db.create_user(&full_name, &email, &password_hash)?)
    })
    .await??;

    let token = create_token(&state.auth.jwt_secret, user.id)?;
    info!(user_id = %user.id, "user signed up");

    Ok((
        jar.add(session_cookie(&state.auth, token)),
        (StatusCode::CREATED, Json(AuthResponse::from(user))),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    validate_email(&email)?;

    let task_state = state.clone();
    let user = tokio::task::spawn_blocking(move || {
        let record = task_state.db.get_user_by_email(&email)?.ok_or(ApiError::Unauthorized)?;
        verify_password(&req.password, &record.password_hash)?;
        Ok::<_, ApiError>(record.user)
    })
    .await??;

    let token = create_token(&state.auth.jwt_secret, user.id)?;

    Ok((
        jar.add(session_cookie(&state.auth, token)),
        Json(AuthResponse::from(user)),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let cleared = Cookie::build((state.auth.token_name.clone(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.auth.secure_cookies)
        .max_age(time::Duration::ZERO)
        .build();

    (
        jar.add(cleared),
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    )
}

fn session_cookie(auth: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((auth.token_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(auth.secure_cookies)
        .max_age(time::Duration::days(SESSION_DAYS))
        .build()
}

pub fn create_token(secret: &str, user_id: Uuid) -> ApiResult<String> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::storage(format!("token signing failed: {e}")))
}

// -- Credentials --

pub fn hash_password(plaintext: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::storage(format!("password hashing failed: {e}")))
}

/// Wrong password and unknown account look the same to the caller.
pub fn verify_password(plaintext: &str, digest: &str) -> ApiResult<()> {
    let parsed = PasswordHash::new(digest).map_err(|e| {
        error!("stored password hash is unparseable: {}", e);
        ApiError::Unauthorized
    })?;
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .map_err(|_| ApiError::Unauthorized)
}

// -- Validation --

pub(crate) fn validate_full_name(name: &str) -> ApiResult<()> {
    if name.chars().count() < 3 {
        return Err(ApiError::invalid("Full name must be at least 3 characters long"));
    }
    Ok(())
}

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::invalid("Email must be a valid email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < 6 {
        return Err(ApiError::invalid("Password must be at least 6 characters long"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::invalid("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::invalid("Password must contain at least one number"));
    }
    if !password.chars().any(|c| "@$!%*?&".contains(c)) {
        return Err(ApiError::invalid("Password must contain at least one special character"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn password_hash_verifies() {
        let digest = hash_password("Secr3t!pw").unwrap();
        assert!(verify_password("Secr3t!pw", &digest).is_ok());
        assert!(matches!(verify_password("wrong", &digest), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn token_expires_in_seven_days() {
        let id = Uuid::now_v7();
        let token = create_token("test-secret", id).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, id);
        assert_eq!(data.claims.exp - data.claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("Ab1!xy").is_ok());
        assert!(validate_password("Ab1!").is_err());
        assert!(validate_password("ab1!xyz").is_err());
        assert!(validate_password("Abc!xyz").is_err());
        assert!(validate_password("Abc1xyz").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a da@example.com").is_err());
        assert!(validate_email("ada@@example.com").is_err());
    }
}
