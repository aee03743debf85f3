use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;
use uuid::Uuid;

use duet_types::api::Claims;
use duet_types::models::User;

use crate::auth::{AppState, AuthConfig};
use crate::error::{ApiError, ApiResult};

/// The caller's identity, established once per request by [`require_auth`]
/// and passed explicitly into every operation that needs it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub profile: User,
}

/// Resolve the session token from the cookie (or a Bearer header), verify
/// it, and attach an [`AuthUser`] to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = match jar.get(&state.auth.token_name) {
        Some(cookie) if !cookie.value().is_empty() => cookie.value().to_string(),
        _ => req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(ApiError::Unauthorized)?,
    };

    let user_id = verify_token(&state.auth, &token)?;

    let profile = tokio::task::spawn_blocking(move || state.db.get_user(user_id))
        .await??
        .ok_or(ApiError::NotFound("user"))?;

    req.extensions_mut().insert(AuthUser {
        id: user_id,
        profile,
    });
    Ok(next.run(req).await)
}

pub fn verify_token(auth: &AuthConfig, token: &str) -> ApiResult<Uuid> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("rejected session token: {}", e);
        ApiError::Unauthorized
    })?;
    Ok(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_token;

    fn config(secret: &str) -> AuthConfig {
        AuthConfig {
            jwt_secret: secret.into(),
            token_name: "jwt".into(),
            secure_cookies: false,
        }
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let id = Uuid::now_v7();
        let token = create_token("one-secret", id).unwrap();
        assert_eq!(verify_token(&config("one-secret"), &token).unwrap(), id);
        assert!(matches!(
            verify_token(&config("another-secret"), &token),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            verify_token(&config("one-secret"), "garbage"),
            Err(ApiError::Unauthorized)
        ));
    }
}
