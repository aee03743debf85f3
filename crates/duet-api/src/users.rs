use axum::{Extension, Json, body::Bytes, extract::State, response::IntoResponse};
use tracing::warn;

use duet_types::api::UpdateProfileRequest;

use crate::auth::{AppState, validate_full_name};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;

/// Largest accepted avatar upload.
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub async fn me(Extension(auth): Extension<AuthUser>) -> impl IntoResponse {
    Json(auth.profile)
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let full_name = req.full_name.map(|n| n.trim().to_string());
    if let Some(name) = &full_name {
        validate_full_name(name)?;
    }

    let user = tokio::task::spawn_blocking(move || {
        state.db
            .update_profile(auth.id, full_name.as_deref(), req.bio.as_deref(), req.status)
    })
    .await??;

    Ok(Json(user))
}

/// Replace the caller's profile picture with the raw request body.
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if body.is_empty() {
        return Err(ApiError::invalid("Profile picture is required"));
    }

    let url = state
        .avatars
        .upload(&body)
        .await
        .map_err(|e| ApiError::storage(format!("avatar upload failed: {e}")))?;

    let task_state = state.clone();
    let new_url = url.clone();
    let previous = tokio::task::spawn_blocking(move || task_state.db.set_profile_pic(auth.id, &new_url)).await?;

    let previous = match previous {
        Ok(previous) => previous,
        Err(e) => {
            // Don't leave an unreferenced upload behind.
            if let Err(cleanup) = state.avatars.delete(&url).await {
                warn!("failed to remove orphaned avatar {}: {}", url, cleanup);
            }
            return Err(e.into());
        }
    };

    if !previous.is_empty() {
        if let Err(e) = state.avatars.delete(&previous).await {
            warn!("failed to delete previous avatar {}: {}", previous, e);
        }
    }

    let mut profile = auth.profile;
    profile.profile_pic = url;
    Ok(Json(serde_json::json!({
        "message": "Profile picture updated successfully",
        "updated_user": profile,
    })))
}
