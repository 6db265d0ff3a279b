/// Admin-only endpoints: token overview, link re-delivery, user management
use crate::{
    auth::AdminUser,
    context::AppContext,
    db::models::{TokenListEntry, User},
    error::{GateError, GateResult},
};
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/tokens", get(list_tokens))
        .route("/auth/tokens/:id/resend", post(resend_token))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", delete(delete_user))
        .route("/admin/users/:id/admin", post(set_admin))
}

#[derive(Debug, Serialize)]
pub struct TokenListResponse {
    pub tokens: Vec<TokenListEntry>,
}

/// All issued tokens, joined with their linked users
async fn list_tokens(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
) -> GateResult<Json<TokenListResponse>> {
    let tokens = ctx.tokens.list_all().await?;
    Ok(Json(TokenListResponse { tokens }))
}

#[derive(Debug, Serialize)]
pub struct ResendResponse {
    pub success: bool,
    pub message: String,
}

/// Re-send the access link for an existing token
async fn resend_token(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
    Path(token_id): Path<i64>,
) -> GateResult<Json<ResendResponse>> {
    let token = ctx.access.resend_token(token_id).await?;

    Ok(Json(ResendResponse {
        success: true,
        message: format!("Access link re-sent to {}", token.email),
    }))
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
}

async fn list_users(
    State(ctx): State<AppContext>,
    _admin: AdminUser,
) -> GateResult<Json<UserListResponse>> {
    let users = ctx.users.list_all().await?;
    Ok(Json(UserListResponse { users }))
}

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub success: bool,
}

/// Delete a user. The primary admin can never be deleted, and deleting any
/// admin record is reserved to the primary admin.
async fn delete_user(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
) -> GateResult<Json<DeleteUserResponse>> {
    let target = ctx
        .users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| GateError::NotFound(format!("User {} not found", user_id)))?;

    if target.is_primary_admin {
        return Err(GateError::Forbidden(
            "The primary admin cannot be deleted".to_string(),
        ));
    }

    if target.is_admin && !admin.user.is_primary_admin {
        return Err(GateError::Forbidden(
            "Only the primary admin can delete admin accounts".to_string(),
        ));
    }

    let deleted = ctx.users.delete(user_id).await?;
    if !deleted {
        return Err(GateError::Forbidden(
            "User could not be deleted".to_string(),
        ));
    }

    tracing::info!("Admin {} deleted user {}", admin.user.id, user_id);

    Ok(Json(DeleteUserResponse { success: true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct SetAdminResponse {
    pub success: bool,
}

/// Promote or demote a user. The primary admin cannot be demoted.
async fn set_admin(
    State(ctx): State<AppContext>,
    admin: AdminUser,
    Path(user_id): Path<i64>,
    Json(req): Json<SetAdminRequest>,
) -> GateResult<Json<SetAdminResponse>> {
    let target = ctx
        .users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| GateError::NotFound(format!("User {} not found", user_id)))?;

    if target.is_primary_admin {
        return Err(GateError::Forbidden(
            "The primary admin cannot be demoted".to_string(),
        ));
    }

    let updated = ctx.users.set_admin(user_id, req.is_admin).await?;
    if !updated {
        return Err(GateError::Forbidden(
            "User could not be updated".to_string(),
        ));
    }

    tracing::info!(
        "Admin {} set is_admin={} for user {}",
        admin.user.id,
        req.is_admin,
        user_id
    );

    Ok(Json(SetAdminResponse { success: true }))
}
