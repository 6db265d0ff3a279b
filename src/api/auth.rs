/// Authentication endpoints
use crate::{
    access::{ProfileInput, TokenValidationResult},
    api::middleware::{session_cookie, RequestIdentity, SESSION_COOKIE},
    auth::AuthUser,
    context::AppContext,
    db::models::User,
    error::{GateError, GateResult},
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/request-access", post(request_access))
        .route("/auth/validate-token", get(validate_token))
        .route("/auth/complete-profile", post(complete_profile))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/auth/login-as-bound-device", post(login_as_bound_device))
}

#[derive(Debug, Deserialize)]
pub struct RequestAccessRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RequestAccessResponse {
    pub success: bool,
    pub message: String,
}

/// Issue an access token and email the link
async fn request_access(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<RequestIdentity>,
    Json(req): Json<RequestAccessRequest>,
) -> GateResult<Json<RequestAccessResponse>> {
    ctx.access.request_access(&req.email, &identity.ip).await?;

    Ok(Json(RequestAccessResponse {
        success: true,
        message: "Access link sent. Check your inbox.".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateTokenQuery {
    pub token: String,
}

/// Redeem an access token. A completed profile gets an authenticated
/// session immediately; otherwise the client is told to complete one.
async fn validate_token(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<RequestIdentity>,
    jar: CookieJar,
    Query(query): Query<ValidateTokenQuery>,
) -> GateResult<impl IntoResponse> {
    let result: TokenValidationResult = ctx
        .access
        .validate_token(
            &query.token,
            &identity.ip,
            &identity.fingerprint,
            &identity.user_agent,
        )
        .await?;

    // Establish the authenticated session up front for returning users so
    // their next request already carries it
    let jar = match &result.user {
        Some(user) if user.profile_completed => {
            let session = ctx
                .sessions
                .create(
                    Some(user.id),
                    Some(result.token_id),
                    ctx.config.access.session_ttl_hours,
                )
                .await?;
            jar.add(session_cookie(session.sid))
        }
        _ => jar,
    };

    Ok((jar, Json(result)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteProfileResponse {
    pub success: bool,
    pub user: User,
}

/// Promote a token-bound visitor into a full user record
async fn complete_profile(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<RequestIdentity>,
    jar: CookieJar,
    Json(input): Json<ProfileInput>,
) -> GateResult<impl IntoResponse> {
    let (user, _device) = ctx
        .access
        .complete_profile(&input, &identity.user_agent)
        .await?;

    // Session established synchronously so the client's immediate next
    // request is already authenticated
    let session = ctx
        .sessions
        .create(
            Some(user.id),
            Some(input.token_id),
            ctx.config.access.session_ttl_hours,
        )
        .await?;
    let jar = jar.add(session_cookie(session.sid));

    Ok((jar, Json(CompleteProfileResponse { success: true, user })))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
}

/// Current authenticated user
async fn me(auth: AuthUser) -> GateResult<Json<MeResponse>> {
    Ok(Json(MeResponse { user: auth.user }))
}

/// Short user summary returned by logout for the re-login affordance
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub success: bool,
    /// Owner of the deactivated binding, for "log back in as <name>"
    pub user: UserSummary,
}

/// Soft logout: the device session is deactivated, not deleted, so the same
/// device can resume later without a new token.
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthUser,
    jar: CookieJar,
) -> GateResult<impl IntoResponse> {
    let identity = &auth.identity;

    // Deactivate the device session backing this identity
    let device = match identity.token_id {
        Some(token_id) => {
            ctx.devices
                .get_by_user_and_token(auth.user.id, token_id)
                .await?
        }
        None => None,
    };
    let device = match device {
        Some(device) => Some(device),
        None => {
            ctx.devices
                .get_by_fingerprint(&identity.fingerprint, &identity.ip, true)
                .await?
        }
    };
    if let Some(device) = device {
        ctx.devices.deactivate(device.id).await?;
        tracing::info!("Deactivated device session {} on logout", device.id);
    }

    // Destroy the server-side session and its cookie
    if let Some(sid) = &identity.sid {
        ctx.sessions.delete(sid).await?;
    }
    let jar = jar.remove(Cookie::from(SESSION_COOKIE));

    Ok((
        jar,
        Json(LogoutResponse {
            success: true,
            user: UserSummary {
                id: auth.user.id,
                name: auth.user.name,
            },
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundLoginResponse {
    pub success: bool,
    pub user: User,
}

/// Re-establish an authenticated session for a previously bound device,
/// active or not, without a new token.
async fn login_as_bound_device(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<RequestIdentity>,
    jar: CookieJar,
) -> GateResult<impl IntoResponse> {
    let device = ctx
        .devices
        .get_by_fingerprint(&identity.fingerprint, &identity.ip, false)
        .await?
        .ok_or_else(|| {
            GateError::Unauthenticated("No device binding for this device".to_string())
        })?;

    ctx.devices.reactivate(device.id).await?;

    let user = ctx
        .users
        .get_by_id(device.user_id)
        .await?
        .ok_or_else(|| GateError::Unauthenticated("Unknown user".to_string()))?;

    let session = ctx
        .sessions
        .create(
            Some(user.id),
            device.token_id,
            ctx.config.access.session_ttl_hours,
        )
        .await?;
    let jar = jar.add(session_cookie(session.sid));

    tracing::info!("Reactivated device session {} for user {}", device.id, user.id);

    Ok((jar, Json(BoundLoginResponse { success: true, user })))
}
