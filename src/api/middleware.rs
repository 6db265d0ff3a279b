/// Per-request identity resolution
///
/// Reconciles the server-side session cookie with the device fingerprint in
/// a fixed precedence order, resolved exactly once per request: a valid
/// session wins; otherwise an active device session matching the request's
/// fingerprint+IP restores the identity silently (the device-bound resume
/// path); otherwise the request proceeds anonymously and protected
/// extractors reject it downstream.
use crate::{context::AppContext, error::GateError, fingerprint, metrics};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::net::SocketAddr;

/// Name of the HTTP-only session cookie
pub const SESSION_COOKIE: &str = "linkgate_sid";

/// Where the request's identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Server-side session referenced by the cookie
    Session,
    /// Active device session matched by fingerprint+IP
    DeviceFingerprint,
    /// No identity established
    None,
}

/// Identity resolved for the current request. The fingerprint is recomputed
/// from headers every request and never stored client-side; rotating
/// user-agent or IP silently invalidates device-based resume.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user_id: Option<i64>,
    pub token_id: Option<i64>,
    pub source: AuthSource,
    pub ip: String,
    pub fingerprint: String,
    pub user_agent: String,
    /// Session id backing this identity, when one exists
    pub sid: Option<String>,
}

impl RequestIdentity {
    fn anonymous(ip: String, fingerprint: String, user_agent: String) -> Self {
        Self {
            user_id: None,
            token_id: None,
            source: AuthSource::None,
            ip,
            fingerprint,
            user_agent,
            sid: None,
        }
    }
}

/// Derive the client IP: forwarded headers first, then the socket peer
pub fn client_ip(headers: &HeaderMap, req_extensions: &axum::http::Extensions) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    req_extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Recompute the request's device fingerprint from its headers
pub fn request_fingerprint(headers: &HeaderMap, ip: &str) -> (String, String) {
    let user_agent = headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string();
    let accept_language = headers.get("accept-language").and_then(|h| h.to_str().ok());

    let fp = fingerprint::derive(&user_agent, ip, accept_language);
    (fp, user_agent)
}

/// Resolve request identity and stash it in the request extensions.
///
/// When the silent-resume path fires, a fresh server-side session is minted
/// and its cookie attached to the response.
pub async fn authenticate(
    State(ctx): State<AppContext>,
    mut jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, GateError> {
    let headers = req.headers().clone();
    let ip = client_ip(&headers, req.extensions());
    let (fp, user_agent) = request_fingerprint(&headers, &ip);

    let mut identity = RequestIdentity::anonymous(ip.clone(), fp.clone(), user_agent);

    // 1. Valid server-side session wins
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let sid = cookie.value().to_string();
        if let Some(session) = ctx.sessions.get(&sid).await? {
            identity.sid = Some(sid);
            identity.user_id = session.user_id;
            identity.token_id = session.token_id;
            if session.user_id.is_some() {
                identity.source = AuthSource::Session;
            }
        }
    }

    // 2. Silent resume: an active device session matching fingerprint+IP.
    // A valid but identity-less cookie session is reused rather than
    // replaced; otherwise a fresh session is minted and its cookie set.
    if identity.source == AuthSource::None {
        if let Some(device) = ctx.devices.get_by_fingerprint(&fp, &ip, true).await? {
            let sid = match identity.sid.take() {
                Some(sid) => {
                    ctx.sessions
                        .update_identity(&sid, Some(device.user_id), device.token_id)
                        .await?;
                    sid
                }
                None => {
                    let session = ctx
                        .sessions
                        .create(
                            Some(device.user_id),
                            device.token_id,
                            ctx.config.access.session_ttl_hours,
                        )
                        .await?;
                    jar = jar.add(session_cookie(session.sid.clone()));
                    session.sid
                }
            };
            ctx.devices.update_last_access(device.id).await?;
            metrics::DEVICE_RESUMES_TOTAL.inc();
            tracing::debug!(
                "Restored user {} from device session {}",
                device.user_id,
                device.id
            );

            identity.user_id = Some(device.user_id);
            identity.token_id = device.token_id;
            identity.source = AuthSource::DeviceFingerprint;
            identity.sid = Some(sid);
        }
    }

    req.extensions_mut().insert(identity);

    let response = next.run(req).await;
    Ok((jar, response).into_response())
}

/// Build the HTTP-only session cookie
pub fn session_cookie(sid: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, sid))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{
            AccessConfig, AdminConfig, LoggingConfig, ServerConfig, ServiceConfig, StorageConfig,
        },
        mailer::LogMailer,
        server::build_router,
        store::NewUser,
    };
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8787,
                public_url: "http://localhost:8787".to_string(),
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: "./data".into(),
                database: "./data/linkgate.sqlite".into(),
            },
            access: AccessConfig {
                default_country_code: "91".to_string(),
                issuance_limit: 5,
                issuance_window_secs: 900,
                session_ttl_hours: 720,
            },
            email: None,
            admin: AdminConfig {
                primary_email: None,
                primary_phone: None,
                primary_name: "Administrator".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Context with one completed user bound to 1.1.1.1 / UA1
    async fn bound_context() -> (AppContext, i64, String) {
        let ctx = AppContext::in_memory(test_config(), Arc::new(LogMailer));
        let user = ctx
            .users
            .create(NewUser {
                name: "Alice".to_string(),
                whatsapp_number: "919876543210".to_string(),
                email: Some("alice@example.com".to_string()),
                city: Some("Pune".to_string()),
                is_admin: false,
                is_primary_admin: false,
                profile_completed: true,
            })
            .await
            .unwrap();
        let token = ctx
            .tokens
            .create("alice@example.com", Some(user.id))
            .await
            .unwrap();
        let fp = fingerprint::derive("UA1", "1.1.1.1", None);
        ctx.devices
            .create(user.id, Some(token.id), "1.1.1.1", &fp, "UA1")
            .await
            .unwrap();
        (ctx, user.id, fp)
    }

    fn me_request(cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/auth/me")
            .header("user-agent", "UA1")
            .header("x-forwarded-for", "1.1.1.1");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_request_is_unauthorized() {
        let ctx = AppContext::in_memory(test_config(), Arc::new(LogMailer));
        let response = build_router(ctx)
            .oneshot(me_request(None))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_silent_resume_mints_session_and_cookie() {
        let (ctx, _user_id, _fp) = bound_context().await;

        let response = build_router(ctx)
            .oneshot(me_request(None))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let set_cookie = response
            .headers()
            .get("set-cookie")
            .and_then(|h| h.to_str().ok())
            .unwrap();
        assert!(set_cookie.starts_with(SESSION_COOKIE));
    }

    #[tokio::test]
    async fn test_resume_restores_identity_into_presented_session() {
        let (ctx, user_id, _fp) = bound_context().await;

        // Valid session that carries no identity yet
        let session = ctx
            .sessions
            .create(None, None, ctx.config.access.session_ttl_hours)
            .await
            .unwrap();

        let cookie = format!("{}={}", SESSION_COOKIE, session.sid);
        let response = build_router(ctx.clone())
            .oneshot(me_request(Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        // The presented session was updated in place, not replaced
        assert!(response.headers().get("set-cookie").is_none());
        let updated = ctx.sessions.get(&session.sid).await.unwrap().unwrap();
        assert_eq!(updated.user_id, Some(user_id));
        assert!(updated.token_id.is_some());
    }

    #[tokio::test]
    async fn test_resume_requires_matching_ip() {
        let (ctx, _user_id, _fp) = bound_context().await;

        let request = Request::builder()
            .uri("/auth/me")
            .header("user-agent", "UA1")
            .header("x-forwarded-for", "2.2.2.2")
            .body(Body::empty())
            .unwrap();
        let response = build_router(ctx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
