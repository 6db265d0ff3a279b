/// Authentication extractors
///
/// Applied on top of the per-request identity resolution: once an identity
/// exists, the user is loaded, admins bypass all device checks, and
/// non-admin identities must carry a token and a matching device binding.
use crate::{
    api::middleware::{AuthSource, RequestIdentity},
    context::AppContext,
    db::models::User,
    error::GateError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context for protected routes
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub identity: RequestIdentity,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .ok_or_else(|| {
                GateError::Internal("Identity middleware not applied".to_string())
            })?;

        let Some(user_id) = identity.user_id else {
            return Err(GateError::Unauthenticated(
                "Token-based access required".to_string(),
            ));
        };

        let user = state
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| GateError::Unauthenticated("Unknown user".to_string()))?;

        // Admins are never locked to a device
        if user.is_admin {
            return Ok(AuthUser { user, identity });
        }

        // Non-admin identities must originate from a token
        if identity.token_id.is_none() {
            return Err(GateError::Unauthenticated(
                "Token-based access required".to_string(),
            ));
        }

        // Identity restored from a device session was already matched on
        // fingerprint+IP; a cookie-based identity still has to prove the
        // device binding.
        if identity.source == AuthSource::Session {
            let bound = state
                .devices
                .validate_access(user.id, &identity.ip, &identity.fingerprint)
                .await?;
            if !bound {
                tracing::warn!(
                    "Device mismatch for user {} from {}",
                    user.id,
                    identity.ip
                );
                return Err(GateError::DeviceMismatch(
                    "This account is bound to a different device".to_string(),
                ));
            }
        }

        Ok(AuthUser { user, identity })
    }
}

/// Admin authentication context - requires the admin flag
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user: User,
    pub identity: RequestIdentity,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminUser {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser { user, identity } =
            AuthUser::from_request_parts(parts, state).await?;

        if !user.is_admin {
            tracing::warn!("User {} attempted an admin-only route", user.id);
            return Err(GateError::Forbidden("Admin role required".to_string()));
        }

        Ok(AdminUser { user, identity })
    }
}

/// Optional authenticated context - does not fail if no identity resolved
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthUser {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(auth) => Ok(OptionalAuthUser(Some(auth))),
            Err(_) => Ok(OptionalAuthUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{
            AccessConfig, AdminConfig, LoggingConfig, ServerConfig, ServiceConfig, StorageConfig,
        },
        context::AppContext,
        mailer::LogMailer,
        store::NewUser,
    };
    use axum::http::Request;
    use std::sync::Arc;

    fn test_context() -> AppContext {
        let config = ServerConfig {
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
        };
        AppContext::in_memory(config, Arc::new(LogMailer))
    }

    fn parts_with_identity(identity: RequestIdentity) -> Parts {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        parts.extensions.insert(identity);
        parts
    }

    fn identity(user_id: Option<i64>, token_id: Option<i64>, source: AuthSource) -> RequestIdentity {
        RequestIdentity {
            user_id,
            token_id,
            source,
            ip: "1.1.1.1".to_string(),
            fingerprint: "fp1".to_string(),
            user_agent: "UA1".to_string(),
            sid: None,
        }
    }

    async fn make_user(ctx: &AppContext, is_admin: bool) -> i64 {
        ctx.users
            .create(NewUser {
                name: "Alice".to_string(),
                whatsapp_number: format!("91987654321{}", is_admin as u8),
                email: None,
                city: None,
                is_admin,
                is_primary_admin: false,
                profile_completed: true,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_anonymous_identity_is_rejected() {
        let ctx = test_context();
        let mut parts = parts_with_identity(identity(None, None, AuthSource::None));

        let err = AuthUser::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_admin_bypasses_device_checks() {
        let ctx = test_context();
        let admin_id = make_user(&ctx, true).await;

        // No token, no device binding: still authenticated
        let mut parts = parts_with_identity(identity(Some(admin_id), None, AuthSource::Session));
        let auth = AuthUser::from_request_parts(&mut parts, &ctx).await.unwrap();
        assert!(auth.user.is_admin);

        let mut parts = parts_with_identity(identity(Some(admin_id), None, AuthSource::Session));
        assert!(AdminUser::from_request_parts(&mut parts, &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_admin_needs_token_and_binding() {
        let ctx = test_context();
        let user_id = make_user(&ctx, false).await;

        // No token at all
        let mut parts = parts_with_identity(identity(Some(user_id), None, AuthSource::Session));
        let err = AuthUser::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Unauthenticated(_)));

        // Token but no device binding for this ip/fingerprint
        let token = ctx.tokens.create("alice@example.com", Some(user_id)).await.unwrap();
        let mut parts =
            parts_with_identity(identity(Some(user_id), Some(token.id), AuthSource::Session));
        let err = AuthUser::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::DeviceMismatch(_)));

        // With the binding in place the same identity passes
        ctx.devices
            .create(user_id, Some(token.id), "1.1.1.1", "fp1", "UA1")
            .await
            .unwrap();
        let mut parts =
            parts_with_identity(identity(Some(user_id), Some(token.id), AuthSource::Session));
        assert!(AuthUser::from_request_parts(&mut parts, &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_extractor_rejects_regular_user() {
        let ctx = test_context();
        let user_id = make_user(&ctx, false).await;
        let token = ctx.tokens.create("alice@example.com", Some(user_id)).await.unwrap();
        ctx.devices
            .create(user_id, Some(token.id), "1.1.1.1", "fp1", "UA1")
            .await
            .unwrap();

        let mut parts =
            parts_with_identity(identity(Some(user_id), Some(token.id), AuthSource::Session));
        let err = AdminUser::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_device_restored_identity_skips_recheck() {
        let ctx = test_context();
        let user_id = make_user(&ctx, false).await;
        let token = ctx.tokens.create("alice@example.com", Some(user_id)).await.unwrap();

        // An identity from the fingerprint-resume path was already matched
        // on fingerprint+IP by the middleware
        let mut parts = parts_with_identity(identity(
            Some(user_id),
            Some(token.id),
            AuthSource::DeviceFingerprint,
        ));
        assert!(AuthUser::from_request_parts(&mut parts, &ctx).await.is_ok());
    }
}
