/// Token redemption protocol
///
/// Tokens move UNBOUND -> BOUND exactly once, on first redemption. A bound
/// token keeps working indefinitely from the device that bound it and is
/// rejected outright from any other IP. This trades single-use strictness
/// for usability: the recipient can reopen the emailed link, an interceptor
/// on a different network cannot.
use super::{AccessService, TokenValidationResult};
use crate::{
    db::models::AccessToken,
    error::{GateError, GateResult},
    metrics::{self, outcome},
};

impl AccessService {
    /// Validate an inbound token against the request's IP and fingerprint.
    ///
    /// First use binds the token and creates a device session; repeat use
    /// from the bound IP refreshes the session; any other IP gets a 403
    /// with no state change.
    pub async fn validate_token(
        &self,
        token_str: &str,
        request_ip: &str,
        request_fingerprint: &str,
        user_agent: &str,
    ) -> GateResult<TokenValidationResult> {
        let Some(token) = self.tokens.get_by_token(token_str).await? else {
            metrics::REDEMPTIONS_TOTAL
                .with_label_values(&[outcome::UNKNOWN])
                .inc();
            return Err(GateError::Unauthenticated(
                "Unknown access token".to_string(),
            ));
        };

        match &token.ip_address {
            Some(bound_ip) if bound_ip != request_ip => {
                metrics::REDEMPTIONS_TOTAL
                    .with_label_values(&[outcome::MISMATCH])
                    .inc();
                tracing::warn!(
                    "Token {} bound to {} redeemed from {}",
                    token.id,
                    bound_ip,
                    request_ip
                );
                Err(GateError::DeviceMismatch(
                    "This link is bound to a different device or location".to_string(),
                ))
            }
            Some(_) => {
                self.redeem_repeat(token, request_ip, request_fingerprint, user_agent)
                    .await
            }
            None => {
                self.redeem_first_use(token, request_ip, request_fingerprint, user_agent)
                    .await
            }
        }
    }

    /// First redemption: bind the token, link any matching user, create the
    /// device session.
    async fn redeem_first_use(
        &self,
        token: AccessToken,
        request_ip: &str,
        request_fingerprint: &str,
        user_agent: &str,
    ) -> GateResult<TokenValidationResult> {
        let bound = self
            .tokens
            .mark_used(token.id, request_ip, request_fingerprint)
            .await?;

        if !bound {
            // Lost the bind race to a concurrent redemption. Re-read the
            // token and apply the bound-token rules instead.
            let token = self
                .tokens
                .get_by_id(token.id)
                .await?
                .ok_or_else(|| GateError::NotFound("Token vanished during bind".to_string()))?;

            return match &token.ip_address {
                Some(bound_ip) if bound_ip == request_ip => {
                    self.redeem_repeat(token, request_ip, request_fingerprint, user_agent)
                        .await
                }
                _ => {
                    metrics::REDEMPTIONS_TOTAL
                        .with_label_values(&[outcome::MISMATCH])
                        .inc();
                    Err(GateError::DeviceMismatch(
                        "This link is bound to a different device or location".to_string(),
                    ))
                }
            };
        }

        // Link to an existing user when a record matches the target email
        let mut user = match token.user_id {
            Some(id) => self.users.get_by_id(id).await?,
            None => None,
        };
        if user.is_none() {
            if let Some(found) = self.users.get_by_email(&token.email).await? {
                self.tokens.link_to_user(token.id, found.id).await?;
                user = Some(found);
            }
        }

        // A linked user gets a device session for this binding right away
        if let Some(ref user) = user {
            self.devices
                .create(
                    user.id,
                    Some(token.id),
                    request_ip,
                    request_fingerprint,
                    user_agent,
                )
                .await?;
        }

        let requires_profile_completion =
            !user.as_ref().map(|u| u.profile_completed).unwrap_or(false);

        metrics::REDEMPTIONS_TOTAL
            .with_label_values(&[outcome::BOUND])
            .inc();
        tracing::info!("Token {} bound to {}", token.id, request_ip);

        Ok(TokenValidationResult {
            success: true,
            requires_profile_completion,
            email: token.email,
            token_id: token.id,
            user,
        })
    }

    /// Returning visit from the bound device: revive or refresh the device
    /// session and let a completed profile straight through.
    async fn redeem_repeat(
        &self,
        token: AccessToken,
        request_ip: &str,
        request_fingerprint: &str,
        user_agent: &str,
    ) -> GateResult<TokenValidationResult> {
        let user = match token.user_id {
            Some(id) => self.users.get_by_id(id).await?,
            None => None,
        };

        // The emailed link undoes a soft logout: a deactivated session for
        // this binding comes back active, an active one gets its last access
        // bumped, and a missing one is recreated for the linked user.
        match self
            .devices
            .get_by_fingerprint(request_fingerprint, request_ip, false)
            .await?
        {
            Some(session) if session.is_active => {
                self.devices.update_last_access(session.id).await?;
            }
            Some(session) => {
                self.devices.reactivate(session.id).await?;
                tracing::info!("Reactivated device session {} via access link", session.id);
            }
            None => {
                if let Some(ref user) = user {
                    self.devices
                        .create(
                            user.id,
                            Some(token.id),
                            request_ip,
                            request_fingerprint,
                            user_agent,
                        )
                        .await?;
                }
            }
        }

        let requires_profile_completion =
            !user.as_ref().map(|u| u.profile_completed).unwrap_or(false);

        metrics::REDEMPTIONS_TOTAL
            .with_label_values(&[outcome::RESUMED])
            .inc();

        Ok(TokenValidationResult {
            success: true,
            requires_profile_completion,
            email: token.email,
            token_id: token.id,
            user,
        })
    }
}
