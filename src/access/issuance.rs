/// Token issuance: mint a token for an email and deliver the access link
use super::AccessService;
use crate::{
    db::models::AccessToken,
    error::{GateError, GateResult},
    metrics, validation,
};

impl AccessService {
    /// Handle a request-access call: validate, rate limit per IP, mint a
    /// token and mail the link. Email delivery failure is a hard failure;
    /// the caller must not show a success state when nothing was sent.
    pub async fn request_access(&self, email: &str, client_ip: &str) -> GateResult<AccessToken> {
        let email = email.trim().to_lowercase();
        validation::validate_email(&email)?;

        if let Err(e) = self.limiter.check_ip(client_ip) {
            metrics::RATE_LIMITED_TOTAL.inc();
            tracing::warn!("Rate limited issuance request from {}", client_ip);
            return Err(e);
        }

        // Link the token up front when the email already belongs to a user
        let existing_user = self.users.get_by_email(&email).await?;
        let user_id = existing_user.as_ref().map(|u| u.id);

        let token = self.tokens.create(&email, user_id).await?;
        let url = self.access_url(&token.token);

        self.mailer.send_access_link(&email, &url).await?;

        metrics::TOKENS_ISSUED_TOTAL.inc();
        tracing::info!("Issued access token {} for {}", token.id, email);

        Ok(token)
    }

    /// Re-send the access link for an existing token (admin operation)
    pub async fn resend_token(&self, token_id: i64) -> GateResult<AccessToken> {
        let token = self
            .tokens
            .get_by_id(token_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("Token {} not found", token_id)))?;

        let url = self.access_url(&token.token);
        self.mailer.send_access_link(&token.email, &url).await?;

        tracing::info!("Re-sent access token {} to {}", token.id, token.email);

        Ok(token)
    }
}
