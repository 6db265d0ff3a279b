/// Access-token lifecycle services
///
/// Issuance mails out one-time links, redemption runs the UNBOUND -> BOUND
/// state machine, and profile completion promotes an anonymous token-bound
/// visitor into a full user record.

pub mod issuance;
pub mod profile;
pub mod redemption;


use crate::{
    config::ServerConfig,
    db::models::User,
    mailer::AccessMailer,
    rate_limit::IssuanceLimiter,
    store::{DeviceSessionStore, TokenStore, UserStore},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Orchestrates the stores, mailer and limiter for the access flows
#[derive(Clone)]
pub struct AccessService {
    pub config: Arc<ServerConfig>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub devices: Arc<dyn DeviceSessionStore>,
    pub mailer: Arc<dyn AccessMailer>,
    pub limiter: IssuanceLimiter,
}

impl AccessService {
    pub fn new(
        config: Arc<ServerConfig>,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        devices: Arc<dyn DeviceSessionStore>,
        mailer: Arc<dyn AccessMailer>,
        limiter: IssuanceLimiter,
    ) -> Self {
        Self {
            config,
            users,
            tokens,
            devices,
            mailer,
            limiter,
        }
    }

    /// Absolute URL a recipient opens to redeem a token
    pub fn access_url(&self, token: &str) -> String {
        format!(
            "{}/auth/validate-token?token={}",
            self.config.service.public_url, token
        )
    }
}

/// Result of a token redemption attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidationResult {
    pub success: bool,
    pub requires_profile_completion: bool,
    pub email: String,
    pub token_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Input for the profile completion step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub name: String,
    pub phone: String,
    pub city: String,
    pub email: String,
    pub token_id: i64,
}
