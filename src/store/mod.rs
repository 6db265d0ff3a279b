/// Repository interfaces over the access-control records
///
/// All lifecycle transitions (binding a token, toggling a device session,
/// completing a profile) go through dedicated methods here; there is no
/// generic patch operation, so the data-model invariants cannot be bypassed
/// by an unrelated code path.
///
/// Two implementations exist: `sqlite` for production and `memory` (a
/// mutex-guarded map) for tests and small deployments.

pub mod memory;
pub mod sqlite;

use crate::db::models::{
    AccessToken, DeviceSession, HttpSession, OtpVerification, TokenListEntry, User,
};
use crate::error::GateResult;
use async_trait::async_trait;
use rand::RngCore;

/// Fields required to create a user record
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub whatsapp_number: String,
    pub email: Option<String>,
    pub city: Option<String>,
    pub is_admin: bool,
    pub is_primary_admin: bool,
    pub profile_completed: bool,
}

/// Generate an unguessable opaque token string (32 random bytes, hex)
pub fn generate_token_string() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a server-side session id
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a 6-digit OTP code
pub fn generate_otp_code() -> String {
    let n = rand::thread_rng().next_u32() % 1_000_000;
    format!("{:06}", n)
}

/// CRUD over access-token records
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Mint a fresh token for an email. Every call creates a new,
    /// independent token; existing tokens for the same email are untouched.
    async fn create(&self, email: &str, user_id: Option<i64>) -> GateResult<AccessToken>;

    async fn get_by_token(&self, token: &str) -> GateResult<Option<AccessToken>>;

    async fn get_by_id(&self, id: i64) -> GateResult<Option<AccessToken>>;

    /// Admin view, left-joined with user fields for display
    async fn list_all(&self) -> GateResult<Vec<TokenListEntry>>;

    async fn link_to_user(&self, token_id: i64, user_id: i64) -> GateResult<bool>;

    /// First-use binding: sets `is_used`, the bound IP and fingerprint, and
    /// the used-at timestamp. Conditional on the token still being unbound,
    /// so two racing redemptions cannot both win.
    async fn mark_used(&self, token_id: i64, ip: &str, fingerprint: &str) -> GateResult<bool>;
}

/// CRUD over device-session records
#[async_trait]
pub trait DeviceSessionStore: Send + Sync {
    async fn create(
        &self,
        user_id: i64,
        token_id: Option<i64>,
        ip: &str,
        fingerprint: &str,
        user_agent: &str,
    ) -> GateResult<DeviceSession>;

    /// Active session for a (user, token) pair, if any
    async fn get_by_user_and_token(
        &self,
        user_id: i64,
        token_id: i64,
    ) -> GateResult<Option<DeviceSession>>;

    /// Lookup by (fingerprint, ip); both must agree. With
    /// `active_only = false` this also finds deactivated sessions, which the
    /// logout/re-login flow depends on.
    async fn get_by_fingerprint(
        &self,
        fingerprint: &str,
        ip: &str,
        active_only: bool,
    ) -> GateResult<Option<DeviceSession>>;

    async fn update_last_access(&self, session_id: i64) -> GateResult<()>;

    /// Soft deactivate; the binding survives for later reactivation
    async fn deactivate(&self, session_id: i64) -> GateResult<bool>;

    async fn reactivate(&self, session_id: i64) -> GateResult<bool>;

    /// True iff an active session exists matching all three of user, IP and
    /// fingerprint
    async fn validate_access(&self, user_id: i64, ip: &str, fingerprint: &str)
        -> GateResult<bool>;
}

/// CRUD over user records
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new_user: NewUser) -> GateResult<User>;

    async fn get_by_id(&self, id: i64) -> GateResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> GateResult<Option<User>>;

    async fn get_by_phone(&self, whatsapp_number: &str) -> GateResult<Option<User>>;

    async fn list_all(&self) -> GateResult<Vec<User>>;

    /// Profile completion update; always sets `profile_completed = true`
    async fn update_profile(
        &self,
        user_id: i64,
        name: &str,
        whatsapp_number: &str,
        city: &str,
        email: &str,
    ) -> GateResult<bool>;

    /// Toggle the admin flag. Returns false for the primary admin: that
    /// record can never be demoted.
    async fn set_admin(&self, user_id: i64, is_admin: bool) -> GateResult<bool>;

    /// Delete a user. Returns false for the primary admin: that record can
    /// never be hard-deleted.
    async fn delete(&self, user_id: i64) -> GateResult<bool>;
}

/// Email OTP scaffolding. Present as an optional hardening layer; the
/// redemption flow trusts IP binding alone and does not gate on this.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Create a fresh code for an email with a 10-minute expiry
    async fn create(&self, email: &str) -> GateResult<OtpVerification>;

    /// Check a code. Attempts are capped at 3 per code; expired or
    /// over-attempted codes never verify.
    async fn verify(&self, email: &str, code: &str) -> GateResult<bool>;

    async fn cleanup_expired(&self) -> GateResult<u64>;
}

/// Server-side HTTP sessions keyed by an HTTP-only cookie
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(
        &self,
        user_id: Option<i64>,
        token_id: Option<i64>,
        ttl_hours: i64,
    ) -> GateResult<HttpSession>;

    /// Fetch a session; expired sessions are treated as absent
    async fn get(&self, sid: &str) -> GateResult<Option<HttpSession>>;

    async fn update_identity(
        &self,
        sid: &str,
        user_id: Option<i64>,
        token_id: Option<i64>,
    ) -> GateResult<bool>;

    async fn delete(&self, sid: &str) -> GateResult<bool>;

    async fn cleanup_expired(&self) -> GateResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_strings_are_long_and_hex() {
        let token = generate_token_string();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_strings_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(generate_token_string()));
        }
    }

    #[test]
    fn test_otp_codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
