/// Database models for linkgate
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User identity record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Unique phone-like handle, functions as a secondary unique key
    pub whatsapp_number: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub city: Option<String>,
    pub is_admin: bool,
    /// At most one true instance system-wide; never hard-deleted or demoted
    pub is_primary_admin: bool,
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
}

/// One-time link credential. Once `ip_address` is non-null the token is
/// permanently bound: redemptions from any other IP are rejected regardless
/// of `is_used`. Tokens do not expire; binding is the security boundary.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub id: i64,
    pub token: String,
    pub user_id: Option<i64>,
    pub email: String,
    pub is_used: bool,
    pub ip_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Admin list view of a token, left-joined with its linked user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListEntry {
    pub id: i64,
    pub token: String,
    pub user_id: Option<i64>,
    pub email: String,
    pub is_used: bool,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub user_name: Option<String>,
    pub user_whatsapp_number: Option<String>,
}

/// Record granting silent re-authentication to a bound fingerprint+IP pair.
/// Deactivation is soft: the binding survives logout so the same device can
/// resume later.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    pub id: i64,
    pub user_id: i64,
    pub token_id: Option<i64>,
    pub ip_address: String,
    pub device_fingerprint: String,
    pub user_agent: String,
    pub is_active: bool,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Email one-time-passcode scaffolding. Available as a hardening building
/// block; not wired into the redemption flow.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerification {
    pub id: i64,
    pub email: String,
    pub code: String,
    pub attempts: i64,
    pub verified: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Server-side HTTP session, keyed by an HTTP-only cookie
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSession {
    pub sid: String,
    pub user_id: Option<i64>,
    pub token_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
