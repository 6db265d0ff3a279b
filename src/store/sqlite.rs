/// SQLite-backed store implementations using runtime queries
///
/// Runtime query building (no compile-time macros) avoids needing
/// DATABASE_URL during compilation.
use crate::db::models::{
    AccessToken, DeviceSession, HttpSession, OtpVerification, TokenListEntry, User,
};
use crate::error::{GateError, GateResult};
use crate::store::{
    generate_otp_code, generate_session_id, generate_token_string, DeviceSessionStore, NewUser,
    OtpStore, SessionStore, TokenStore, UserStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

/// Maximum verification attempts per OTP code
const OTP_MAX_ATTEMPTS: i64 = 3;
/// OTP expiry window in minutes
const OTP_EXPIRY_MINUTES: i64 = 10;

// ---------------------------------------------------------------------------
// Token store

#[derive(Clone)]
pub struct SqliteTokenStore {
    db: SqlitePool,
}

impl SqliteTokenStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn create(&self, email: &str, user_id: Option<i64>) -> GateResult<AccessToken> {
        let token = generate_token_string();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO access_tokens (token, user_id, email, is_used, created_at)
             VALUES (?1, ?2, ?3, FALSE, ?4)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(email)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(AccessToken {
            id: result.last_insert_rowid(),
            token,
            user_id,
            email: email.to_string(),
            is_used: false,
            ip_address: None,
            device_fingerprint: None,
            created_at: now,
            used_at: None,
        })
    }

    async fn get_by_token(&self, token: &str) -> GateResult<Option<AccessToken>> {
        let record = sqlx::query_as::<_, AccessToken>(
            "SELECT * FROM access_tokens WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> GateResult<Option<AccessToken>> {
        let record =
            sqlx::query_as::<_, AccessToken>("SELECT * FROM access_tokens WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.db)
                .await
                .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn list_all(&self) -> GateResult<Vec<TokenListEntry>> {
        let rows = sqlx::query(
            "SELECT t.id, t.token, t.user_id, t.email, t.is_used, t.ip_address,
                    t.created_at, t.used_at,
                    u.name AS user_name, u.whatsapp_number AS user_whatsapp_number
             FROM access_tokens t
             LEFT JOIN users u ON u.id = t.user_id
             ORDER BY t.created_at DESC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(GateError::Database)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(TokenListEntry {
                id: row.try_get("id")?,
                token: row.try_get("token")?,
                user_id: row.try_get("user_id")?,
                email: row.try_get("email")?,
                is_used: row.try_get("is_used")?,
                ip_address: row.try_get("ip_address")?,
                created_at: row.try_get("created_at")?,
                used_at: row.try_get("used_at")?,
                user_name: row.try_get("user_name")?,
                user_whatsapp_number: row.try_get("user_whatsapp_number")?,
            });
        }

        Ok(entries)
    }

    async fn link_to_user(&self, token_id: i64, user_id: i64) -> GateResult<bool> {
        let result = sqlx::query("UPDATE access_tokens SET user_id = ?1 WHERE id = ?2")
            .bind(user_id)
            .bind(token_id)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_used(&self, token_id: i64, ip: &str, fingerprint: &str) -> GateResult<bool> {
        // Conditional bind: only one of two racing redemptions can match the
        // ip_address IS NULL predicate.
        let result = sqlx::query(
            "UPDATE access_tokens
             SET is_used = TRUE, ip_address = ?1, device_fingerprint = ?2, used_at = ?3
             WHERE id = ?4 AND ip_address IS NULL",
        )
        .bind(ip)
        .bind(fingerprint)
        .bind(Utc::now())
        .bind(token_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Device session store

#[derive(Clone)]
pub struct SqliteDeviceSessionStore {
    db: SqlitePool,
}

impl SqliteDeviceSessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceSessionStore for SqliteDeviceSessionStore {
    async fn create(
        &self,
        user_id: i64,
        token_id: Option<i64>,
        ip: &str,
        fingerprint: &str,
        user_agent: &str,
    ) -> GateResult<DeviceSession> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO device_sessions
                (user_id, token_id, ip_address, device_fingerprint, user_agent,
                 is_active, last_accessed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, TRUE, ?6, ?7)",
        )
        .bind(user_id)
        .bind(token_id)
        .bind(ip)
        .bind(fingerprint)
        .bind(user_agent)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(DeviceSession {
            id: result.last_insert_rowid(),
            user_id,
            token_id,
            ip_address: ip.to_string(),
            device_fingerprint: fingerprint.to_string(),
            user_agent: user_agent.to_string(),
            is_active: true,
            last_accessed_at: now,
            created_at: now,
        })
    }

    async fn get_by_user_and_token(
        &self,
        user_id: i64,
        token_id: i64,
    ) -> GateResult<Option<DeviceSession>> {
        let record = sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions
             WHERE user_id = ?1 AND token_id = ?2 AND is_active = TRUE
             ORDER BY last_accessed_at DESC
             LIMIT 1",
        )
        .bind(user_id)
        .bind(token_id)
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn get_by_fingerprint(
        &self,
        fingerprint: &str,
        ip: &str,
        active_only: bool,
    ) -> GateResult<Option<DeviceSession>> {
        let query = if active_only {
            "SELECT * FROM device_sessions
             WHERE device_fingerprint = ?1 AND ip_address = ?2 AND is_active = TRUE
             ORDER BY last_accessed_at DESC
             LIMIT 1"
        } else {
            "SELECT * FROM device_sessions
             WHERE device_fingerprint = ?1 AND ip_address = ?2
             ORDER BY last_accessed_at DESC
             LIMIT 1"
        };

        let record = sqlx::query_as::<_, DeviceSession>(query)
            .bind(fingerprint)
            .bind(ip)
            .fetch_optional(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn update_last_access(&self, session_id: i64) -> GateResult<()> {
        sqlx::query("UPDATE device_sessions SET last_accessed_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(())
    }

    async fn deactivate(&self, session_id: i64) -> GateResult<bool> {
        let result = sqlx::query("UPDATE device_sessions SET is_active = FALSE WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reactivate(&self, session_id: i64) -> GateResult<bool> {
        let result = sqlx::query(
            "UPDATE device_sessions SET is_active = TRUE, last_accessed_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(session_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn validate_access(
        &self,
        user_id: i64,
        ip: &str,
        fingerprint: &str,
    ) -> GateResult<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM device_sessions
             WHERE user_id = ?1 AND ip_address = ?2 AND device_fingerprint = ?3
               AND is_active = TRUE",
        )
        .bind(user_id)
        .bind(ip)
        .bind(fingerprint)
        .fetch_one(&self.db)
        .await
        .map_err(GateError::Database)?;

        let count: i64 = row.try_get("n")?;
        Ok(count > 0)
    }
}

// ---------------------------------------------------------------------------
// User store

#[derive(Clone)]
pub struct SqliteUserStore {
    db: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn create(&self, new_user: NewUser) -> GateResult<User> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO users
                (name, whatsapp_number, email, city, is_admin, is_primary_admin,
                 profile_completed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&new_user.name)
        .bind(&new_user.whatsapp_number)
        .bind(&new_user.email)
        .bind(&new_user.city)
        .bind(new_user.is_admin)
        .bind(new_user.is_primary_admin)
        .bind(new_user.profile_completed)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(User {
            id: result.last_insert_rowid(),
            name: new_user.name,
            whatsapp_number: new_user.whatsapp_number,
            email: new_user.email,
            password_hash: None,
            city: new_user.city,
            is_admin: new_user.is_admin,
            is_primary_admin: new_user.is_primary_admin,
            profile_completed: new_user.profile_completed,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> GateResult<Option<User>> {
        let record = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn get_by_email(&self, email: &str) -> GateResult<Option<User>> {
        let record = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn get_by_phone(&self, whatsapp_number: &str) -> GateResult<Option<User>> {
        let record =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE whatsapp_number = ?1")
                .bind(whatsapp_number)
                .fetch_optional(&self.db)
                .await
                .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn list_all(&self) -> GateResult<Vec<User>> {
        let records = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(records)
    }

    async fn update_profile(
        &self,
        user_id: i64,
        name: &str,
        whatsapp_number: &str,
        city: &str,
        email: &str,
    ) -> GateResult<bool> {
        let result = sqlx::query(
            "UPDATE users
             SET name = ?1, whatsapp_number = ?2, city = ?3, email = ?4,
                 profile_completed = TRUE
             WHERE id = ?5",
        )
        .bind(name)
        .bind(whatsapp_number)
        .bind(city)
        .bind(email)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_admin(&self, user_id: i64, is_admin: bool) -> GateResult<bool> {
        // The primary admin record is excluded from the predicate so it can
        // never be demoted through this path.
        let result = sqlx::query(
            "UPDATE users SET is_admin = ?1 WHERE id = ?2 AND is_primary_admin = FALSE",
        )
        .bind(is_admin)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, user_id: i64) -> GateResult<bool> {
        let result =
            sqlx::query("DELETE FROM users WHERE id = ?1 AND is_primary_admin = FALSE")
                .bind(user_id)
                .execute(&self.db)
                .await
                .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// OTP store

#[derive(Clone)]
pub struct SqliteOtpStore {
    db: SqlitePool,
}

impl SqliteOtpStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OtpStore for SqliteOtpStore {
    async fn create(&self, email: &str) -> GateResult<OtpVerification> {
        let code = generate_otp_code();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(OTP_EXPIRY_MINUTES);

        let result = sqlx::query(
            "INSERT INTO otp_verifications (email, code, attempts, verified, expires_at, created_at)
             VALUES (?1, ?2, 0, FALSE, ?3, ?4)",
        )
        .bind(email)
        .bind(&code)
        .bind(expires_at)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(OtpVerification {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            code,
            attempts: 0,
            verified: false,
            expires_at,
            created_at: now,
        })
    }

    async fn verify(&self, email: &str, code: &str) -> GateResult<bool> {
        let now = Utc::now();

        let record = sqlx::query_as::<_, OtpVerification>(
            "SELECT * FROM otp_verifications
             WHERE email = ?1 AND verified = FALSE AND expires_at > ?2
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(email)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        let Some(record) = record else {
            return Ok(false);
        };

        if record.attempts >= OTP_MAX_ATTEMPTS {
            return Ok(false);
        }

        sqlx::query("UPDATE otp_verifications SET attempts = attempts + 1 WHERE id = ?1")
            .bind(record.id)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        if record.code != code {
            return Ok(false);
        }

        sqlx::query("UPDATE otp_verifications SET verified = TRUE WHERE id = ?1")
            .bind(record.id)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(true)
    }

    async fn cleanup_expired(&self) -> GateResult<u64> {
        let result = sqlx::query("DELETE FROM otp_verifications WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// HTTP session store

#[derive(Clone)]
pub struct SqliteSessionStore {
    db: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(
        &self,
        user_id: Option<i64>,
        token_id: Option<i64>,
        ttl_hours: i64,
    ) -> GateResult<HttpSession> {
        let sid = generate_session_id();
        let now = Utc::now();
        let expires_at = now + Duration::hours(ttl_hours);

        sqlx::query(
            "INSERT INTO http_sessions (sid, user_id, token_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&sid)
        .bind(user_id)
        .bind(token_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(HttpSession {
            sid,
            user_id,
            token_id,
            created_at: now,
            expires_at,
        })
    }

    async fn get(&self, sid: &str) -> GateResult<Option<HttpSession>> {
        let record = sqlx::query_as::<_, HttpSession>(
            "SELECT * FROM http_sessions WHERE sid = ?1 AND expires_at > ?2",
        )
        .bind(sid)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await
        .map_err(GateError::Database)?;

        Ok(record)
    }

    async fn update_identity(
        &self,
        sid: &str,
        user_id: Option<i64>,
        token_id: Option<i64>,
    ) -> GateResult<bool> {
        let result =
            sqlx::query("UPDATE http_sessions SET user_id = ?1, token_id = ?2 WHERE sid = ?3")
                .bind(user_id)
                .bind(token_id)
                .bind(sid)
                .execute(&self.db)
                .await
                .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, sid: &str) -> GateResult<bool> {
        let result = sqlx::query("DELETE FROM http_sessions WHERE sid = ?1")
            .bind(sid)
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_expired(&self) -> GateResult<u64> {
        let result = sqlx::query("DELETE FROM http_sessions WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(GateError::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&dir.path().join("test.sqlite"), db::DatabaseOptions::default())
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn test_token_create_and_lookup() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteTokenStore::new(pool);

        let created = store.create("alice@example.com", None).await.unwrap();
        assert!(!created.is_used);
        assert!(created.ip_address.is_none());

        let found = store.get_by_token(&created.token).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email, "alice@example.com");

        assert!(store.get_by_token("no-such-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_create_mints_independent_tokens() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteTokenStore::new(pool);

        let first = store.create("alice@example.com", None).await.unwrap();
        let second = store.create("alice@example.com", None).await.unwrap();
        assert_ne!(first.token, second.token);
        assert_ne!(first.id, second.id);

        // The first token is untouched
        let found = store.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(found.token, first.token);
    }

    #[tokio::test]
    async fn test_mark_used_binds_exactly_once() {
        let (pool, _dir) = test_pool().await;
        let store = SqliteTokenStore::new(pool);

        let token = store.create("alice@example.com", None).await.unwrap();

        assert!(store.mark_used(token.id, "1.1.1.1", "fp1").await.unwrap());
        // Second bind must lose the conditional update
        assert!(!store.mark_used(token.id, "2.2.2.2", "fp2").await.unwrap());

        let bound = store.get_by_id(token.id).await.unwrap().unwrap();
        assert!(bound.is_used);
        assert_eq!(bound.ip_address.as_deref(), Some("1.1.1.1"));
        assert_eq!(bound.device_fingerprint.as_deref(), Some("fp1"));
        assert!(bound.used_at.is_some());
    }

    #[tokio::test]
    async fn test_list_all_left_joins_user_fields() {
        let (pool, _dir) = test_pool().await;
        let tokens = SqliteTokenStore::new(pool.clone());
        let users = SqliteUserStore::new(pool);

        let user = users
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

        tokens.create("alice@example.com", Some(user.id)).await.unwrap();
        tokens.create("bob@example.com", None).await.unwrap();

        let entries = tokens.list_all().await.unwrap();
        assert_eq!(entries.len(), 2);

        let linked = entries.iter().find(|e| e.user_id.is_some()).unwrap();
        assert_eq!(linked.user_name.as_deref(), Some("Alice"));
        let unlinked = entries.iter().find(|e| e.user_id.is_none()).unwrap();
        assert!(unlinked.user_name.is_none());
    }

    #[tokio::test]
    async fn test_device_session_fingerprint_lookup_asymmetry() {
        let (pool, _dir) = test_pool().await;
        let users = SqliteUserStore::new(pool.clone());
        let sessions = SqliteDeviceSessionStore::new(pool);

        let user = users
            .create(NewUser {
                name: "Alice".to_string(),
                whatsapp_number: "919876543210".to_string(),
                email: None,
                city: None,
                is_admin: false,
                is_primary_admin: false,
                profile_completed: false,
            })
            .await
            .unwrap();

        let session = sessions
            .create(user.id, None, "1.1.1.1", "fp1", "UA1")
            .await
            .unwrap();

        // Both fingerprint and IP must agree
        assert!(sessions
            .get_by_fingerprint("fp1", "2.2.2.2", true)
            .await
            .unwrap()
            .is_none());

        assert!(sessions.deactivate(session.id).await.unwrap());

        // Active-only lookup misses the deactivated session...
        assert!(sessions
            .get_by_fingerprint("fp1", "1.1.1.1", true)
            .await
            .unwrap()
            .is_none());
        // ...but the inclusive lookup still finds it (logout/re-login path)
        let found = sessions
            .get_by_fingerprint("fp1", "1.1.1.1", false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, session.id);
        assert!(!found.is_active);

        assert!(sessions.reactivate(session.id).await.unwrap());
        assert!(sessions
            .validate_access(user.id, "1.1.1.1", "fp1")
            .await
            .unwrap());
        assert!(!sessions
            .validate_access(user.id, "2.2.2.2", "fp1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_primary_admin_cannot_be_deleted_or_demoted() {
        let (pool, _dir) = test_pool().await;
        let users = SqliteUserStore::new(pool);

        let primary = users
            .create(NewUser {
                name: "Root".to_string(),
                whatsapp_number: "911111111111".to_string(),
                email: Some("root@example.com".to_string()),
                city: None,
                is_admin: true,
                is_primary_admin: true,
                profile_completed: true,
            })
            .await
            .unwrap();
        let secondary = users
            .create(NewUser {
                name: "Mod".to_string(),
                whatsapp_number: "912222222222".to_string(),
                email: Some("mod@example.com".to_string()),
                city: None,
                is_admin: true,
                is_primary_admin: false,
                profile_completed: true,
            })
            .await
            .unwrap();

        assert!(!users.delete(primary.id).await.unwrap());
        assert!(!users.set_admin(primary.id, false).await.unwrap());
        assert!(users.get_by_id(primary.id).await.unwrap().is_some());

        assert!(users.set_admin(secondary.id, false).await.unwrap());
        assert!(users.delete(secondary.id).await.unwrap());
        assert!(users.get_by_id(secondary.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_otp_attempts_capped() {
        let (pool, _dir) = test_pool().await;
        let otps = SqliteOtpStore::new(pool);

        let otp = otps.create("alice@example.com").await.unwrap();
        let wrong = if otp.code == "000000" { "111111" } else { "000000" };

        for _ in 0..3 {
            assert!(!otps.verify("alice@example.com", wrong).await.unwrap());
        }

        // Fourth attempt never verifies, even with the right code
        assert!(!otps.verify("alice@example.com", &otp.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_session_expiry_and_cleanup() {
        let (pool, _dir) = test_pool().await;
        let users = SqliteUserStore::new(pool.clone());
        let tokens = SqliteTokenStore::new(pool.clone());
        let sessions = SqliteSessionStore::new(pool);

        let user = users
            .create(NewUser {
                name: "Alice".to_string(),
                whatsapp_number: "919876543210".to_string(),
                email: Some("alice@example.com".to_string()),
                city: None,
                is_admin: false,
                is_primary_admin: false,
                profile_completed: true,
            })
            .await
            .unwrap();
        let token = tokens.create("alice@example.com", Some(user.id)).await.unwrap();

        let session = sessions
            .create(Some(user.id), Some(token.id), 24)
            .await
            .unwrap();
        let found = sessions.get(&session.sid).await.unwrap().unwrap();
        assert_eq!(found.user_id, Some(user.id));
        assert_eq!(found.token_id, Some(token.id));

        // A session with an already-elapsed TTL is treated as absent
        let expired = sessions.create(Some(user.id), None, -1).await.unwrap();
        assert!(sessions.get(&expired.sid).await.unwrap().is_none());

        let swept = sessions.cleanup_expired().await.unwrap();
        assert_eq!(swept, 1);
        assert!(sessions.get(&session.sid).await.unwrap().is_some());
    }
}
