/// In-memory store implementation
///
/// A mutex-guarded map behind the same traits as the SQLite stores, used by
/// the protocol tests and suitable for small non-persistent deployments.
/// Deliberately an injected value, never a module-level singleton.
use crate::db::models::{
    AccessToken, DeviceSession, HttpSession, OtpVerification, TokenListEntry, User,
};
use crate::error::GateResult;
use crate::store::{
    generate_otp_code, generate_session_id, generate_token_string, DeviceSessionStore, NewUser,
    OtpStore, SessionStore, TokenStore, UserStore,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MemoryState {
    users: HashMap<i64, User>,
    tokens: HashMap<i64, AccessToken>,
    device_sessions: HashMap<i64, DeviceSession>,
    otps: HashMap<i64, OtpVerification>,
    http_sessions: HashMap<String, HttpSession>,
    next_user_id: i64,
    next_token_id: i64,
    next_device_session_id: i64,
    next_otp_id: i64,
}

/// Shared in-memory store; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Lock poisoning only happens if a holder panicked; propagating the
        // panic is the right call in tests.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create(&self, email: &str, user_id: Option<i64>) -> GateResult<AccessToken> {
        let mut state = self.lock();
        state.next_token_id += 1;
        let record = AccessToken {
            id: state.next_token_id,
            token: generate_token_string(),
            user_id,
            email: email.to_string(),
            is_used: false,
            ip_address: None,
            device_fingerprint: None,
            created_at: Utc::now(),
            used_at: None,
        };
        state.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_token(&self, token: &str) -> GateResult<Option<AccessToken>> {
        let state = self.lock();
        Ok(state.tokens.values().find(|t| t.token == token).cloned())
    }

    async fn get_by_id(&self, id: i64) -> GateResult<Option<AccessToken>> {
        Ok(self.lock().tokens.get(&id).cloned())
    }

    async fn list_all(&self) -> GateResult<Vec<TokenListEntry>> {
        let state = self.lock();
        let mut entries: Vec<TokenListEntry> = state
            .tokens
            .values()
            .map(|t| {
                let user = t.user_id.and_then(|id| state.users.get(&id));
                TokenListEntry {
                    id: t.id,
                    token: t.token.clone(),
                    user_id: t.user_id,
                    email: t.email.clone(),
                    is_used: t.is_used,
                    ip_address: t.ip_address.clone(),
                    created_at: t.created_at,
                    used_at: t.used_at,
                    user_name: user.map(|u| u.name.clone()),
                    user_whatsapp_number: user.map(|u| u.whatsapp_number.clone()),
                }
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn link_to_user(&self, token_id: i64, user_id: i64) -> GateResult<bool> {
        let mut state = self.lock();
        match state.tokens.get_mut(&token_id) {
            Some(token) => {
                token.user_id = Some(user_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_used(&self, token_id: i64, ip: &str, fingerprint: &str) -> GateResult<bool> {
        let mut state = self.lock();
        match state.tokens.get_mut(&token_id) {
            // Bind only while still unbound, mirroring the conditional UPDATE
            Some(token) if token.ip_address.is_none() => {
                token.is_used = true;
                token.ip_address = Some(ip.to_string());
                token.device_fingerprint = Some(fingerprint.to_string());
                token.used_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl DeviceSessionStore for MemoryStore {
    async fn create(
        &self,
        user_id: i64,
        token_id: Option<i64>,
        ip: &str,
        fingerprint: &str,
        user_agent: &str,
    ) -> GateResult<DeviceSession> {
        let mut state = self.lock();
        state.next_device_session_id += 1;
        let now = Utc::now();
        let record = DeviceSession {
            id: state.next_device_session_id,
            user_id,
            token_id,
            ip_address: ip.to_string(),
            device_fingerprint: fingerprint.to_string(),
            user_agent: user_agent.to_string(),
            is_active: true,
            last_accessed_at: now,
            created_at: now,
        };
        state.device_sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_user_and_token(
        &self,
        user_id: i64,
        token_id: i64,
    ) -> GateResult<Option<DeviceSession>> {
        let state = self.lock();
        Ok(state
            .device_sessions
            .values()
            .filter(|s| s.user_id == user_id && s.token_id == Some(token_id) && s.is_active)
            .max_by_key(|s| s.last_accessed_at)
            .cloned())
    }

    async fn get_by_fingerprint(
        &self,
        fingerprint: &str,
        ip: &str,
        active_only: bool,
    ) -> GateResult<Option<DeviceSession>> {
        let state = self.lock();
        Ok(state
            .device_sessions
            .values()
            .filter(|s| {
                s.device_fingerprint == fingerprint
                    && s.ip_address == ip
                    && (!active_only || s.is_active)
            })
            .max_by_key(|s| s.last_accessed_at)
            .cloned())
    }

    async fn update_last_access(&self, session_id: i64) -> GateResult<()> {
        let mut state = self.lock();
        if let Some(session) = state.device_sessions.get_mut(&session_id) {
            session.last_accessed_at = Utc::now();
        }
        Ok(())
    }

    async fn deactivate(&self, session_id: i64) -> GateResult<bool> {
        let mut state = self.lock();
        match state.device_sessions.get_mut(&session_id) {
            Some(session) => {
                session.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reactivate(&self, session_id: i64) -> GateResult<bool> {
        let mut state = self.lock();
        match state.device_sessions.get_mut(&session_id) {
            Some(session) => {
                session.is_active = true;
                session.last_accessed_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn validate_access(
        &self,
        user_id: i64,
        ip: &str,
        fingerprint: &str,
    ) -> GateResult<bool> {
        let state = self.lock();
        Ok(state.device_sessions.values().any(|s| {
            s.user_id == user_id
                && s.ip_address == ip
                && s.device_fingerprint == fingerprint
                && s.is_active
        }))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, new_user: NewUser) -> GateResult<User> {
        let mut state = self.lock();
        state.next_user_id += 1;
        let record = User {
            id: state.next_user_id,
            name: new_user.name,
            whatsapp_number: new_user.whatsapp_number,
            email: new_user.email,
            password_hash: None,
            city: new_user.city,
            is_admin: new_user.is_admin,
            is_primary_admin: new_user.is_primary_admin,
            profile_completed: new_user.profile_completed,
            created_at: Utc::now(),
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> GateResult<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> GateResult<Option<User>> {
        let state = self.lock();
        Ok(state
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn get_by_phone(&self, whatsapp_number: &str) -> GateResult<Option<User>> {
        let state = self.lock();
        Ok(state
            .users
            .values()
            .find(|u| u.whatsapp_number == whatsapp_number)
            .cloned())
    }

    async fn list_all(&self) -> GateResult<Vec<User>> {
        let state = self.lock();
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn update_profile(
        &self,
        user_id: i64,
        name: &str,
        whatsapp_number: &str,
        city: &str,
        email: &str,
    ) -> GateResult<bool> {
        let mut state = self.lock();
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.name = name.to_string();
                user.whatsapp_number = whatsapp_number.to_string();
                user.city = Some(city.to_string());
                user.email = Some(email.to_string());
                user.profile_completed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_admin(&self, user_id: i64, is_admin: bool) -> GateResult<bool> {
        let mut state = self.lock();
        match state.users.get_mut(&user_id) {
            Some(user) if !user.is_primary_admin => {
                user.is_admin = is_admin;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, user_id: i64) -> GateResult<bool> {
        let mut state = self.lock();
        match state.users.get(&user_id) {
            Some(user) if !user.is_primary_admin => {
                state.users.remove(&user_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn create(&self, email: &str) -> GateResult<OtpVerification> {
        let mut state = self.lock();
        state.next_otp_id += 1;
        let now = Utc::now();
        let record = OtpVerification {
            id: state.next_otp_id,
            email: email.to_string(),
            code: generate_otp_code(),
            attempts: 0,
            verified: false,
            expires_at: now + Duration::minutes(10),
            created_at: now,
        };
        state.otps.insert(record.id, record.clone());
        Ok(record)
    }

    async fn verify(&self, email: &str, code: &str) -> GateResult<bool> {
        let mut state = self.lock();
        let now = Utc::now();
        let record = state
            .otps
            .values_mut()
            .filter(|o| o.email == email && !o.verified && o.expires_at > now)
            .max_by_key(|o| o.created_at);

        let Some(record) = record else {
            return Ok(false);
        };

        if record.attempts >= 3 {
            return Ok(false);
        }
        record.attempts += 1;

        if record.code != code {
            return Ok(false);
        }
        record.verified = true;
        Ok(true)
    }

    async fn cleanup_expired(&self) -> GateResult<u64> {
        let mut state = self.lock();
        let now = Utc::now();
        let before = state.otps.len();
        state.otps.retain(|_, o| o.expires_at >= now);
        Ok((before - state.otps.len()) as u64)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(
        &self,
        user_id: Option<i64>,
        token_id: Option<i64>,
        ttl_hours: i64,
    ) -> GateResult<HttpSession> {
        let mut state = self.lock();
        let now = Utc::now();
        let record = HttpSession {
            sid: generate_session_id(),
            user_id,
            token_id,
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        };
        state.http_sessions.insert(record.sid.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, sid: &str) -> GateResult<Option<HttpSession>> {
        let state = self.lock();
        Ok(state
            .http_sessions
            .get(sid)
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn update_identity(
        &self,
        sid: &str,
        user_id: Option<i64>,
        token_id: Option<i64>,
    ) -> GateResult<bool> {
        let mut state = self.lock();
        match state.http_sessions.get_mut(sid) {
            Some(session) => {
                session.user_id = user_id;
                session.token_id = token_id;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, sid: &str) -> GateResult<bool> {
        Ok(self.lock().http_sessions.remove(sid).is_some())
    }

    async fn cleanup_expired(&self) -> GateResult<u64> {
        let mut state = self.lock();
        let now = Utc::now();
        let before = state.http_sessions.len();
        state.http_sessions.retain(|_, s| s.expires_at >= now);
        Ok((before - state.http_sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_used_is_first_bind_wins() {
        let store = MemoryStore::new();
        let token = TokenStore::create(&store, "alice@example.com", None)
            .await
            .unwrap();

        assert!(store.mark_used(token.id, "1.1.1.1", "fp1").await.unwrap());
        assert!(!store.mark_used(token.id, "2.2.2.2", "fp2").await.unwrap());

        let bound = TokenStore::get_by_id(&store, token.id).await.unwrap().unwrap();
        assert_eq!(bound.ip_address.as_deref(), Some("1.1.1.1"));
        assert_eq!(bound.device_fingerprint.as_deref(), Some("fp1"));
    }

    #[tokio::test]
    async fn test_deactivated_session_found_by_inclusive_lookup() {
        let store = MemoryStore::new();
        let session = DeviceSessionStore::create(&store, 1, Some(1), "1.1.1.1", "fp1", "UA1")
            .await
            .unwrap();

        store.deactivate(session.id).await.unwrap();

        assert!(store
            .get_by_fingerprint("fp1", "1.1.1.1", true)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_by_fingerprint("fp1", "1.1.1.1", false)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();

        let token = TokenStore::create(&store, "alice@example.com", None)
            .await
            .unwrap();
        assert!(clone.get_by_token(&token.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_primary_admin_protected() {
        let store = MemoryStore::new();
        let primary = UserStore::create(
            &store,
            NewUser {
                name: "Root".to_string(),
                whatsapp_number: "911111111111".to_string(),
                email: None,
                city: None,
                is_admin: true,
                is_primary_admin: true,
                profile_completed: true,
            },
        )
        .await
        .unwrap();

        assert!(!UserStore::delete(&store, primary.id).await.unwrap());
        assert!(!store.set_admin(primary.id, false).await.unwrap());
    }
}
