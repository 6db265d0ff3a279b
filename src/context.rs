/// Application context and dependency injection
use crate::{
    access::AccessService,
    config::ServerConfig,
    db,
    error::GateResult,
    mailer::{AccessMailer, LogMailer, Mailer},
    rate_limit::{IssuanceLimitConfig, IssuanceLimiter},
    store::{
        memory::MemoryStore,
        sqlite::{
            SqliteDeviceSessionStore, SqliteOtpStore, SqliteSessionStore, SqliteTokenStore,
            SqliteUserStore,
        },
        DeviceSessionStore, NewUser, OtpStore, SessionStore, TokenStore, UserStore,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: Option<SqlitePool>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub devices: Arc<dyn DeviceSessionStore>,
    pub otps: Arc<dyn OtpStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub access: AccessService,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> GateResult<Self> {
        // Validate configuration
        config.validate()?;

        // Ensure the data directory exists
        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        // Initialize database
        let pool =
            db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let users: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(pool.clone()));
        let tokens: Arc<dyn TokenStore> = Arc::new(SqliteTokenStore::new(pool.clone()));
        let devices: Arc<dyn DeviceSessionStore> =
            Arc::new(SqliteDeviceSessionStore::new(pool.clone()));
        let otps: Arc<dyn OtpStore> = Arc::new(SqliteOtpStore::new(pool.clone()));
        let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool.clone()));

        // Initialize mailer; without SMTP the links only reach the log
        let mailer: Arc<dyn AccessMailer> = match &config.email {
            Some(email_config) => Arc::new(Mailer::new(email_config.clone())?),
            None => {
                tracing::warn!("No SMTP configuration; access links will be logged only");
                Arc::new(LogMailer)
            }
        };

        let limiter = IssuanceLimiter::new(IssuanceLimitConfig {
            limit: config.access.issuance_limit,
            window_secs: config.access.issuance_window_secs,
        });

        let config = Arc::new(config);
        let access = AccessService::new(
            Arc::clone(&config),
            Arc::clone(&users),
            Arc::clone(&tokens),
            Arc::clone(&devices),
            mailer,
            limiter,
        );

        let ctx = Self {
            config,
            db: Some(pool),
            users,
            tokens,
            devices,
            otps,
            sessions,
            access,
        };

        ctx.seed_primary_admin().await?;

        Ok(ctx)
    }

    /// Build a context over in-memory stores; used by tests and suitable
    /// for throwaway non-persistent deployments
    pub fn in_memory(config: ServerConfig, mailer: Arc<dyn AccessMailer>) -> Self {
        let store = MemoryStore::new();
        let users: Arc<dyn UserStore> = Arc::new(store.clone());
        let tokens: Arc<dyn TokenStore> = Arc::new(store.clone());
        let devices: Arc<dyn DeviceSessionStore> = Arc::new(store.clone());
        let otps: Arc<dyn OtpStore> = Arc::new(store.clone());
        let sessions: Arc<dyn SessionStore> = Arc::new(store);

        let limiter = IssuanceLimiter::new(IssuanceLimitConfig {
            limit: config.access.issuance_limit,
            window_secs: config.access.issuance_window_secs,
        });

        let config = Arc::new(config);
        let access = AccessService::new(
            Arc::clone(&config),
            Arc::clone(&users),
            Arc::clone(&tokens),
            Arc::clone(&devices),
            mailer,
            limiter,
        );

        Self {
            config,
            db: None,
            users,
            tokens,
            devices,
            otps,
            sessions,
            access,
        }
    }

    /// Seed the primary admin record when configured and absent. There is at
    /// most one primary admin system-wide.
    async fn seed_primary_admin(&self) -> GateResult<()> {
        let (Some(email), Some(phone)) = (
            self.config.admin.primary_email.clone(),
            self.config.admin.primary_phone.clone(),
        ) else {
            return Ok(());
        };

        if self.users.get_by_email(&email).await?.is_some() {
            return Ok(());
        }

        let admin = self
            .users
            .create(NewUser {
                name: self.config.admin.primary_name.clone(),
                whatsapp_number: phone,
                email: Some(email.clone()),
                city: None,
                is_admin: true,
                is_primary_admin: true,
                profile_completed: true,
            })
            .await?;

        tracing::info!("Seeded primary admin {} ({})", admin.id, email);
        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        self.config.service.public_url.clone()
    }
}
