/// Configuration management for linkgate
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub access: AccessConfig,
    pub email: Option<EmailConfig>,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

/// Primary admin bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// When set, a primary admin record is seeded at startup if none exists
    pub primary_email: Option<String>,
    pub primary_phone: Option<String>,
    pub primary_name: String,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Absolute base URL embedded in access links (e.g. https://example.com)
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Access token and session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Country code prepended to phone handles without an international prefix
    pub default_country_code: String,
    /// Max token issuance attempts per IP within the window
    pub issuance_limit: u32,
    /// Sliding issuance window in seconds
    pub issuance_window_secs: u64,
    /// Server-side HTTP session lifetime in hours
    pub session_ttl_hours: i64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
    /// Bound on a single outbound send so a slow relay cannot hang a request
    pub send_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> GateResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("GATE_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("GATE_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .map_err(|_| GateError::Validation("Invalid port number".to_string()))?;

        let public_url = env::var("GATE_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let version = env::var("GATE_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("GATE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("GATE_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("linkgate.sqlite"));

        let default_country_code =
            env::var("GATE_DEFAULT_COUNTRY_CODE").unwrap_or_else(|_| "91".to_string());
        let issuance_limit = env::var("GATE_ISSUANCE_LIMIT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);
        let issuance_window_secs = env::var("GATE_ISSUANCE_WINDOW_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .unwrap_or(900);
        let session_ttl_hours = env::var("GATE_SESSION_TTL_HOURS")
            .unwrap_or_else(|_| "720".to_string())
            .parse()
            .unwrap_or(720);

        let email = if let Ok(smtp_url) = env::var("GATE_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("GATE_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
                send_timeout_secs: env::var("GATE_EMAIL_SEND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            })
        } else {
            None
        };

        let admin = AdminConfig {
            primary_email: env::var("GATE_PRIMARY_ADMIN_EMAIL").ok(),
            primary_phone: env::var("GATE_PRIMARY_ADMIN_PHONE").ok(),
            primary_name: env::var("GATE_PRIMARY_ADMIN_NAME")
                .unwrap_or_else(|_| "Administrator".to_string()),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            access: AccessConfig {
                default_country_code,
                issuance_limit,
                issuance_window_secs,
                session_ttl_hours,
            },
            email,
            admin,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> GateResult<()> {
        if self.service.hostname.is_empty() {
            return Err(GateError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.service.public_url.is_empty() {
            return Err(GateError::Validation(
                "Public URL cannot be empty".to_string(),
            ));
        }

        if self.access.issuance_limit == 0 {
            return Err(GateError::Validation(
                "Issuance limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_zero_issuance_limit_rejected() {
        let mut config = test_config();
        config.access.issuance_limit = 0;
        assert!(config.validate().is_err());
    }
}
