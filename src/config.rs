use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables.
/// Provider API keys are deliberately NOT captured here; they are read from
/// the process environment at call time (see [`provider_keys`]).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub providers: ProviderConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Endpoint overrides for the external model providers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    pub perplexity_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        Ok(Config {
            database: DatabaseConfig::from_env()?,
            providers: ProviderConfig::from_env(),
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Log a summary of loaded configuration (without sensitive data)
    pub fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            perplexity_base_url = ?self.providers.perplexity_base_url,
            gemini_base_url = ?self.providers.gemini_base_url,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if provider_keys::perplexity().is_none() && provider_keys::gemini().is_none() {
            warn!(
                "Neither PPLX_API_KEY nor GEMINI_API_KEY is set - generation endpoints will fail"
            );
        }

        log_validation!(success, "configuration", "Configuration validation completed");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:coursegen.db".to_string());
        Ok(DatabaseConfig { url })
    }
}

impl ProviderConfig {
    fn from_env() -> Self {
        ProviderConfig {
            perplexity_base_url: env::var("PPLX_BASE_URL").ok(),
            gemini_base_url: env::var("GEMINI_BASE_URL").ok(),
        }
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!(
                "Invalid PORT value: '{}'. Must be a number between 1-65535",
                port_str
            )
        })?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,coursegen=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

/// Call-time provider key lookup. Keys can appear, rotate, or disappear
/// between requests without a restart; an empty value counts as absent.
pub mod provider_keys {
    use std::env;

    pub fn perplexity() -> Option<String> {
        non_empty(env::var("PPLX_API_KEY").ok())
    }

    pub fn gemini() -> Option<String> {
        non_empty(env::var("GEMINI_API_KEY").ok())
    }

    fn non_empty(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:coursegen.db"), "sqli***n.db");
    }

    #[test]
    fn test_database_config_defaults() {
        unsafe { env::remove_var("DATABASE_URL") };

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "sqlite:coursegen.db");
    }

    #[test]
    fn test_server_config_defaults() {
        unsafe {
            env::remove_var("PORT");
            env::remove_var("HOST");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_invalid_port_parsing() {
        unsafe { env::set_var("PORT", "not-a-number") };
        let result = ServerConfig::from_env();
        assert!(result.is_err());

        unsafe { env::remove_var("PORT") };
    }

    #[test]
    fn test_blank_provider_key_counts_as_absent() {
        unsafe { env::set_var("PPLX_API_KEY", "   ") };
        assert!(provider_keys::perplexity().is_none());

        unsafe { env::set_var("PPLX_API_KEY", "pplx-test-key") };
        assert_eq!(provider_keys::perplexity().as_deref(), Some("pplx-test-key"));

        unsafe { env::remove_var("PPLX_API_KEY") };
        assert!(provider_keys::perplexity().is_none());
    }

    #[test]
    fn test_config_validation() {
        let config = Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            providers: ProviderConfig::default(),
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        };

        assert!(config.validate().is_ok());

        let mut invalid_config = config.clone();
        invalid_config.server.port = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = config.clone();
        invalid_config.database.url = "postgres://elsewhere".to_string();
        assert!(invalid_config.validate().is_err());
    }
}
