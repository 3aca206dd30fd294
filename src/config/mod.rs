use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Which storage driver backs the connection supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            "memory" | "mem" | "inmemory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// Full connection URL; when set it wins over the host/credential fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Physical database that holds every tenant's logical database
    pub name: String,
    pub max_connections: u32,
    pub keep_alive: bool,
    pub connect_timeout_ms: u64,
    pub socket_timeout_ms: u64,
    pub enable_query_logging: bool,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub seed_on_startup: bool,
    pub enable_request_logging: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.log_level = v;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_BACKEND") {
            self.database.backend = StorageBackend::parse(&v).unwrap_or(self.database.backend);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("DATABASE_HOST") {
            self.database.host = v;
        }
        if let Ok(v) = env::var("DATABASE_PORT") {
            self.database.port = v.parse().unwrap_or(self.database.port);
        }
        if let Ok(v) = env::var("DATABASE_USER") {
            self.database.user = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_PASSWORD") {
            self.database.password = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_NAME") {
            self.database.name = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_KEEP_ALIVE") {
            self.database.keep_alive = v.parse().unwrap_or(self.database.keep_alive);
        }
        if let Ok(v) = env::var("DATABASE_CONNECT_TIMEOUT_MS") {
            self.database.connect_timeout_ms = v.parse().unwrap_or(self.database.connect_timeout_ms);
        }
        if let Ok(v) = env::var("DATABASE_SOCKET_TIMEOUT_MS") {
            self.database.socket_timeout_ms = v.parse().unwrap_or(self.database.socket_timeout_ms);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // API overrides
        if let Some(port) = env::var("TENANTDB_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("SEED_ON_STARTUP") {
            self.api.seed_on_startup = v.parse().unwrap_or(self.api.seed_on_startup);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    fn base_database() -> DatabaseConfig {
        DatabaseConfig {
            backend: StorageBackend::Postgres,
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: None,
            password: None,
            name: "tenantdb".to_string(),
            max_connections: 10,
            keep_alive: true,
            connect_timeout_ms: 3000,
            socket_timeout_ms: 3000,
            enable_query_logging: false,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "debug".to_string(),
            database: DatabaseConfig {
                enable_query_logging: true,
                ..Self::base_database()
            },
            api: ApiConfig {
                port: 3050,
                seed_on_startup: true,
                enable_request_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            log_level: "info".to_string(),
            database: DatabaseConfig {
                max_connections: 20,
                ..Self::base_database()
            },
            api: ApiConfig {
                port: 3050,
                seed_on_startup: false,
                enable_request_logging: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            log_level: "info".to_string(),
            database: DatabaseConfig {
                max_connections: 50,
                connect_timeout_ms: 5000,
                ..Self::base_database()
            },
            api: ApiConfig {
                port: 3050,
                seed_on_startup: false,
                enable_request_logging: false,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults_seed_and_log_verbosely() {
        let config = AppConfig::development();
        assert!(config.api.seed_on_startup);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.database.backend, StorageBackend::Postgres);
    }

    #[test]
    fn production_defaults_do_not_seed() {
        let config = AppConfig::production();
        assert!(!config.api.seed_on_startup);
        assert_eq!(config.database.max_connections, 50);
    }

    #[test]
    fn pool_timeouts_stay_in_the_few_second_range() {
        for config in [AppConfig::development(), AppConfig::staging(), AppConfig::production()] {
            assert!(config.database.keep_alive);
            assert!(config.database.connect_timeout() <= Duration::from_secs(5));
            assert_eq!(config.database.socket_timeout(), Duration::from_secs(3));
        }
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!(StorageBackend::parse("Postgres"), Some(StorageBackend::Postgres));
        assert_eq!(StorageBackend::parse(" memory "), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("mongo"), None);
    }
}
