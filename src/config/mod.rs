use serde::Deserialize;
use std::env;
use std::str::FromStr;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

// Настройки хранилища
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    /// Обязателен для postgres.
    pub url: Option<String>,
    pub pool_size: u32,
}

// Redis опционален: без него нет кеша каталога и рассылки между инстансами
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub catalog_ttl_secs: u64,
}

// Настройки блокировок, рассылки и идентификации
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub lock_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub viewer_buffer: usize,
    pub identity_header: String,
    pub seed_demo_theater: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Сборка из произвольного источника переменных (в тестах это HashMap).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let backend = match text("STORE_BACKEND", "postgres").to_lowercase().as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                    reason: "expected postgres or memory".to_string(),
                })
            }
        };

        let log_format = match text("LOG_FORMAT", "text").to_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected text or json".to_string(),
                })
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let config = Config {
            app: AppConfig {
                host: text("HOST", "0.0.0.0"),
                port: parsed(&lookup, "PORT", 8000)?,
                environment: text("ENVIRONMENT", "development"),
                rust_log: text("RUST_LOG", "showtime_booking=debug,tower_http=debug"),
                log_format,
            },
            database: DatabaseConfig {
                backend,
                url: database_url,
                pool_size: parsed(&lookup, "DB_POOL_SIZE", 20)?,
            },
            redis: RedisConfig {
                url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
                catalog_ttl_secs: parsed(&lookup, "CATALOG_CACHE_TTL_SECS", 3600)?,
            },
            booking: BookingConfig {
                lock_ttl_secs: parsed(&lookup, "LOCK_TTL_SECS", 300)?,
                sweep_interval_secs: parsed(&lookup, "LOCK_SWEEP_INTERVAL_SECS", 30)?,
                viewer_buffer: parsed(&lookup, "VIEWER_BUFFER", 256)?,
                identity_header: text("IDENTITY_HEADER", "x-user-id").to_lowercase(),
                seed_demo_theater: parsed(&lookup, "SEED_DEMO_THEATER", false)?,
            },
        };

        if config.booking.lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "LOCK_TTL_SECS",
                value: "0".to_string(),
                reason: "lock TTL must be positive".to_string(),
            });
        }
        if config.booking.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "LOCK_SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "sweep interval must be positive".to_string(),
            });
        }

        Ok(config)
    }

    /// Конфигурация для запуска целиком в памяти.
    pub fn in_memory() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "showtime_booking=debug".to_string(),
                log_format: LogFormat::Text,
            },
            database: DatabaseConfig { backend: StoreBackend::Memory, url: None, pool_size: 1 },
            redis: RedisConfig { url: None, catalog_ttl_secs: 3600 },
            booking: BookingConfig {
                lock_ttl_secs: 300,
                sweep_interval_secs: 30,
                viewer_buffer: 256,
                identity_header: "x-user-id".to_string(),
                seed_demo_theater: false,
            },
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => {
            let result = value.trim().parse::<T>();
            result.map_err(|e| ConfigError::Invalid { key, reason: e.to_string(), value })
        }
    }
}
