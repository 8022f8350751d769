use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which persistence backend the collaborator stores run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Redis,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::InvalidStorageBackend(other.to_string())),
        }
    }
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Redis => "redis",
            StorageBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub redis_url: String,
    pub storage_backend: StorageBackend,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub ws_send_timeout_ms: u64,
    pub ws_outbound_buffer: usize,
    pub position_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            storage_backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .parse()?,
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::MissingJwtSecret)?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .unwrap_or(1800),
            ws_send_timeout_ms: env::var("WS_SEND_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            ws_outbound_buffer: env::var("WS_OUTBOUND_BUFFER")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(64),
            position_ttl_seconds: env::var("POSITION_TTL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_send_timeout_ms)
    }

    /// Settings for tests and local runs without any environment
    pub fn for_memory(jwt_secret: &str) -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            redis_url: "redis://localhost:6379".to_string(),
            storage_backend: StorageBackend::Memory,
            jwt_secret: jwt_secret.to_string(),
            jwt_expiry_seconds: 1800,
            ws_send_timeout_ms: 5000,
            ws_outbound_buffer: 64,
            position_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server port")]
    InvalidPort,
    #[error("JWT_SECRET environment variable is required")]
    MissingJwtSecret,
    #[error("Unknown STORAGE_BACKEND '{0}' (expected 'redis' or 'memory')")]
    InvalidStorageBackend(String),
}
