//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use socialbook_shared::constants::{
    CONNECTION_BUFFER, DEFAULT_HTTP_PORT, MAX_BODY_BYTES, SESSION_TTL_HOURS,
    SWEEP_INITIAL_DELAY_SECS, SWEEP_INTERVAL_SECS, TTL_MONITOR_INTERVAL_SECS,
};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for REST and the `/ws` upgrade.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./socialbook.db`
    pub database_path: PathBuf,

    /// Ed25519 secret seed used to sign bearer tokens (hex, 64 chars).
    /// Env: `SESSION_SIGNING_KEY`
    /// Default: none, a random key is generated per process and every
    /// token is invalidated on restart.
    pub session_signing_key: Option<[u8; 32]>,

    /// Bearer token lifetime.
    /// Env: `SESSION_TTL_HOURS`
    pub session_ttl: chrono::Duration,

    /// Bootstrap owner account, created at startup if absent.
    /// Env: `ADMIN_EMAIL`, `ADMIN_PASSWORD`, `ADMIN_NAME`
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_name: String,

    /// Delay before the first group-message sweep.
    /// Env: `SWEEP_INITIAL_DELAY_SECS`
    pub sweep_initial_delay: Duration,

    /// Group-message sweep period.
    /// Env: `SWEEP_INTERVAL_SECS`
    pub sweep_interval: Duration,

    /// Period of the monitor that deletes expired messages and stories.
    /// Env: `TTL_INTERVAL_SECS`
    pub ttl_interval: Duration,

    /// Outbound event queue depth per realtime connection.
    /// Env: `CONNECTION_BUFFER`
    pub connection_buffer: usize,

    /// Request body limit in bytes.
    /// Env: `MAX_BODY_BYTES`
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./socialbook.db"),
            session_signing_key: None,
            session_ttl: chrono::Duration::hours(SESSION_TTL_HOURS),
            admin_email: None,
            admin_password: None,
            admin_name: "Admin".to_string(),
            sweep_initial_delay: Duration::from_secs(SWEEP_INITIAL_DELAY_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            ttl_interval: Duration::from_secs(TTL_MONITOR_INTERVAL_SECS),
            connection_buffer: CONNECTION_BUFFER,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

// The signing key and admin password stay out of logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("session_signing_key", &self.session_signing_key.map(|_| "<set>"))
            .field("session_ttl", &self.session_ttl)
            .field("admin_email", &self.admin_email)
            .field("admin_name", &self.admin_name)
            .field("sweep_initial_delay", &self.sweep_initial_delay)
            .field("sweep_interval", &self.sweep_interval)
            .field("ttl_interval", &self.ttl_interval)
            .field("connection_buffer", &self.connection_buffer)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values
    /// are logged and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(hex_key) = lookup("SESSION_SIGNING_KEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.session_signing_key = Some(key),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid SESSION_SIGNING_KEY, generating a random key"
                    );
                }
            }
        }

        if let Some(hours) = parse_number::<i64>(&lookup, "SESSION_TTL_HOURS") {
            config.session_ttl = chrono::Duration::hours(hours);
        }

        config.admin_email = lookup("ADMIN_EMAIL").filter(|s| !s.is_empty());
        config.admin_password = lookup("ADMIN_PASSWORD").filter(|s| !s.is_empty());
        if let Some(name) = lookup("ADMIN_NAME").filter(|s| !s.is_empty()) {
            config.admin_name = name;
        }

        if let Some(secs) = parse_number::<u64>(&lookup, "SWEEP_INITIAL_DELAY_SECS") {
            config.sweep_initial_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_number::<u64>(&lookup, "SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_number::<u64>(&lookup, "TTL_INTERVAL_SECS") {
            config.ttl_interval = Duration::from_secs(secs);
        }
        if let Some(n) = parse_number::<usize>(&lookup, "CONNECTION_BUFFER") {
            config.connection_buffer = n;
        }
        if let Some(n) = parse_number::<usize>(&lookup, "MAX_BODY_BYTES") {
            config.max_body_bytes = n;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Read a positive number; zero and garbage fall back to the default.
fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(n) if n > T::default() => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_key(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex.len()));
    }

    let bytes = hex::decode(hex).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
