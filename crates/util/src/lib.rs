pub mod config;

pub use config::{AppConfig, ConfigError, Environment};

/// Bind address used when `APP_BIND_ADDR` is not set.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
/// SQLite connection string used when `APP_DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:bookrack.db?mode=rwc";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn default_bind_address_is_valid() {
        let addr: SocketAddr = DEFAULT_BIND_ADDR.parse().expect("default address parses");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn load_env_file_tolerates_missing_dotenv() {
        // Must not panic when no .env file is present.
        load_env_file();
    }
}
