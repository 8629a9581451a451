use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub db_max_connections: u32,
    pub run_migrations: bool,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Shift detail cache
    pub shift_cache_ttl_secs: u64,
    pub shift_cache_capacity: u64,

    pub log_dir: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", 604_800)?, // 7 days
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parsed("RUN_MIGRATIONS", true)?,

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parsed("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parsed("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".to_string()),

            shift_cache_ttl_secs: parsed("SHIFT_CACHE_TTL_SECS", 30)?,
            shift_cache_capacity: parsed("SHIFT_CACHE_CAPACITY", 10_000)?,

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "mysql://root@127.0.0.1:3306/crewsched_test".to_string(),
        jwt_secret: "test-secret".to_string(),
        server_addr: "127.0.0.1:0".to_string(),
        access_token_ttl: 900,
        refresh_token_ttl: 3600,
        db_max_connections: 1,
        run_migrations: false,
        rate_login_per_min: 1000,
        rate_register_per_min: 1000,
        rate_refresh_per_min: 1000,
        rate_protected_per_min: 1000,
        api_prefix: "/api/v1".to_string(),
        shift_cache_ttl_secs: 30,
        shift_cache_capacity: 100,
        log_dir: "logs".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_falls_back_to_default_when_unset() {
        let v: u32 = parsed("CREWSCHED_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parsed_reports_malformed_values() {
        // SAFETY: key is unique to this test
        unsafe { env::set_var("CREWSCHED_TEST_BAD_NUMBER", "ten") };
        let err = parsed::<u32>("CREWSCHED_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(err.to_string().contains("CREWSCHED_TEST_BAD_NUMBER"));
    }
}
