use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub public_url: String,
    pub avatar_dir: PathBuf,
    pub referral_base_url: String,
    /// How long answer feedback is shown before the survey advances.
    pub feedback_delay: Duration,
    pub verification_delay: Duration,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "1111"),
            store_backend: try_load("STORE_BACKEND", "redis"),
            redis_url: try_load("REDIS_URL", "redis://redis:6379"),
            public_url: try_load("PUBLIC_URL", "http://localhost:1111"),
            avatar_dir: try_load("AVATAR_DIR", "./storage"),
            referral_base_url: try_load(
                "REFERRAL_BASE_URL",
                "https://mwananchisurveys.com/register",
            ),
            feedback_delay: Duration::from_millis(try_load("FEEDBACK_DELAY_MS", "1000")),
            verification_delay: Duration::from_millis(try_load("VERIFICATION_DELAY_MS", "1000")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            store_backend: StoreBackend::Redis,
            redis_url: "redis://redis:6379".to_string(),
            public_url: "http://localhost:1111".to_string(),
            avatar_dir: PathBuf::from("./storage"),
            referral_base_url: "https://mwananchisurveys.com/register".to_string(),
            feedback_delay: Duration::from_millis(1000),
            verification_delay: Duration::from_millis(1000),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
