// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;
use url::Url;

/// Number of questions in one duel.
pub const DEFAULT_QUESTION_COUNT: usize = 5;

/// Points awarded for a correct answer.
pub const DEFAULT_POINTS_PER_CORRECT: u32 = 1;

/// How long a dropped participant may take to re-identify.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;

/// Pause between "both answered" and the next question.
pub const DEFAULT_REVEAL_PAUSE_MS: u64 = 1500;

/// How long completed rooms (and tombstones of terminated ones) are kept.
pub const DEFAULT_RESULT_RETENTION_SECS: u64 = 300;

/// Used when a question arrives without its own limit.
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 30;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Tunables of the duel state machine.
#[derive(Debug, Clone)]
pub struct DuelSettings {
    pub question_count: usize,
    pub points_per_correct: u32,
    pub grace_period: Duration,
    pub reveal_pause: Duration,
    pub result_retention: Duration,
    /// `None` keeps pending challenges until they are answered.
    pub challenge_timeout: Option<Duration>,
}

impl Default for DuelSettings {
    fn default() -> Self {
        Self {
            question_count: DEFAULT_QUESTION_COUNT,
            points_per_correct: DEFAULT_POINTS_PER_CORRECT,
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            reveal_pause: Duration::from_millis(DEFAULT_REVEAL_PAUSE_MS),
            result_retention: Duration::from_secs(DEFAULT_RESULT_RETENTION_SECS),
            challenge_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Without a database the server runs on in-memory collaborators.
    pub database_url: Option<String>,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub question_service_url: Option<Url>,
    pub question_service_key: Option<String>,
    pub question_bank_file: Option<String>,
    pub course_file: Option<String>,
    pub cors_origins: Vec<String>,
    pub duel: DuelSettings,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .expect("BIND_ADDR must be a socket address like 0.0.0.0:3000");

        let question_service_url = env::var("QUESTION_SERVICE_URL")
            .ok()
            .map(|raw| Url::parse(&raw).expect("QUESTION_SERVICE_URL must be a valid URL"));

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let challenge_timeout = match env_number("DUEL_CHALLENGE_TIMEOUT_SECS", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let duel = DuelSettings {
            question_count: env_number("DUEL_QUESTION_COUNT", DEFAULT_QUESTION_COUNT),
            points_per_correct: env_number("DUEL_POINTS_PER_CORRECT", DEFAULT_POINTS_PER_CORRECT),
            grace_period: Duration::from_secs(env_number(
                "DUEL_GRACE_PERIOD_SECS",
                DEFAULT_GRACE_PERIOD_SECS,
            )),
            reveal_pause: Duration::from_millis(env_number(
                "DUEL_REVEAL_PAUSE_MS",
                DEFAULT_REVEAL_PAUSE_MS,
            )),
            result_retention: Duration::from_secs(env_number(
                "DUEL_RESULT_RETENTION_SECS",
                DEFAULT_RESULT_RETENTION_SECS,
            )),
            challenge_timeout,
        };

        Self {
            database_url,
            rust_log,
            bind_addr,
            question_service_url,
            question_service_key: env::var("QUESTION_SERVICE_KEY").ok(),
            question_bank_file: env::var("QUESTION_BANK_FILE").ok(),
            course_file: env::var("COURSE_FILE").ok(),
            cors_origins,
            duel,
        }
    }
}

/// Reads a numeric variable, falling back to `default` when unset or malformed.
fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring malformed {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_documented_values() {
        let settings = DuelSettings::default();
        assert_eq!(settings.question_count, 5);
        assert_eq!(settings.points_per_correct, 1);
        assert_eq!(settings.grace_period, Duration::from_secs(10));
        assert!(settings.challenge_timeout.is_none());
    }

    #[test]
    fn env_number_falls_back_on_garbage() {
        // Unique key so parallel tests never collide.
        let key = "DUEL_TEST_ENV_NUMBER_GARBAGE";
        unsafe { env::set_var(key, "not-a-number") };
        assert_eq!(env_number(key, 7u64), 7);
        unsafe { env::set_var(key, " 12 ") };
        assert_eq!(env_number(key, 7u64), 12);
        unsafe { env::remove_var(key) };
    }
}
