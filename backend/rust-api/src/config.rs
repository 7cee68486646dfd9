use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Rate limiting is skipped when no Redis is configured.
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub access_token_ttl_seconds: i64,
    pub bcrypt_cost: u32,
    pub bind_addr: String,
    pub registration_open: bool,
    pub quiz: QuizSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizSettings {
    /// Attempts shown as allowed on the quiz page.
    pub max_attempts: u32,
    /// When false the limit is advisory only and submissions are always accepted.
    pub enforce_attempt_limit: bool,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            enforce_attempt_limit: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "learnhub".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let access_token_ttl_seconds = settings
            .get_int("auth.access_token_ttl_seconds")
            .ok()
            .or_else(|| env_parse("JWT_ACCESS_TOKEN_TTL_SECONDS"))
            .filter(|ttl| *ttl > 0)
            .unwrap_or(3600);

        let bcrypt_cost = settings
            .get_int("auth.bcrypt_cost")
            .ok()
            .or_else(|| env_parse("BCRYPT_COST"))
            .map(|cost| cost.clamp(4, 31) as u32)
            .unwrap_or(bcrypt::DEFAULT_COST);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let registration_open = settings
            .get_bool("site.registration_open")
            .unwrap_or(true);

        let defaults = QuizSettings::default();
        let quiz = QuizSettings {
            max_attempts: settings
                .get_int("quiz.max_attempts")
                .ok()
                .filter(|n| *n > 0)
                .map(|n| n as u32)
                .unwrap_or(defaults.max_attempts),
            enforce_attempt_limit: settings
                .get_bool("quiz.enforce_attempt_limit")
                .unwrap_or(defaults.enforce_attempt_limit),
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            access_token_ttl_seconds,
            bcrypt_cost,
            bind_addr,
            registration_open,
            quiz,
        })
    }
}

fn env_parse(key: &str) -> Option<i64> {
    env::var(key).ok().and_then(|v| v.parse::<i64>().ok())
}
