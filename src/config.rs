use std::env;
use std::str::FromStr;

pub struct Config {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub invites: InviteConfig,
}

#[derive(Debug, Clone)]
pub struct InviteConfig {
    pub code_length: usize,
    pub expiry_days: i64,
    pub default_max_uses: u32,
    pub max_generation_attempts: u32,
    pub redeem_attempts: u32,
    pub retention_days: i64,
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            expiry_days: 7,
            default_max_uses: 1,
            max_generation_attempts: 10,
            redeem_attempts: 5,
            retention_days: 7,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl InviteConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            code_length: parsed_var("INVITE_CODE_LENGTH", defaults.code_length).clamp(4, 16),
            expiry_days: parsed_var("INVITE_EXPIRY_DAYS", defaults.expiry_days).max(1),
            default_max_uses: parsed_var("INVITE_DEFAULT_MAX_USES", defaults.default_max_uses)
                .max(1),
            max_generation_attempts: parsed_var(
                "INVITE_MAX_GENERATION_ATTEMPTS",
                defaults.max_generation_attempts,
            )
            .max(1),
            redeem_attempts: parsed_var("INVITE_REDEEM_ATTEMPTS", defaults.redeem_attempts).max(1),
            retention_days: parsed_var("INVITE_RETENTION_DAYS", defaults.retention_days).max(0),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_var("PORT", 3000),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-in-production".to_string()),
            invites: InviteConfig::from_env(),
        }
    }
}
