use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "cardvault-server")]
#[command(about = "Card authorization capture with step-up verification")]
#[command(version)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://cardvault.db?mode=rwc")]
    pub database_url: String,

    /// Seconds to wait for a pooled connection before failing the request
    #[arg(long, env = "DATABASE_ACQUIRE_TIMEOUT_SECS", default_value = "5")]
    pub database_acquire_timeout_secs: u64,

    /// Password for the admin surface
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: String,

    /// Secret the card field encryption key is derived from
    #[arg(long, env = "CARD_ENCRYPTION_SECRET", hide_env_values = true)]
    pub card_encryption_secret: String,

    /// Secret the admin session signing key is derived from
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    /// Phone number verification codes are texted to
    #[arg(long, env = "ADMIN_PHONE", default_value = "")]
    pub admin_phone: String,

    /// Email address verification codes and order notices are sent to
    #[arg(long, env = "ADMIN_EMAIL", default_value = "")]
    pub admin_email: String,

    /// Lifetime of a verification code in seconds
    #[arg(long, env = "CODE_TTL_SECS", default_value = "600", value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub code_ttl_secs: u64,

    /// Lifetime of an emailed admin login code in seconds
    #[arg(long, env = "ADMIN_CODE_TTL_SECS", default_value = "900", value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub admin_code_ttl_secs: u64,

    /// Lifetime of an admin session in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "3600", value_parser = clap::value_parser!(u64).range(1..=604_800))]
    pub session_ttl_secs: u64,

    /// Verification attempts allowed per source within one window
    #[arg(long, env = "RATE_LIMIT_ATTEMPTS", default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit_attempts: u32,

    /// Length of the rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "900", value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub rate_limit_window_secs: u64,

    /// Take the client address from X-Forwarded-For (only behind a trusted proxy)
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value_t = false)]
    pub trust_forwarded_for: bool,

    /// How often expired codes and stale limiter state are purged
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value = "300", value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.database_acquire_timeout_secs)
    }

    pub fn code_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.code_ttl_secs as i64)
    }

    pub fn admin_code_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.admin_code_ttl_secs as i64)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs as i64)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            database_acquire_timeout_secs: 5,
            admin_password: "correct horse".to_string(),
            card_encryption_secret: "test-card-secret".to_string(),
            session_secret: "test-session-secret".to_string(),
            admin_phone: "+15555550100".to_string(),
            admin_email: "ops@example.com".to_string(),
            code_ttl_secs: 600,
            admin_code_ttl_secs: 900,
            session_ttl_secs: 3600,
            rate_limit_attempts: 5,
            rate_limit_window_secs: 900,
            trust_forwarded_for: false,
            cleanup_interval_secs: 300,
        }
    }
}
