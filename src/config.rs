use clap::Parser;

const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 3001;
const DEFAULT_DATABASE_PATH: &str = "data/lawcast.db";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_REDIS_KEY_PREFIX: &str = "lawcast:";
const DEFAULT_CRON_TIMEZONE: &str = "Asia/Seoul";
const DEFAULT_CRAWL_URL: &str = "https://pal.assembly.go.kr/napal/lgsltpa/lgsltpaOngoing/list.do?menuNo=1100026";
const DEFAULT_CRAWL_USER_AGENT: &str = "Mozilla/5.0 (compatible; LawcastBot/1.0; +https://lawcast.kr)";
const DEFAULT_CRAWL_INTERVAL_SECS: u64 = 600;
const DEFAULT_CRAWL_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CRAWL_RETRIES: usize = 3;
const DEFAULT_DISPATCH_CONCURRENCY: usize = 10;
const DEFAULT_JOB_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_ACTIVE_WEBHOOKS: i64 = 100;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 25;

#[derive(Clone, Debug, clap::Args)]
pub struct ServerConfig {
    #[arg(long, env = "HOST", default_value = DEFAULT_SERVER_HOST)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,

    /// Comma-separated list of origins allowed to call the API from a browser
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Ceiling for draining in-flight notification batches on shutdown
    #[arg(long, env, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, clap::Args)]
pub struct RedisConfig {
    #[arg(long = "redis-url", env = "REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    pub url: String,

    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = DEFAULT_REDIS_KEY_PREFIX)]
    pub key_prefix: String,
}

#[derive(Clone, Debug, clap::Args)]
pub struct CrawlConfig {
    /// Upstream legislative-notice index page
    #[arg(long = "crawl-url", env = "CRAWL_URL", default_value = DEFAULT_CRAWL_URL)]
    pub url: String,

    #[arg(long, env = "CRAWL_USER_AGENT", default_value = DEFAULT_CRAWL_USER_AGENT)]
    pub user_agent: String,

    #[arg(long, env = "CRAWL_INTERVAL_SECS", default_value_t = DEFAULT_CRAWL_INTERVAL_SECS)]
    pub interval_secs: u64,

    #[arg(long, env = "CRAWL_TIMEOUT_SECS", default_value_t = DEFAULT_CRAWL_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[arg(long, env = "CRAWL_RETRIES", default_value_t = DEFAULT_CRAWL_RETRIES)]
    pub retries: usize,
}

#[derive(Clone, Debug, clap::Args)]
pub struct DispatchConfig {
    /// Upper bound on notices dispatched in parallel within one batch
    #[arg(long, env = "DISPATCH_CONCURRENCY", default_value_t = DEFAULT_DISPATCH_CONCURRENCY)]
    pub concurrency: usize,

    #[arg(long, env = "DISPATCH_JOB_TIMEOUT_MS", default_value_t = DEFAULT_JOB_TIMEOUT_MS)]
    pub job_timeout_ms: u64,

    #[arg(long, env = "DISPATCH_RETRY_COUNT", default_value_t = DEFAULT_RETRY_COUNT)]
    pub retry_count: u32,

    #[arg(long, env = "DISPATCH_RETRY_DELAY_MS", default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    #[arg(long, env = "MAX_ACTIVE_WEBHOOKS", default_value_t = DEFAULT_MAX_ACTIVE_WEBHOOKS)]
    pub max_active_webhooks: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, clap::Args)]
pub struct TelemetryConfig {
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[arg(long, env = "DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH)]
    pub database_path: String,

    #[command(flatten)]
    pub redis: RedisConfig,

    #[command(flatten)]
    pub crawl: CrawlConfig,

    #[command(flatten)]
    pub dispatch: DispatchConfig,

    #[arg(long, env = "RECAPTCHA_SECRET_KEY")]
    pub recaptcha_secret_key: String,

    /// IANA timezone the cleanup schedules are evaluated in
    #[arg(long, env = "CRON_TIMEZONE", default_value = DEFAULT_CRON_TIMEZONE)]
    pub cron_timezone: String,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl ServerConfig {
    /// Origins parsed out of the comma-separated `FRONTEND_URL` value.
    #[must_use]
    pub fn allowed_origins(&self) -> Vec<String> {
        self.frontend_url
            .as_deref()
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_config(frontend_url: Option<&str>) -> ServerConfig {
        ServerConfig {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            frontend_url: frontend_url.map(String::from),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }

    #[test]
    fn allowed_origins_splits_and_trims() {
        let server = server_config(Some("https://lawcast.kr, https://www.lawcast.kr ,"));
        assert_eq!(server.allowed_origins(), vec!["https://lawcast.kr", "https://www.lawcast.kr"]);
    }

    #[test]
    fn allowed_origins_empty_when_unset() {
        assert!(server_config(None).allowed_origins().is_empty());
    }
}
