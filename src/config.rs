use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Bearer key required on admin routes (None only allowed in dev mode)
    pub admin_api_key: Option<String>,
    pub dev_mode: bool,
    /// How often the intent poller re-reads the intent table
    pub intent_poll_interval: Duration,
    /// How far behind its high-water mark the poller re-reads
    pub intent_poll_overlap: Duration,
    /// Intents older than this at merge time never raise an alert
    pub alert_freshness: Duration,
    /// Optional URL that receives a signed JSON POST per new intent
    pub alert_webhook_url: Option<String>,
    pub alert_webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("KEYSHELF_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let intent_poll_interval_ms: u64 = env::var("INTENT_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(500);

        let intent_poll_overlap_secs: u64 = env::var("INTENT_POLL_OVERLAP_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let alert_freshness_secs: u64 = env::var("ALERT_FRESHNESS_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "keyshelf.db".to_string()),
            admin_api_key: env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),
            dev_mode,
            intent_poll_interval: Duration::from_millis(intent_poll_interval_ms),
            intent_poll_overlap: Duration::from_secs(intent_poll_overlap_secs),
            alert_freshness: Duration::from_secs(alert_freshness_secs),
            alert_webhook_url: env::var("ALERT_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            alert_webhook_secret: env::var("ALERT_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
