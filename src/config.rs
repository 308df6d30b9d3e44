use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// HTTP mail gateway endpoint; emails go to the log when unset.
    pub mail_api_url: Option<String>,
    pub mail_from: String,
    pub email_max_attempts: u32,
    pub email_retry_base_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let mail_api_url = env::var("MAIL_API_URL").ok().filter(|u| !u.is_empty());
        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "orders@storefront.example".to_string());
        let email_max_attempts = env::var("EMAIL_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);
        let email_retry_base_ms = env::var("EMAIL_RETRY_BASE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60_000);
        Ok(Self {
            database_url,
            host,
            port,
            mail_api_url,
            mail_from,
            email_max_attempts,
            email_retry_base_ms,
        })
    }
}
