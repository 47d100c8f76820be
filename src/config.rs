use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Absent key leaves the gateway in an explicit Unavailable state.
    pub paystack_secret_key: Option<String>,
    pub paystack_base_url: String,
    pub paystack_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let paystack_secret_key = env::var("PAYSTACK_SECRET_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let paystack_base_url = env::var("PAYSTACK_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());
        let paystack_timeout_secs = env::var("PAYSTACK_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(10);
        Ok(Self {
            database_url,
            host,
            port,
            paystack_secret_key,
            paystack_base_url,
            paystack_timeout_secs,
        })
    }
}
