use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub practice_name: String,
    pub calendly_signing_key: String,
    pub default_notice_period_days: i64,
    pub recurring_horizon_days: i64,
    pub sweep_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "therapybook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            practice_name: env::var("PRACTICE_NAME")
                .unwrap_or_else(|_| "Therapy Practice".to_string()),
            calendly_signing_key: env::var("CALENDLY_SIGNING_KEY").unwrap_or_default(),
            default_notice_period_days: env::var("DEFAULT_NOTICE_PERIOD_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|d: &i64| *d >= 0)
                .unwrap_or(1),
            recurring_horizon_days: env::var("RECURRING_HORIZON_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(28),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}
