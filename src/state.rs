use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::NoticePeriod;
use crate::services::notify::Notifier;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub notifier: Box<dyn Notifier>,
}

impl AppState {
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Database(anyhow::anyhow!("database lock poisoned")))
    }

    /// Fallback notice period used until an admin saves one.
    pub fn default_notice_period(&self) -> NoticePeriod {
        NoticePeriod::clamped(self.config.default_notice_period_days)
    }
}
