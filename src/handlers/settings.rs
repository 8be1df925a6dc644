use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::check_auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{NoticePeriod, Settings};
use crate::state::AppState;

// GET /api/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Settings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.conn()?;
    let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
    Ok(Json(Settings { notice_period }))
}

// POST /api/settings
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub notice_period: Option<i64>,
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<Settings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.conn()?;
    if let Some(days) = body.notice_period {
        let notice_period =
            NoticePeriod::from_days(days).map_err(|e| AppError::BadRequest(e.to_string()))?;
        queries::set_notice_period(&db, notice_period)?;
        tracing::info!(days, "notice period updated");
    }

    let notice_period = queries::get_notice_period(&db, state.default_notice_period())?;
    Ok(Json(Settings { notice_period }))
}
