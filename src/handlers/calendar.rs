use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::db::queries;
use crate::errors::AppError;
use crate::services::calendar::generate_ics;
use crate::state::AppState;

pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    // Calendar apps request `/calendar/<id>.ics`; both forms resolve.
    let booking_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);

    let booking = {
        let db = state.conn()?;
        queries::get_booking_by_id(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?
    };

    let ics = generate_ics(&booking, &state.config.practice_name);
    let filename = format!("session-{booking_id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
