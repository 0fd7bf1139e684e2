use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::{Error, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use service::AppState;

/// GET the status of a background job specified by its id.
///
/// Jobs started by another user are reported as not found.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    params(
        ("id" = String, Path, description = "Id of the job to retrieve")
    ),
    responses(
        (status = 200, description = "Successfully retrieved the job's status, result and error"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Job not found or already expired"),
        (status = 503, description = "Service temporarily unavailable")
    ),
    security(
        ("cookie_auth" = [])
    )
)]
pub async fn read(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    debug!("GET Job by id: {id}");

    let job = app_state
        .pipeline
        .jobs()
        .get_job(&id)
        .await?
        .ok_or(Error::NotFound)?;

    if job
        .owner_id
        .as_deref()
        .is_some_and(|owner_id| owner_id != user_id)
    {
        debug!("Job {id} is not owned by user {user_id}");
        return Err(Error::NotFound);
    }

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), job)))
}
