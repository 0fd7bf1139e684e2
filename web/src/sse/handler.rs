use crate::extractors::{authenticated_user::AuthenticatedUser, RejectionType};
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::{BoxStream, StreamExt};
use log::*;
use service::AppState;
use std::convert::Infallible;

/// Long-lived notification stream for the authenticated user.
///
/// Unauthenticated requests get a single `error` event and the stream ends
/// without touching the broker.
#[utoipa::path(
    get,
    path = "/sse",
    responses(
        (status = 200, description = "text/event-stream of message, heartbeat and error events"),
    ),
    security(
        ("cookie_auth" = [])
    )
)]
pub async fn sse_handler(
    user: Result<AuthenticatedUser, RejectionType>,
    State(app_state): State<AppState>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let events = match user {
        Ok(AuthenticatedUser(user_id)) => {
            let session = ::sse::StreamSession::new(
                user_id.as_str(),
                app_state.broker(),
                app_state.pipeline.settings().heartbeat_interval,
            )
            .with_shutdown(app_state.shutdown_signal());
            debug!(
                "Establishing SSE session {} for user {user_id}",
                session.id().as_str()
            );
            session.into_stream().boxed()
        }
        Err((status, message)) => {
            debug!("Rejecting SSE connection: {status} {message}");
            ::sse::rejected("Unauthorized").boxed()
        }
    };

    Sse::new(events.map(|event| Ok(event.into_sse())).boxed())
}
