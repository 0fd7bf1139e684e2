use crate::extractors::RejectionType;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use log::*;
use tower_sessions::Session;

/// Session key under which the login flow stores the authenticated user's id.
pub const USER_ID_KEY: &str = "user_id";

pub struct AuthenticatedUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    // Extracts the user id stored in the session cookie's server-side session. Requests
    // without a session, or with a session that was never logged in, are Unauthorized.
    // The session is touched so that activity keeps extending its expiry.
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(status, msg)| (status, msg.to_string()))?;

        let user_id = match session.get::<String>(USER_ID_KEY).await {
            Ok(Some(user_id)) if !user_id.is_empty() => user_id,
            Ok(_) => return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string())),
            Err(e) => {
                warn!("Failed to load session: {e:?}");
                return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
            }
        };

        if let Err(e) = session.save().await {
            warn!("Failed to touch session for activity renewal: {e:?}");
            // Continue with authentication - session touch failure shouldn't block authentication
        } else {
            trace!("Session touched successfully for activity renewal");
        }

        Ok(AuthenticatedUser(user_id))
    }
}
