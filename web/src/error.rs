use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::*;

use notifications::{Error as NotificationError, NotificationErrorKind};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The requested resource does not exist or is not visible to the caller.
    NotFound,
    Notification(NotificationError),
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => (StatusCode::NOT_FOUND, "NOT FOUND").into_response(),
            Error::Notification(err) => match &err.error_kind {
                NotificationErrorKind::BrokerUnavailable => {
                    warn!("Broker unavailable while serving request: {err}");
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE UNAVAILABLE").into_response()
                }
                NotificationErrorKind::InvalidKey | NotificationErrorKind::UnknownTopic => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE ENTITY").into_response()
                }
                NotificationErrorKind::Broker | NotificationErrorKind::Serialization => {
                    error!("Internal error while serving request: {err}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
                }
            },
        }
    }
}

impl From<NotificationError> for Error {
    fn from(err: NotificationError) -> Self {
        Error::Notification(err)
    }
}
