// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., user already in a room)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Protocol-level failures of the challenge subsystem.
///
/// None of these are fatal: the caller gets an `error` event carrying
/// [`ChallengeError::code`] and the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    /// Event arrived on a connection that never sent `identify`.
    IdentityUnresolved,
    /// `identify` carried an empty or malformed user id.
    InvalidIdentity(String),
    /// The connection's identity does not own the referenced seat.
    NotParticipant,
    UserNotFound(String),
    CourseNotFound(String),
    ChallengeNotFound(String),
    RoomNotFound(String),
    /// Answer for a question that is no longer open.
    StaleQuestion,
    InvalidAnswer(usize),
    /// The user is already bound to another room.
    DuplicateActiveRoom(String),
    PeerUnreachable(String),
    InvalidRequest(String),
    /// An external collaborator (catalog, generator, storage) failed.
    ServiceUnavailable(String),
}

impl ChallengeError {
    /// Stable reason code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ChallengeError::IdentityUnresolved => "identity_unresolved",
            ChallengeError::InvalidIdentity(_) => "invalid_identity",
            ChallengeError::NotParticipant => "not_participant",
            ChallengeError::UserNotFound(_) => "user_not_found",
            ChallengeError::CourseNotFound(_) => "course_not_found",
            ChallengeError::ChallengeNotFound(_) => "challenge_not_found",
            ChallengeError::RoomNotFound(_) => "room_not_found",
            ChallengeError::StaleQuestion => "stale_question",
            ChallengeError::InvalidAnswer(_) => "invalid_answer",
            ChallengeError::DuplicateActiveRoom(_) => "duplicate_active_room",
            ChallengeError::PeerUnreachable(_) => "peer_unreachable",
            ChallengeError::InvalidRequest(_) => "invalid_request",
            ChallengeError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl fmt::Display for ChallengeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeError::IdentityUnresolved => {
                write!(f, "Connection has not identified itself yet")
            }
            ChallengeError::InvalidIdentity(id) => write!(f, "Invalid user id {:?}", id),
            ChallengeError::NotParticipant => {
                write!(f, "User is not a participant of this challenge")
            }
            ChallengeError::UserNotFound(id) => write!(f, "User '{}' is not known", id),
            ChallengeError::CourseNotFound(id) => write!(f, "Course '{}' not found", id),
            ChallengeError::ChallengeNotFound(id) => {
                write!(f, "Challenge '{}' not found or already decided", id)
            }
            ChallengeError::RoomNotFound(id) => write!(f, "Room '{}' not found", id),
            ChallengeError::StaleQuestion => write!(f, "Too late: question is no longer open"),
            ChallengeError::InvalidAnswer(index) => {
                write!(f, "Answer index {} is out of range", index)
            }
            ChallengeError::DuplicateActiveRoom(room_id) => {
                write!(f, "User is already in room '{}'", room_id)
            }
            ChallengeError::PeerUnreachable(user_id) => {
                write!(f, "User '{}' is not connected", user_id)
            }
            ChallengeError::InvalidRequest(msg) => write!(f, "{}", msg),
            ChallengeError::ServiceUnavailable(msg) => {
                write!(f, "Upstream service failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ChallengeError {}

impl From<validator::ValidationErrors> for ChallengeError {
    fn from(err: validator::ValidationErrors) -> Self {
        ChallengeError::InvalidRequest(err.to_string())
    }
}

/// Query endpoints reuse the protocol taxonomy.
impl From<ChallengeError> for AppError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::RoomNotFound(_)
            | ChallengeError::ChallengeNotFound(_)
            | ChallengeError::UserNotFound(_)
            | ChallengeError::CourseNotFound(_) => AppError::NotFound(err.to_string()),
            ChallengeError::DuplicateActiveRoom(_) => AppError::Conflict(err.to_string()),
            ChallengeError::ServiceUnavailable(msg) => AppError::InternalServerError(msg),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
