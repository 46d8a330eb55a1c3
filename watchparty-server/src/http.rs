//! Session HTTP API handlers

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;
use watchparty_core::api::{CreateSessionRequest, ErrorBody, HealthResponse, SessionInfo};
use watchparty_core::{ControlEvent, CoordinatorError, PROTOCOL_VERSION};

use crate::AppState;

/// A coordinator error turned into an HTTP response
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<CoordinatorError> for HttpError {
    fn from(e: CoordinatorError) -> Self {
        let status = match e {
            CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
            CoordinatorError::AlreadyExists(_) => StatusCode::CONFLICT,
            CoordinatorError::InvalidEvent(_) | CoordinatorError::InvalidSession(_) => {
                StatusCode::BAD_REQUEST
            }
        };
        Self {
            status,
            body: ErrorBody {
                code: e.code().to_string(),
                error: e.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                code: "invalid_request".to_string(),
                error: rejection.body_text(),
            },
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// `POST /session`
pub async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionInfo>), HttpError> {
    let Json(request) = body?;
    state
        .coordinator
        .create_session(&request.session_id, &request.url)?;

    state.metrics.write().session_created(&request.session_id);
    Ok((
        StatusCode::CREATED,
        Json(SessionInfo {
            video_url: request.url,
            participants: Vec::new(),
        }),
    ))
}

/// `GET /session/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, HttpError> {
    let snapshot = state.coordinator.get_session(&id)?;
    Ok(Json(SessionInfo {
        video_url: snapshot.video_url,
        participants: snapshot.participants,
    }))
}

/// `POST /session/{id}/end`
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ControlEvent>, HttpError> {
    let event = state.coordinator.end_session(&id)?;
    info!("Session {} ended over HTTP", id);
    state.metrics.write().session_ended(&id);
    Ok(Json(event))
}

/// `GET /session/{id}/lastVideoEvent`
pub async fn last_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<ControlEvent>>, HttpError> {
    Ok(Json(state.coordinator.last_event(&id)?))
}

/// `GET /session/{id}/events`
pub async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ControlEvent>>, HttpError> {
    Ok(Json(state.coordinator.history(&id)?))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: PROTOCOL_VERSION.to_string(),
        sessions: state.coordinator.session_count(),
        connections: state.coordinator.connection_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (CoordinatorError::NotFound("s".into()), StatusCode::NOT_FOUND),
            (CoordinatorError::AlreadyExists("s".into()), StatusCode::CONFLICT),
            (CoordinatorError::InvalidEvent("x".into()), StatusCode::BAD_REQUEST),
            (CoordinatorError::InvalidSession("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (error, status) in cases {
            let code = error.code();
            let http = HttpError::from(error);
            assert_eq!(http.status, status);
            assert_eq!(http.body.code, code);
        }
    }
}
