//! Session API HTTP Client

use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, instrument};

use super::types::*;
use crate::sync::ControlEvent;

/// Default connection timeout
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when talking to the session API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

/// Client for the coordinator's session API
#[derive(Debug, Clone)]
pub struct SessionApiClient {
    http: Client,
    base_url: String,
}

impl SessionApiClient {
    /// Create a client for the API at `base_url` (e.g. `http://127.0.0.1:3050`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url));
        }

        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/session/{id}[/{action}]`, with the ID percent-encoded as one segment
    fn session_url(&self, session_id: &str, action: Option<&str>) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.url("/session")).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?;
            segments.push(session_id);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    /// Create a session bound to a video
    #[instrument(skip(self))]
    pub async fn create_session(&self, session_id: &str, url: &str) -> Result<(), ApiError> {
        let body = CreateSessionRequest {
            session_id: session_id.to_string(),
            url: url.to_string(),
        };
        let resp = self
            .http
            .post(self.url("/session"))
            .json(&body)
            .send()
            .await?;
        debug!("Response status: {}", resp.status());

        match resp.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(ApiError::AlreadyExists(session_id.to_string())),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Look up the video of a session
    #[instrument(skip(self))]
    pub async fn get_session(&self, session_id: &str) -> Result<SessionInfo, ApiError> {
        let resp = self
            .http
            .get(self.session_url(session_id, None)?)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(session_id.to_string())),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Mark a session as ended
    #[instrument(skip(self))]
    pub async fn end_session(&self, session_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.session_url(session_id, Some("end"))?)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(session_id.to_string())),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Last control event of a session, if it has one
    pub async fn last_event(&self, session_id: &str) -> Result<Option<ControlEvent>, ApiError> {
        let resp = self
            .http
            .get(self.session_url(session_id, Some("lastVideoEvent"))?)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(session_id.to_string())),
            _ => Err(unexpected(resp).await),
        }
    }

    /// Recorded control events of a session, oldest first
    pub async fn events(&self, session_id: &str) -> Result<Vec<ControlEvent>, ApiError> {
        let resp = self
            .http
            .get(self.session_url(session_id, Some("events"))?)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound(session_id.to_string())),
            _ => Err(unexpected(resp).await),
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        Ok(self
            .http
            .get(self.url("/health"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

async fn unexpected(resp: Response) -> ApiError {
    let status = resp.status().as_u16();
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => "unexpected response".to_string(),
    };
    ApiError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = SessionApiClient::new("http://127.0.0.1:3050/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:3050");
        assert_eq!(
            client.url("/session/s1"),
            "http://127.0.0.1:3050/session/s1"
        );
    }

    #[test]
    fn test_session_id_is_one_path_segment() {
        let client = SessionApiClient::new("http://127.0.0.1:3050").unwrap();
        assert_eq!(
            client.session_url("movie/night?x#y", None).unwrap().as_str(),
            "http://127.0.0.1:3050/session/movie%2Fnight%3Fx%23y"
        );
        assert_eq!(
            client.session_url("s1", Some("end")).unwrap().as_str(),
            "http://127.0.0.1:3050/session/s1/end"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            SessionApiClient::new("not a url"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_create_body_is_camel_case() {
        let body = CreateSessionRequest {
            session_id: "s1".to_string(),
            url: "v".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["url"], "v");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let client = SessionApiClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.get_session("s1").await,
            Err(ApiError::Http(_))
        ));
    }
}
