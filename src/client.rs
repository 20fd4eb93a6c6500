//! Blocking HTTP client for the Google Sheets v4 and Calendar v3 REST APIs
//! (only the endpoints the sync needs).
//!
//! Authentication
//! - OAuth2 refresh-token grant against Google's token endpoint; the access
//!   token is cached and refreshed 30 s before expiry or after a 401.
//!
//! Retries
//! - 429 and 5xx responses are retried with jittered exponential backoff up to
//!   `max_request_retries` times. Everything else is returned to the caller.

use http::StatusCode;
use log::{debug, warn};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::num::NonZeroU32;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use ureq::Agent;

use crate::config::GoogleCredentials;
use crate::models::google::*;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);
const BACKOFF_BASE_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum GoogleClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("json error: {0}")]
    Json(String),
    #[error("auth error: {0}")]
    Auth(String),
}

impl GoogleClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GoogleClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct OAuthToken {
    access_token: String,
    expires_at: Instant,
}

pub struct GoogleClient {
    agent: Agent,
    credentials: GoogleCredentials,
    token: RefCell<Option<OAuthToken>>,
    max_request_retries: NonZeroU32,
}

enum Method {
    Get,
    Post,
    Put,
}

impl GoogleClient {
    /// Build the client and fetch the first access token. Fails when the
    /// refresh token is invalid or the token endpoint is unreachable.
    pub fn new(
        credentials: GoogleCredentials,
        timeout: Duration,
        max_request_retries: NonZeroU32,
    ) -> Result<Self, GoogleClientError> {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        let client = GoogleClient {
            agent: Agent::new_with_config(config),
            credentials,
            token: RefCell::new(None),
            max_request_retries,
        };
        client.refresh_token()?;
        Ok(client)
    }

    fn refresh_token(&self) -> Result<String, GoogleClientError> {
        #[derive(serde::Deserialize)]
        struct R {
            access_token: String,
            expires_in: u64,
        }

        let mut resp = self
            .agent
            .post(OAUTH_TOKEN_URL)
            .header("Accept", "application/json")
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .map_err(|e| GoogleClientError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| GoogleClientError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GoogleClientError::Auth(format!("http {}: {}", status.as_u16(), body)));
        }

        let R {
            access_token,
            expires_in,
        } = decode(&body)?;
        *self.token.borrow_mut() = Some(OAuthToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });
        debug!("Refreshed Google access token (expires in {}s)", expires_in);
        Ok(access_token)
    }

    fn bearer(&self) -> Result<String, GoogleClientError> {
        let cached = self
            .token
            .borrow()
            .as_ref()
            .filter(|t| Instant::now() + TOKEN_REFRESH_MARGIN < t.expires_at)
            .map(|t| t.access_token.clone());
        match cached {
            Some(token) => Ok(token),
            None => self.refresh_token(),
        }
    }

    /// Issue one API call, handling auth refresh and transient retries.
    /// Returns the body of a 2xx response.
    fn call<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<String, GoogleClientError> {
        let mut attempt = 0u32;
        let mut reauthenticated = false;
        loop {
            let auth = format!("Bearer {}", self.bearer()?);
            let result = match (&method, body) {
                (Method::Get, _) => {
                    let mut req = self.agent.get(url).header("Authorization", &auth);
                    for (k, v) in query {
                        req = req.query(*k, *v);
                    }
                    req.call()
                }
                (Method::Post, Some(b)) => self.agent.post(url).header("Authorization", &auth).send_json(b),
                (Method::Post, None) => self.agent.post(url).header("Authorization", &auth).send_empty(),
                (Method::Put, Some(b)) => self.agent.put(url).header("Authorization", &auth).send_json(b),
                (Method::Put, None) => self.agent.put(url).header("Authorization", &auth).send_empty(),
            };
            let mut resp = result.map_err(|e| GoogleClientError::Transport(e.to_string()))?;
            let status = resp.status();
            let text = resp
                .body_mut()
                .read_to_string()
                .map_err(|e| GoogleClientError::Transport(e.to_string()))?;

            if status.is_success() {
                return Ok(text);
            }
            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                reauthenticated = true;
                self.refresh_token()?;
                continue;
            }
            let transient = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if transient && attempt < self.max_request_retries.get() {
                attempt += 1;
                let delay = backoff_delay(attempt);
                warn!(
                    "Google API {} returned http {}; retry {}/{} in {}ms",
                    url,
                    status.as_u16(),
                    attempt,
                    self.max_request_retries,
                    delay.as_millis()
                );
                thread::sleep(delay);
                continue;
            }
            return Err(GoogleClientError::Http {
                status: status.as_u16(),
                message: text,
            });
        }
    }

    pub fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<ValueRange, GoogleClientError> {
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            SHEETS_BASE_URL,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        );
        let query = [
            ("majorDimension", "ROWS"),
            ("valueRenderOption", "UNFORMATTED_VALUE"),
            ("dateTimeRenderOption", "SERIAL_NUMBER"),
        ];
        decode(&self.call::<()>(Method::Get, &url, &query, None)?)
    }

    pub fn batch_update_values(
        &self,
        spreadsheet_id: &str,
        request: &BatchUpdateValuesRequest,
    ) -> Result<BatchUpdateValuesResponse, GoogleClientError> {
        let url = format!(
            "{}/spreadsheets/{}/values:batchUpdate",
            SHEETS_BASE_URL,
            urlencoding::encode(spreadsheet_id)
        );
        decode(&self.call(Method::Post, &url, &[], Some(request))?)
    }

    pub fn get_calendar(&self, calendar_id: &str) -> Result<Calendar, GoogleClientError> {
        let url = format!("{}/calendars/{}", CALENDAR_BASE_URL, urlencoding::encode(calendar_id));
        decode(&self.call::<()>(Method::Get, &url, &[], None)?)
    }

    pub fn insert_event(&self, calendar_id: &str, event: &Event) -> Result<Event, GoogleClientError> {
        let url = format!("{}/calendars/{}/events", CALENDAR_BASE_URL, urlencoding::encode(calendar_id));
        decode(&self.call(Method::Post, &url, &[], Some(event))?)
    }

    pub fn update_event(&self, calendar_id: &str, event_id: &str, event: &Event) -> Result<Event, GoogleClientError> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            CALENDAR_BASE_URL,
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id)
        );
        decode(&self.call(Method::Put, &url, &[], Some(event))?)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, GoogleClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| GoogleClientError::Json(e.to_string()))
}

/// 500ms, 1s, 2s, ... capped at 32s, with up to 50% random jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    let jitter = rand::rng().random_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}
