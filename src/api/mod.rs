pub(crate) mod cancel;
pub(crate) mod transport;

use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_TIMEOUT_MS};
use crate::models::{Note, NotePayload};
use crate::runtime::Runtime;
use crate::util::join_url;
use futures::future::{self, Either, LocalBoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;

pub(crate) use cancel::CancelToken;
pub(crate) use transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

const NOTES_PATH: &str = "/notes";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    /// Caller misuse (missing id). Raised before any I/O.
    Validation,
    /// The remote answered but the payload has the wrong shape.
    Shape,
    /// The remote answered with a non-2xx status, or the exchange failed for a
    /// non-network reason.
    Http,
    /// The remote could not be reached at all (network, DNS, CORS).
    Unavailable,
    /// Cancelled by the caller or by the request timeout.
    Aborted,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub url: Option<String>,
    pub retriable: bool,
    /// Set for `Aborted` errors caused by the request timeout.
    pub timed_out: bool,
    /// Parsed response body, when there was one.
    pub detail: Option<Value>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn new(kind: ApiErrorKind, message: impl Into<String>, url: Option<&str>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            url: url.map(str::to_string),
            retriable: false,
            timed_out: false,
            detail: None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, message, None)
    }

    fn shape(url: &str, message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Shape, message, Some(url))
    }

    fn unavailable(url: &str, cause: String) -> Self {
        let mut e = Self::new(
            ApiErrorKind::Unavailable,
            format!("Backend unavailable: {cause}"),
            Some(url),
        );
        e.retriable = true;
        e
    }

    fn request_failed(url: &str, cause: String) -> Self {
        Self::new(ApiErrorKind::Http, format!("Request failed: {cause}"), Some(url))
    }

    fn http(status: u16, url: &str, detail: Option<Value>) -> Self {
        let message = match detail.as_ref().and_then(server_message) {
            Some(server) => format!("Request failed ({status}): {server}"),
            None => format!("Request failed ({status})"),
        };
        let mut e = Self::new(ApiErrorKind::Http, message, Some(url));
        e.status = Some(status);
        e.retriable = (500..=599).contains(&status);
        e.detail = detail;
        e
    }

    fn aborted(url: &str) -> Self {
        Self::new(ApiErrorKind::Aborted, "Request cancelled", Some(url))
    }

    fn timed_out(url: &str, timeout_ms: u32) -> Self {
        let mut e = Self::new(
            ApiErrorKind::Aborted,
            format!("Request timed out after {timeout_ms} ms"),
            Some(url),
        );
        e.timed_out = true;
        e
    }

    /// Aborted by an explicit cancellation (not by the timeout).
    pub(crate) fn is_cancelled(&self) -> bool {
        self.kind == ApiErrorKind::Aborted && !self.timed_out
    }
}

/// Human message from an error body: a plain string, or `message`/`error` in an object.
fn server_message(detail: &Value) -> Option<String> {
    let s = match detail {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(|v| v.as_str()),
        _ => None,
    }?;
    let s = s.trim();
    (!s.is_empty()).then(|| s.chars().take(200).collect())
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u32,
    /// Retries after the first attempt, for 5xx and unreachable outcomes only.
    pub max_retries: u32,
    pub retry_base_delay_ms: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

/// Delay before retry number `attempt + 1`: base, 2x base, 4x base, ...
pub(crate) fn backoff_delay(base_ms: u32, attempt: u32) -> u32 {
    base_ms.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
}

enum Stop {
    TimedOut,
    Cancelled,
}

/// Client for the `/notes` CRUD resource.
///
/// Cheap to clone; one instance is built by the app root and shared.
#[derive(Clone)]
pub(crate) struct ApiClient {
    pub(crate) config: ClientConfig,
    transport: Arc<dyn Transport>,
    runtime: Arc<dyn Runtime>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            config,
            transport,
            runtime,
        }
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }

    pub async fn list_notes(&self, cancel: Option<&CancelToken>) -> ApiResult<Vec<Note>> {
        let url = self.url(NOTES_PATH);
        let payload = self.request(Method::Get, &url, None, cancel).await?;
        parse_note_list(payload, &url)
    }

    #[allow(dead_code)]
    pub async fn get_note(&self, id: &str, cancel: Option<&CancelToken>) -> ApiResult<Note> {
        let url = self.url(&note_path(id)?);
        let payload = self.request(Method::Get, &url, None, cancel).await?;
        parse_note(payload, &url)
    }

    pub async fn create_note(
        &self,
        payload: &NotePayload,
        cancel: Option<&CancelToken>,
    ) -> ApiResult<Note> {
        let url = self.url(NOTES_PATH);
        let body = to_body(payload)?;
        let res = self.request(Method::Post, &url, Some(body), cancel).await?;
        parse_note(res, &url)
    }

    pub async fn update_note(
        &self,
        id: &str,
        payload: &NotePayload,
        cancel: Option<&CancelToken>,
    ) -> ApiResult<Note> {
        let url = self.url(&note_path(id)?);
        let body = to_body(payload)?;
        let res = self.request(Method::Put, &url, Some(body), cancel).await?;
        parse_note(res, &url)
    }

    pub async fn delete_note(&self, id: &str, cancel: Option<&CancelToken>) -> ApiResult<()> {
        let url = self.url(&note_path(id)?);
        self.request(Method::Delete, &url, None, cancel).await?;
        Ok(())
    }

    /// Exchange with retry. Only 5xx and unreachable outcomes are retried.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        cancel: Option<&CancelToken>,
    ) -> ApiResult<Option<Value>> {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(ApiError::aborted(url));
            }

            let req = HttpRequest {
                method,
                url: url.to_string(),
                body: body.clone(),
            };

            match self.exchange(req, cancel).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.retriable && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.retry_base_delay_ms, attempt);
                    log::debug!(
                        "event=api_retry module=api method={method} status={:?} attempt={} delay_ms={delay}",
                        e.status,
                        attempt + 1
                    );
                    if !self.backoff(delay, cancel).await {
                        return Err(ApiError::aborted(url));
                    }
                    attempt += 1;
                }
                Err(e) => {
                    log::debug!(
                        "event=api_request module=api method={method} status=failed kind={:?} http_status={:?}",
                        e.kind,
                        e.status
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Wait out a backoff delay. `false` when cancelled in the meantime.
    async fn backoff(&self, delay_ms: u32, cancel: Option<&CancelToken>) -> bool {
        let sleep = self.runtime.sleep(delay_ms);
        match cancel {
            Some(token) => match future::select(sleep, token.cancelled()).await {
                Either::Left(_) => true,
                Either::Right(_) => false,
            },
            None => {
                sleep.await;
                true
            }
        }
    }

    /// One time-bounded attempt. Caller cancellation and the timeout race the exchange;
    /// whichever finishes first wins.
    async fn exchange(&self, req: HttpRequest, cancel: Option<&CancelToken>) -> ApiResult<Option<Value>> {
        let url = req.url.clone();
        let timeout_ms = self.config.timeout_ms;

        let timeout = self.runtime.sleep(timeout_ms).map(|_| Stop::TimedOut);
        let cancelled: LocalBoxFuture<'static, Stop> = match cancel {
            Some(token) => token.cancelled().map(|_| Stop::Cancelled).boxed_local(),
            None => future::pending().boxed_local(),
        };
        let stop = future::select(timeout, cancelled).map(|either| either.factor_first().0);

        let outcome = match future::select(self.transport.send(req), stop).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right((Stop::TimedOut, _)) => {
                log::warn!("event=api_timeout module=api timeout_ms={timeout_ms}");
                return Err(ApiError::timed_out(&url, timeout_ms));
            }
            Either::Right((Stop::Cancelled, _)) => return Err(ApiError::aborted(&url)),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(TransportError::Unreachable(cause)) => return Err(ApiError::unavailable(&url, cause)),
            Err(TransportError::Failed(cause)) => return Err(ApiError::request_failed(&url, cause)),
        };

        let payload = parse_body(&response);
        if (200..300).contains(&response.status) {
            Ok(payload)
        } else {
            Err(ApiError::http(response.status, &url, payload))
        }
    }
}

fn note_path(id: &str) -> ApiResult<String> {
    if id.trim().is_empty() {
        return Err(ApiError::validation("Note id is required"));
    }
    Ok(format!("{NOTES_PATH}/{}", urlencoding::encode(id)))
}

fn to_body(payload: &NotePayload) -> ApiResult<Value> {
    serde_json::to_value(payload)
        .map_err(|e| ApiError::validation(format!("Invalid note payload: {e}")))
}

/// Decode a response body. No content yields `None`; JSON content types are parsed
/// (a parse failure also yields `None`); anything else is returned as raw text.
pub(crate) fn parse_body(res: &HttpResponse) -> Option<Value> {
    if res.status == 204 || res.body.trim().is_empty() {
        return None;
    }

    let is_json = res
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));

    if !is_json {
        return Some(Value::String(res.body.clone()));
    }

    match serde_json::from_str(&res.body) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("event=api_parse module=api status=degraded error={e}");
            None
        }
    }
}

pub(crate) fn parse_note(payload: Option<Value>, url: &str) -> ApiResult<Note> {
    let Some(item @ Value::Object(_)) = payload else {
        return Err(ApiError::shape(url, "Unexpected response: expected a note object"));
    };

    let note: Note = serde_json::from_value(item)
        .map_err(|e| ApiError::shape(url, format!("Unexpected note shape: {e}")))?;
    if note.id.trim().is_empty() {
        return Err(ApiError::shape(url, "Unexpected note shape: empty id"));
    }
    Ok(note)
}

/// Items that are not valid notes are skipped; a payload that is not a list fails.
pub(crate) fn parse_note_list(payload: Option<Value>, url: &str) -> ApiResult<Vec<Note>> {
    let Some(Value::Array(items)) = payload else {
        return Err(ApiError::shape(url, "Unexpected response: expected a list of notes"));
    };

    let total = items.len();
    let notes: Vec<Note> = items
        .into_iter()
        .filter_map(|item| parse_note(Some(item), url).ok())
        .collect();

    if notes.len() != total {
        log::warn!(
            "event=api_parse module=api status=skipped skipped={} total={total}",
            total - notes.len()
        );
    }
    Ok(notes)
}
