use futures::future::LocalBoxFuture;
use futures::FutureExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub(crate) enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// JSON body; only create/update carry one.
    pub body: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Failure of the exchange itself (no HTTP status available).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TransportError {
    /// Network, DNS or CORS class failure: the endpoint could not be reached.
    Unreachable(String),
    /// Anything else (malformed request, body read error).
    Failed(String),
}

/// One request/response exchange.
pub(crate) trait Transport: Send + Sync + 'static {
    fn send(&self, req: HttpRequest) -> LocalBoxFuture<'static, Result<HttpResponse, TransportError>>;
}

#[derive(Clone)]
pub(crate) struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, req: HttpRequest) -> LocalBoxFuture<'static, Result<HttpResponse, TransportError>> {
        let client = self.client.clone();

        async move {
            let mut builder = client
                .request(req.method.as_reqwest(), &req.url)
                .header(ACCEPT, "application/json");
            if let Some(body) = &req.body {
                builder = builder.json(body);
            }

            let res = builder.send().await.map_err(classify_reqwest_error)?;

            let status = res.status().as_u16();
            let content_type = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = res.text().await.map_err(classify_reqwest_error)?;

            Ok(HttpResponse {
                status,
                content_type,
                body,
            })
        }
        .boxed_local()
    }
}

const UNREACHABLE_SIGNATURES: &[&str] = &[
    "failed to fetch",
    "networkerror",
    "network error",
    "load failed",
    "dns",
    "cors",
    "connection refused",
    "connection reset",
    "error sending request",
    "error trying to connect",
];

/// True when an error message looks like the endpoint could not be reached at all.
pub(crate) fn looks_unreachable(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    UNREACHABLE_SIGNATURES.iter().any(|sig| message.contains(sig))
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    let message = e.to_string();
    if is_connect_error(&e) || e.is_timeout() || e.is_request() || looks_unreachable(&message) {
        TransportError::Unreachable(message)
    } else {
        TransportError::Failed(message)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn is_connect_error(e: &reqwest::Error) -> bool {
    e.is_connect()
}

#[cfg(target_arch = "wasm32")]
fn is_connect_error(_e: &reqwest::Error) -> bool {
    false
}
