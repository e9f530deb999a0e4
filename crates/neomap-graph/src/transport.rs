//! HTTP transport to the store's REST root.
//!
//! Everything the engine sends goes through the [`Transport`] trait: one
//! synchronous request with an optional JSON body, answered with a status and
//! a decoded JSON body. [`HttpTransport`] is the production implementation;
//! [`ScriptedTransport`] replays canned replies and records what was sent.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use neomap_core::GraphConfig;
use serde::Serialize;
use serde_json::Value;

/// HTTP verbs used against the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded reply. Empty bodies (e.g. `204 No Content`) decode to `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub data: Value,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self { status: 200, data }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Resource not found: {path}")]
    NotFound { path: String },

    #[error("Request {method} {path} failed (status {status:?}): {message}")]
    Request {
        method: Method,
        path: String,
        status: Option<u16>,
        message: String,
    },
}

/// One synchronous JSON request against the store.
///
/// `path` is either relative to the REST root (`/node/3`, `batch`) or an
/// absolute resource URI as returned by the store.
pub trait Transport: Send + Sync {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, TransportError>;
}

// ── HTTP ─────────────────────────────────────────────────────────

/// Blocking HTTP transport over a pooled `ureq` agent.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    authorization: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &GraphConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();

        let authorization = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Some(format!(
                "Basic {}",
                STANDARD.encode(format!("{user}:{password}"))
            )),
            _ => None,
        };

        Self {
            agent,
            base_url: config.base_url(),
            authorization,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, TransportError> {
        let url = self.url_for(path);
        let failed = |status: Option<u16>, message: String| TransportError::Request {
            method,
            path: path.to_string(),
            status,
            message,
        };

        let mut request = self
            .agent
            .request(method.as_str(), &url)
            .set("Accept", "application/json");
        if let Some(authorization) = &self.authorization {
            request = request.set("Authorization", authorization);
        }

        tracing::trace!(method = method.as_str(), url = %url, "Sending request");
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match result {
            Ok(reply) => {
                let status = reply.status();
                let text = reply
                    .into_string()
                    .map_err(|e| failed(Some(status), e.to_string()))?;
                let data = if text.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(&text).map_err(|e| failed(Some(status), e.to_string()))?
                };
                Ok(Response { status, data })
            }
            Err(ureq::Error::Status(404, _)) => Err(TransportError::NotFound {
                path: path.to_string(),
            }),
            Err(ureq::Error::Status(status, reply)) => {
                let message = reply
                    .into_string()
                    .unwrap_or_else(|_| "unreadable error body".to_string());
                Err(failed(Some(status), message))
            }
            Err(ureq::Error::Transport(transport)) => Err(failed(None, transport.to_string())),
        }
    }
}

// ── Scripted ─────────────────────────────────────────────────────

/// A request captured by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// In-memory transport that answers from a queue of prepared replies.
///
/// When the queue is empty every request is answered with `200` and a
/// `null` body. Used by the test suites and for offline dry runs.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<Response, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `200` reply carrying `data`.
    pub fn push_reply(&self, data: Value) -> &Self {
        self.push(Ok(Response::ok(data)))
    }

    pub fn push_error(&self, error: TransportError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, reply: Result<Response, TransportError>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(reply);
        self
    }

    /// Everything sent so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Transport for ScriptedTransport {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedRequest {
                method,
                path: path.to_string(),
                body: body.cloned(),
            });

        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(Response::ok(Value::Null)))
    }
}
