//! Round-robin reverse-proxy dispatcher. Forwards matched path prefixes to a
//! fixed pool of backend addresses and injects a trusted identity header
//! derived from the caller's validated session, so backends never
//! re-authenticate and never trust caller-supplied identity.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use futures_util::TryStreamExt;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::server::SessionState;
use crate::sessions::{get_state, SessionStore};
use crate::users::User;

/// Gateway-injected identity header consumed by backends. Its absence signals
/// an anonymous caller.
pub const HEADER_USER: &str = "x-user";

pub struct ServiceProxy {
    addrs: Vec<String>,
    next: AtomicUsize,
    client: Client,
    signing_key: String,
    session_store: Arc<dyn SessionStore>,
}

impl ServiceProxy {
    /// Build a dispatcher over a fixed, non-empty pool of `host:port` backend
    /// addresses. The pool never changes; only the cursor does.
    pub fn new(
        addrs: Vec<String>,
        signing_key: String,
        session_store: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        if addrs.is_empty() {
            anyhow::bail!("proxy pool must have at least one backend address");
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self { addrs, next: AtomicUsize::new(0), client, signing_key, session_store })
    }

    /// Atomic fetch-and-increment modulo pool size: under concurrency no
    /// backend is selected twice or skipped for a batch of pool-size calls.
    pub fn next_index(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.addrs.len()
    }

    pub fn pool_size(&self) -> usize {
        self.addrs.len()
    }

    /// Forward one request to the next backend. Session resolution failure is
    /// non-fatal: the request passes through anonymously with any spoofed
    /// identity header stripped. Transport failures surface immediately.
    pub async fn forward(&self, req: Request) -> AppResult<Response> {
        let (parts, body) = req.into_parts();
        let query = parts.uri.query();

        let user: Option<User> = match get_state::<SessionState>(
            &parts.headers,
            query,
            &self.signing_key,
            self.session_store.as_ref(),
        )
        .await
        {
            Ok((_, state)) => Some(state.user),
            Err(_) => None,
        };

        let addr = &self.addrs[self.next_index()];
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("http://{}{}", addr, path_and_query);
        debug!(backend = %addr, path = %parts.uri.path(), authenticated = user.is_some(), "proxying");

        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| AppError::io("proxy_request_body", e.to_string()))?;

        let mut headers = parts.headers.clone();
        headers.remove(header::HOST);
        headers.remove(header::CONNECTION);
        headers.remove(header::CONTENT_LENGTH);
        apply_identity_header(&mut headers, user.as_ref())?;

        let backend_resp = self
            .client
            .request(parts.method.clone(), url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::io("backend_unreachable", e.to_string()))?;

        let status = backend_resp.status();
        let mut resp_headers = backend_resp.headers().clone();
        resp_headers.remove(header::CONNECTION);
        resp_headers.remove(header::TRANSFER_ENCODING);

        let stream = backend_resp.bytes_stream().map_err(std::io::Error::other);
        let mut resp = Response::builder()
            .status(status)
            .body(Body::from_stream(stream))
            .map_err(|e| AppError::internal("proxy_response", e.to_string()))?;
        *resp.headers_mut() = resp_headers;
        Ok(resp)
    }
}

/// Set the trusted identity header from a verified user snapshot, or strip
/// any caller-supplied value when the request is anonymous. The serialized
/// snapshot never contains the password hash (skipped by serde).
pub fn apply_identity_header(headers: &mut HeaderMap, user: Option<&User>) -> AppResult<()> {
    let name = HeaderName::from_static(HEADER_USER);
    match user {
        Some(u) => {
            let json = serde_json::to_string(u)
                .map_err(|e| AppError::internal("identity_header", e.to_string()))?;
            let value = HeaderValue::from_str(&json)
                .map_err(|e| AppError::internal("identity_header", e.to_string()))?;
            headers.insert(name, value);
        }
        None => {
            headers.remove(name);
        }
    }
    Ok(())
}
